//! Upstream connection dialing.

use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::proxy::BoxedStream;
use crate::tls::{insecure_connector, server_name};

/// Opens connections to the upstream server.
#[derive(Clone)]
pub struct Dialer {
    remote: String,
    tls: Option<(TlsConnector, ServerName<'static>)>,
}

impl Dialer {
    /// Plain TCP dialer.
    pub fn plain(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            tls: None,
        }
    }

    /// TLS dialer that does not verify the server's certificate.
    pub fn tls(remote: impl Into<String>) -> Result<Self> {
        let remote = remote.into();
        let name = server_name(&remote)?;
        Ok(Self {
            tls: Some((insecure_connector()?, name)),
            remote,
        })
    }

    pub fn from_config(relay: &RelayConfig) -> Result<Self> {
        if relay.tls {
            Self::tls(relay.remote_host.as_str())
        } else {
            Ok(Self::plain(relay.remote_host.as_str()))
        }
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Connect to the upstream server.
    pub async fn dial(&self) -> Result<BoxedStream> {
        let tcp = TcpStream::connect(&self.remote)
            .await
            .map_err(|source| self.dial_error(source))?;

        match &self.tls {
            None => Ok(Box::new(tcp)),
            Some((connector, name)) => {
                debug!("TLS handshake with {}", self.remote);
                let stream = connector
                    .connect(name.clone(), tcp)
                    .await
                    .map_err(|source| self.dial_error(source))?;
                Ok(Box::new(stream))
            }
        }
    }

    fn dial_error(&self, source: std::io::Error) -> Error {
        Error::Dial {
            addr: self.remote.clone(),
            source,
        }
    }
}
