//! Client-facing listener.

use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use crate::error::Result;
use crate::proxy::BoxedStream;

/// Listening socket, optionally terminating TLS.
pub struct RelayListener {
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
}

impl RelayListener {
    /// Bind `addr`. With an acceptor, accepted clients must speak TLS.
    pub async fn bind(addr: &str, acceptor: Option<TlsAcceptor>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, acceptor })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn is_tls(&self) -> bool {
        self.acceptor.is_some()
    }

    /// Wait for the next client. The TLS handshake, if any, is left to
    /// [`Incoming::establish`] so a slow client cannot hold up accepting.
    pub async fn accept(&self) -> Result<(Incoming, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        Ok((
            Incoming {
                stream,
                acceptor: self.acceptor.clone(),
            },
            peer,
        ))
    }
}

/// An accepted client socket that has not completed its handshake yet.
pub struct Incoming {
    stream: TcpStream,
    acceptor: Option<TlsAcceptor>,
}

impl Incoming {
    /// Finish the TLS handshake (if any) and hand back the client stream.
    pub async fn establish(self) -> Result<BoxedStream> {
        match self.acceptor {
            None => Ok(Box::new(self.stream)),
            Some(acceptor) => Ok(Box::new(acceptor.accept(self.stream).await?)),
        }
    }
}
