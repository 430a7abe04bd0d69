//! Accept loop and per-client session setup.

use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::connection::SessionInfo;
use crate::error::Result;
use crate::proxy::{Dialer, Incoming, RelayContext, RelayListener, RelaySession};
use crate::tls::IdentitySource;

/// Man-in-the-middle relay server.
pub struct RelayServer {
    listener: RelayListener,
    dialer: Dialer,
    ctx: RelayContext,
}

impl RelayServer {
    /// Bind the client listener and prepare the upstream dialer.
    ///
    /// With TLS enabled the identity is obtained here, once, and shared by
    /// every accepted client.
    pub async fn bind(ctx: RelayContext) -> Result<Self> {
        let config = &ctx.config;
        config.validate()?;

        let acceptor = if config.relay.tls {
            let identity = IdentitySource::from_config(&config.relay, &config.tls).obtain()?;
            Some(identity.acceptor()?)
        } else {
            None
        };

        let bind_addr = config.relay.bind_addr();
        let listener = RelayListener::bind(&bind_addr, acceptor).await?;
        let dialer = Dialer::from_config(&config.relay)?;

        Ok(Self {
            listener,
            dialer,
            ctx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients until accepting fails. Sessions already running are
    /// left to finish on their own.
    pub async fn run(self) -> Result<()> {
        info!(
            "Relay listening on {} ({}) -> {}",
            self.local_addr()?,
            if self.listener.is_tls() { "tls" } else { "plain" },
            self.dialer.remote()
        );

        loop {
            let (incoming, client_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept call from client: {}", e);
                    return Err(e);
                }
            };

            let id = self.ctx.ids.next_id();
            info!("[{}] Connection accepted from client {}", id, client_addr);

            let dialer = self.dialer.clone();
            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                handle_client(id, incoming, client_addr, dialer, ctx).await;
            });
        }
    }
}

/// Run one session from accept to close.
async fn handle_client(
    id: u64,
    incoming: Incoming,
    client_addr: SocketAddr,
    dialer: Dialer,
    ctx: RelayContext,
) {
    ctx.stats
        .add_session(SessionInfo::new(
            id,
            client_addr.to_string(),
            dialer.remote().to_string(),
            dialer.is_tls(),
        ))
        .await;

    let mut client = match incoming.establish().await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("[{}] Client handshake failed: {}", id, e);
            ctx.stats.close_session(id, 0, 0).await;
            return;
        }
    };

    let server = match dialer.dial().await {
        Ok(stream) => stream,
        Err(e) => {
            error!("[{}] {}", id, e);
            let _ = client.shutdown().await;
            ctx.stats.close_session(id, 0, 0).await;
            return;
        }
    };
    info!("[{}] Connected to server {}", id, dialer.remote());
    ctx.stats.mark_relaying(id).await;

    let outcome = RelaySession::new(id, client, server, ctx.sink.clone())
        .with_idle_timeout(ctx.config.relay.idle_timeout())
        .run()
        .await;

    debug!(
        "[{}] client side: {:?}, server side: {:?}",
        id, outcome.client_end, outcome.server_end
    );
    ctx.stats
        .close_session(id, outcome.bytes_from_client, outcome.bytes_from_server)
        .await;

    info!(
        "[{}] Session closed: {} (from client: {}, from server: {})",
        id, client_addr, outcome.bytes_from_client, outcome.bytes_from_server
    );
}
