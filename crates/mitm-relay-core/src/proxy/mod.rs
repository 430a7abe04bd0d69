//! Connection relay engine.

pub mod dialer;
pub mod listener;
pub mod relay;
pub mod server;

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::Config;
use crate::connection::ConnectionIdAllocator;
use crate::observe::ObservationSink;
use crate::stats::Stats;

pub use dialer::Dialer;
pub use listener::{Incoming, RelayListener};
pub use relay::{PumpEnd, PumpReport, RelaySession, SessionOutcome, BUFFER_SIZE};
pub use server::RelayServer;

/// A bidirectional byte stream, plaintext or TLS.
pub trait RelayStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> RelayStream for T {}

/// Type-erased stream owned by a session.
pub type BoxedStream = Box<dyn RelayStream>;

/// Everything a relay instance shares between its sessions.
///
/// Several contexts can live in one process; nothing here is global.
#[derive(Clone)]
pub struct RelayContext {
    /// Immutable once the listener starts.
    pub config: Arc<Config>,
    pub sink: Arc<dyn ObservationSink>,
    pub ids: Arc<ConnectionIdAllocator>,
    pub stats: Arc<Stats>,
}

impl RelayContext {
    pub fn new(config: Config, sink: Arc<dyn ObservationSink>) -> Self {
        Self {
            config: Arc::new(config),
            sink,
            ids: Arc::new(ConnectionIdAllocator::new()),
            stats: Arc::new(Stats::default()),
        }
    }
}
