//! # Mitm-Relay Core
//!
//! Core library for the mitm-relay proxy service.
//! Accepts clients, dials the upstream server and relays bytes both ways,
//! optionally terminating and re-originating TLS so the traffic can be
//! inspected.

pub mod config;
pub mod connection;
pub mod error;
pub mod hexdump;
pub mod observe;
pub mod proxy;
pub mod stats;
pub mod tls;

pub use config::{Config, ConfigOverrides, ControlConfig, LoggingConfig, RelayConfig, TlsSubjectConfig};
pub use connection::{ConnectionIdAllocator, SessionInfo, SessionState};
pub use error::{Error, Result};
pub use observe::{BufferSnapshot, Direction, ObservationSink, ReportFeed};
pub use proxy::{RelayContext, RelayServer};
pub use stats::{AggregatedStats, Stats};
pub use tls::{IdentitySource, TlsIdentity};
