//! Session tracking and identifier allocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle of a relay session. Sessions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Client accepted, upstream connection being opened. On a TLS listener
    /// this covers the client handshake too, so a client whose handshake
    /// fails goes straight from here to `Closed`.
    Dialing,
    /// Both pumps are running.
    Relaying,
    /// Both sockets are closed.
    Closed,
}

/// Information about a single session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Identifier assigned at accept time.
    pub id: u64,

    /// Client address.
    pub client_addr: String,

    /// Upstream server address.
    pub upstream_addr: String,

    /// Whether both legs are TLS.
    pub tls: bool,

    /// Current state.
    pub state: SessionState,

    /// When the client was accepted.
    pub connected_at: DateTime<Utc>,

    /// When the session closed (if applicable).
    pub closed_at: Option<DateTime<Utc>>,

    /// Bytes read from the client and forwarded upstream.
    pub bytes_from_client: u64,

    /// Bytes read from the server and forwarded to the client.
    pub bytes_from_server: u64,
}

impl SessionInfo {
    /// Create a new session info in the `Dialing` state.
    pub fn new(id: u64, client_addr: String, upstream_addr: String, tls: bool) -> Self {
        Self {
            id,
            client_addr,
            upstream_addr,
            tls,
            state: SessionState::Dialing,
            connected_at: Utc::now(),
            closed_at: None,
            bytes_from_client: 0,
            bytes_from_server: 0,
        }
    }

    /// Mark the session as relaying.
    pub fn set_relaying(&mut self) {
        self.state = SessionState::Relaying;
    }

    /// Mark the session as closed.
    pub fn set_closed(&mut self) {
        self.state = SessionState::Closed;
        self.closed_at = Some(Utc::now());
    }

    /// Get session duration in seconds.
    pub fn duration_secs(&self) -> i64 {
        let end = self.closed_at.unwrap_or_else(Utc::now);
        (end - self.connected_at).num_seconds()
    }
}

/// Hands out session identifiers: 0, 1, 2, ... never reused.
#[derive(Debug, Default)]
pub struct ConnectionIdAllocator {
    next: AtomicU64,
}

impl ConnectionIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next identifier.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of identifiers issued so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}
