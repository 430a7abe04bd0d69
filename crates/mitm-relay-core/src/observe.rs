//! Observation of relayed traffic.
//!
//! Every buffer read by a pump is handed to an [`ObservationSink`], which
//! logs it and keeps the latest buffer per direction for status reports.

use bytes::Bytes;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::hexdump;

/// Tracing target for traffic dumps.
pub const TRAFFIC_TARGET: &str = "mitm_relay::traffic";

/// Which end of the session a buffer was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Read from the client, headed for the server.
    Client,
    /// Read from the server, headed for the client.
    Server,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Client => f.write_str("Client"),
            Direction::Server => f.write_str("Server"),
        }
    }
}

/// Immutable record of one read.
#[derive(Debug, Clone)]
pub struct BufferSnapshot {
    pub timestamp: DateTime<Local>,
    pub source_id: u64,
    pub direction: Direction,
    pub content: Bytes,
    pub length: usize,
}

impl BufferSnapshot {
    pub fn new(direction: Direction, source_id: u64, data: &[u8]) -> Self {
        Self {
            timestamp: Local::now(),
            source_id,
            direction,
            content: Bytes::copy_from_slice(data),
            length: data.len(),
        }
    }

    /// The valid bytes of this snapshot.
    pub fn bytes(&self) -> &[u8] {
        &self.content[..self.length]
    }
}

/// Consumer of relayed traffic.
///
/// Implementations are shared by every session and called concurrently from
/// both pumps of each session.
pub trait ObservationSink: Send + Sync {
    /// Keep `data` as the latest buffer seen in `direction`.
    fn record_buffer(&self, direction: Direction, session_id: u64, data: &[u8]);

    /// Write `data` to the traffic log.
    fn log_buffer(&self, direction: Direction, session_id: u64, data: &[u8]);
}

#[derive(Debug, Default)]
struct LastBuffers {
    client: Option<BufferSnapshot>,
    server: Option<BufferSnapshot>,
}

/// Production sink: hex dumps to the log and remembers the last buffer in
/// each direction for the status page.
#[derive(Debug)]
pub struct ReportFeed {
    verbose: AtomicBool,
    last: Mutex<LastBuffers>,
}

impl Default for ReportFeed {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ReportFeed {
    /// Create a feed; `verbose` turns traffic dumps on from the start.
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose: AtomicBool::new(verbose),
            last: Mutex::new(LastBuffers::default()),
        }
    }

    /// 0 disables traffic logging, anything else enables it.
    pub fn set_log_level(&self, level: u8) {
        let enabled = level != 0;
        self.verbose.store(enabled, Ordering::Relaxed);
        info!(
            "Traffic logging {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    pub fn last_client_buffer(&self) -> Option<BufferSnapshot> {
        self.lock().client.clone()
    }

    pub fn last_server_buffer(&self) -> Option<BufferSnapshot> {
        self.lock().server.clone()
    }

    /// Plain-text status report of the last buffer in each direction.
    ///
    /// Dumps are HTML-sanitised so the text can be embedded in a page.
    pub fn status(&self) -> String {
        let last = self.lock();
        let (client_leader, client_dump) = describe(last.client.as_ref(), "no input buffer");
        let (server_leader, server_dump) = describe(last.server.as_ref(), "no output buffer");

        format!(
            "Last Client Buffer\n{}\n{}\nLast Server Buffer\n{}\n{}",
            client_leader, client_dump, server_leader, server_dump
        )
    }

    fn lock(&self) -> MutexGuard<'_, LastBuffers> {
        // Snapshots are replaced whole, so a poisoned lock still holds a
        // consistent value.
        self.last.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn describe(snapshot: Option<&BufferSnapshot>, empty: &str) -> (String, String) {
    match snapshot {
        Some(s) => (
            format!(
                "From {} [{}]:\n{}",
                s.direction,
                s.source_id,
                s.timestamp.format("%a %b %e %H:%M:%S %Y")
            ),
            sanitise(&hexdump::dump(s.bytes())),
        ),
        None => (empty.to_string(), String::new()),
    }
}

/// Escape the characters that would break out of a `<pre>` block.
pub fn sanitise(s: &str) -> String {
    s.replace('<', "&lt;").replace('>', "&gt;")
}

impl ObservationSink for ReportFeed {
    fn record_buffer(&self, direction: Direction, session_id: u64, data: &[u8]) {
        let snapshot = BufferSnapshot::new(direction, session_id, data);
        let mut last = self.lock();
        match direction {
            Direction::Client => last.client = Some(snapshot),
            Direction::Server => last.server = Some(snapshot),
        }
    }

    fn log_buffer(&self, direction: Direction, session_id: u64, data: &[u8]) {
        if !self.is_verbose() {
            return;
        }
        info!(
            target: TRAFFIC_TARGET,
            "From {} [{}]:\n{}",
            direction,
            session_id,
            hexdump::dump(data)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_latest_buffer_per_direction() {
        let feed = ReportFeed::default();
        feed.record_buffer(Direction::Client, 1, b"first");
        feed.record_buffer(Direction::Client, 1, b"second");
        feed.record_buffer(Direction::Server, 2, b"reply");

        let client = feed.last_client_buffer().unwrap();
        assert_eq!(client.bytes(), b"second");
        assert_eq!(client.length, 6);
        assert_eq!(client.source_id, 1);

        let server = feed.last_server_buffer().unwrap();
        assert_eq!(server.bytes(), b"reply");
        assert_eq!(server.source_id, 2);
        assert_eq!(server.direction, Direction::Server);
    }

    #[test]
    fn empty_status_names_missing_buffers() {
        let status = ReportFeed::default().status();
        assert!(status.contains("no input buffer"));
        assert!(status.contains("no output buffer"));
    }

    #[test]
    fn status_shows_leaders_and_sanitised_dump() {
        let feed = ReportFeed::default();
        feed.record_buffer(Direction::Client, 7, b"<tag>");
        feed.record_buffer(Direction::Server, 7, b"ok");

        let status = feed.status();
        assert!(status.contains("From Client [7]:"));
        assert!(status.contains("From Server [7]:"));
        assert!(status.contains("|&lt;tag&gt;|"));
        assert!(!status.contains("<tag>"));
    }

    #[test]
    fn log_level_switches_verbosity() {
        let feed = ReportFeed::new(true);
        feed.set_log_level(0);
        assert!(!feed.is_verbose());
        feed.set_log_level(3);
        assert!(feed.is_verbose());
    }

    #[test]
    fn quiet_feed_still_records() {
        let feed = ReportFeed::new(false);
        feed.log_buffer(Direction::Client, 1, b"x");
        feed.record_buffer(Direction::Client, 1, b"x");
        assert!(feed.last_client_buffer().is_some());
    }
}
