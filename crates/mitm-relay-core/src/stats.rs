//! Session statistics collection and aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::connection::SessionInfo;

/// Aggregated statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedStats {
    /// Total sessions since start.
    pub total_sessions: u64,

    /// Currently open sessions.
    pub active_sessions: u64,

    /// Total bytes relayed client to server.
    pub total_bytes_from_client: u64,

    /// Total bytes relayed server to client.
    pub total_bytes_from_server: u64,

    /// Server uptime in seconds.
    pub uptime_secs: i64,

    /// Server start time.
    pub started_at: DateTime<Utc>,
}

/// Thread-safe statistics collector.
#[derive(Debug)]
pub struct Stats {
    total_sessions: AtomicU64,
    total_bytes_from_client: AtomicU64,
    total_bytes_from_server: AtomicU64,
    started_at: DateTime<Utc>,

    /// Recently closed sessions, oldest first.
    history: RwLock<VecDeque<SessionInfo>>,

    /// Open sessions.
    active: RwLock<Vec<SessionInfo>>,

    max_history: usize,
}

impl Stats {
    /// Create a new statistics collector.
    pub fn new(max_history: usize) -> Self {
        Self {
            total_sessions: AtomicU64::new(0),
            total_bytes_from_client: AtomicU64::new(0),
            total_bytes_from_server: AtomicU64::new(0),
            started_at: Utc::now(),
            history: RwLock::new(VecDeque::with_capacity(max_history)),
            active: RwLock::new(Vec::new()),
            max_history,
        }
    }

    /// Record a newly accepted session.
    pub async fn add_session(&self, info: SessionInfo) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
        self.active.write().await.push(info);
    }

    /// Mark a session as relaying once its upstream is connected.
    pub async fn mark_relaying(&self, id: u64) {
        if let Some(info) = self.active.write().await.iter_mut().find(|s| s.id == id) {
            info.set_relaying();
        }
    }

    /// Mark a session as closed and move it to history.
    pub async fn close_session(&self, id: u64, bytes_from_client: u64, bytes_from_server: u64) {
        let mut active = self.active.write().await;

        if let Some(pos) = active.iter().position(|s| s.id == id) {
            let mut info = active.remove(pos);
            info.set_closed();
            info.bytes_from_client = bytes_from_client;
            info.bytes_from_server = bytes_from_server;

            self.total_bytes_from_client
                .fetch_add(bytes_from_client, Ordering::Relaxed);
            self.total_bytes_from_server
                .fetch_add(bytes_from_server, Ordering::Relaxed);

            let mut history = self.history.write().await;
            if history.len() >= self.max_history {
                history.pop_front();
            }
            history.push_back(info);
        }
    }

    /// Get aggregated statistics.
    pub async fn get_aggregated(&self) -> AggregatedStats {
        let active_count = self.active.read().await.len() as u64;

        AggregatedStats {
            total_sessions: self.total_sessions.load(Ordering::Relaxed),
            active_sessions: active_count,
            total_bytes_from_client: self.total_bytes_from_client.load(Ordering::Relaxed),
            total_bytes_from_server: self.total_bytes_from_server.load(Ordering::Relaxed),
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            started_at: self.started_at,
        }
    }

    /// Get open sessions.
    pub async fn get_active(&self) -> Vec<SessionInfo> {
        self.active.read().await.clone()
    }

    /// Get closed sessions, newest first.
    pub async fn get_history(&self, limit: Option<usize>) -> Vec<SessionInfo> {
        let history = self.history.read().await;
        let limit = limit.unwrap_or(history.len()).min(history.len());
        history.iter().rev().take(limit).cloned().collect()
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SessionState;

    fn session(id: u64) -> SessionInfo {
        SessionInfo::new(id, format!("127.0.0.1:{}", 5000 + id), "upstream:2101".into(), false)
    }

    #[tokio::test]
    async fn session_lifecycle_is_tracked() {
        let stats = Stats::new(10);
        stats.add_session(session(0)).await;
        stats.mark_relaying(0).await;

        let active = stats.get_active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].state, SessionState::Relaying);

        stats.close_session(0, 4, 8).await;
        assert!(stats.get_active().await.is_empty());

        let history = stats.get_history(None).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, SessionState::Closed);
        assert_eq!(history[0].bytes_from_client, 4);

        let agg = stats.get_aggregated().await;
        assert_eq!(agg.total_sessions, 1);
        assert_eq!(agg.active_sessions, 0);
        assert_eq!(agg.total_bytes_from_client, 4);
        assert_eq!(agg.total_bytes_from_server, 8);
    }

    #[tokio::test]
    async fn history_is_bounded_and_newest_first() {
        let stats = Stats::new(2);
        for id in 0..3 {
            stats.add_session(session(id)).await;
            stats.close_session(id, 0, 0).await;
        }

        let ids: Vec<u64> = stats.get_history(None).await.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(stats.get_history(Some(1)).await.len(), 1);
    }

    #[tokio::test]
    async fn closing_unknown_session_is_ignored() {
        let stats = Stats::new(2);
        stats.close_session(42, 1, 1).await;
        assert!(stats.get_history(None).await.is_empty());
        assert_eq!(stats.get_aggregated().await.total_bytes_from_client, 0);
    }
}
