//! Server metrics for observability
//!
//! Plain atomic counters, exposed as a JSON snapshot by `/metrics`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently open WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since server start
    pub total_connections: AtomicU64,

    // Session metrics
    /// Shell sessions created for connections
    pub sessions_spawned: AtomicU64,
    /// Shells started again after an exit
    pub sessions_restarted: AtomicU64,
    /// Sessions torn down on disconnect or shutdown
    pub sessions_terminated: AtomicU64,
    /// Shells that could not be started
    pub spawn_failures: AtomicU64,

    // Terminal traffic
    /// Bytes written into shells
    pub terminal_bytes_in: AtomicU64,
    /// Bytes of shell output sent to clients
    pub terminal_bytes_out: AtomicU64,

    // Change broadcast
    /// Change notifications published to connections
    pub broadcasts_sent: AtomicU64,
    /// Notifications a lagging connection missed
    pub broadcasts_dropped: AtomicU64,

    // File writes
    pub file_writes_ok: AtomicU64,
    pub file_writes_failed: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Option<Instant>,
    /// Wall-clock start, reported alongside the counters
    started_at: Option<DateTime<Utc>>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    // Connection tracking
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    // Session tracking
    pub fn session_spawned(&self) {
        self.sessions_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_restarted(&self) {
        self.sessions_restarted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_terminated(&self) {
        self.sessions_terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn spawn_failed(&self) {
        self.spawn_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Traffic
    pub fn terminal_input(&self, bytes: usize) {
        self.terminal_bytes_in
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn terminal_output(&self, bytes: usize) {
        self.terminal_bytes_out
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn broadcast_sent(&self) {
        self.broadcasts_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcasts_missed(&self, count: u64) {
        self.broadcasts_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn file_written(&self, ok: bool) {
        if ok {
            self.file_writes_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.file_writes_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started_at: self.started_at,
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            sessions: SessionMetrics {
                spawned: self.sessions_spawned.load(Ordering::Relaxed),
                restarted: self.sessions_restarted.load(Ordering::Relaxed),
                terminated: self.sessions_terminated.load(Ordering::Relaxed),
                spawn_failures: self.spawn_failures.load(Ordering::Relaxed),
            },
            terminal: TerminalMetrics {
                bytes_in: self.terminal_bytes_in.load(Ordering::Relaxed),
                bytes_out: self.terminal_bytes_out.load(Ordering::Relaxed),
            },
            broadcasts: BroadcastMetrics {
                sent: self.broadcasts_sent.load(Ordering::Relaxed),
                dropped: self.broadcasts_dropped.load(Ordering::Relaxed),
            },
            file_writes: FileWriteMetrics {
                ok: self.file_writes_ok.load(Ordering::Relaxed),
                failed: self.file_writes_failed.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub sessions: SessionMetrics,
    pub terminal: TerminalMetrics,
    pub broadcasts: BroadcastMetrics,
    pub file_writes: FileWriteMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub spawned: u64,
    pub restarted: u64,
    pub terminated: u64,
    pub spawn_failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalMetrics {
    pub bytes_in: u64,
    pub bytes_out: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMetrics {
    pub sent: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileWriteMetrics {
    pub ok: u64,
    pub failed: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub connections: u64,
    pub sessions: u64,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_tracking() {
        let metrics = ServerMetrics::new();

        metrics.connection_opened();
        metrics.connection_opened();
        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.total_connections.load(Ordering::Relaxed), 2);

        metrics.connection_closed();
        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.total_connections.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_session_and_traffic_tracking() {
        let metrics = ServerMetrics::new();

        metrics.session_spawned();
        metrics.session_restarted();
        metrics.session_restarted();
        metrics.session_terminated();
        metrics.terminal_input(5);
        metrics.terminal_output(1024);
        metrics.terminal_output(24);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sessions.spawned, 1);
        assert_eq!(snapshot.sessions.restarted, 2);
        assert_eq!(snapshot.sessions.terminated, 1);
        assert_eq!(snapshot.terminal.bytes_in, 5);
        assert_eq!(snapshot.terminal.bytes_out, 1048);
    }

    #[test]
    fn test_snapshot() {
        let metrics = ServerMetrics::new();
        metrics.connection_opened();
        metrics.broadcast_sent();
        metrics.broadcasts_missed(3);
        metrics.file_written(true);
        metrics.file_written(false);

        let snapshot = metrics.snapshot();
        assert!(snapshot.started_at.is_some());
        assert_eq!(snapshot.connections.active, 1);
        assert_eq!(snapshot.broadcasts.sent, 1);
        assert_eq!(snapshot.broadcasts.dropped, 3);
        assert_eq!(snapshot.file_writes.ok, 1);
        assert_eq!(snapshot.file_writes.failed, 1);
    }
}
