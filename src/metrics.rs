//! db-router-core/src/metrics.rs
//! Lock-free per-route counters and their serializable snapshots, in the
//! spirit of the teacher crate's `MetricsSnapshot`/`ConnMetrics` pair.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated on the relay hot path; never behind a lock.
#[derive(Default)]
pub struct RouteMetrics {
    pub total_accepted: AtomicU64,
    pub total_admission_rejections: AtomicU64,
    pub total_connect_failures: AtomicU64,
    pub bytes_up: AtomicU64,
    pub bytes_down: AtomicU64,
}

impl RouteMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, active_connections: u32, blocked_ips: usize) -> RouteMetricsSnapshot {
        RouteMetricsSnapshot {
            active_connections,
            blocked_ips,
            total_accepted: self.total_accepted.load(Ordering::Relaxed),
            total_admission_rejections: self.total_admission_rejections.load(Ordering::Relaxed),
            total_connect_failures: self.total_connect_failures.load(Ordering::Relaxed),
            bytes_up: self.bytes_up.load(Ordering::Relaxed),
            bytes_down: self.bytes_down.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy)]
pub struct RouteMetricsSnapshot {
    pub active_connections: u32,
    pub blocked_ips: usize,
    pub total_accepted: u64,
    pub total_admission_rejections: u64,
    pub total_connect_failures: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
}

/// Aggregate view of every route in a `Router`, the process-level state
/// called for in §2's "aggregate stats".
#[derive(Debug, Serialize)]
pub struct RouterMetricsSnapshot {
    pub routes: HashMap<String, RouteMetricsSnapshot>,
    pub total_active_connections: u64,
    pub total_accepted: u64,
    pub total_blocked_ips: u64,
}

impl RouterMetricsSnapshot {
    pub fn from_routes(routes: HashMap<String, RouteMetricsSnapshot>) -> Self {
        let total_active_connections = routes.values().map(|r| r.active_connections as u64).sum();
        let total_accepted = routes.values().map(|r| r.total_accepted).sum();
        let total_blocked_ips = routes.values().map(|r| r.blocked_ips as u64).sum();
        RouterMetricsSnapshot {
            routes,
            total_active_connections,
            total_accepted,
            total_blocked_ips,
        }
    }
}
