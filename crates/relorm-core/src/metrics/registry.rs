//! Persistence counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Kind of row write, for per-kind counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Row insert.
    Insert,
    /// Row update.
    Update,
    /// Row delete.
    Delete,
}

/// Counters for statements, writes and transaction outcomes.
///
/// Every counter is an atomic, so one instance can be shared by all
/// sessions of a process.
#[derive(Debug, Default)]
pub struct PersistenceMetrics {
    statements: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    junction_rows: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    cascade_order_failures: AtomicU64,
    writes_by_table: RwLock<HashMap<String, AtomicU64>>,
}

/// Point-in-time copy of [`PersistenceMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Statements sent to the connection.
    pub statements: u64,
    /// Rows inserted.
    pub inserts: u64,
    /// Rows updated.
    pub updates: u64,
    /// Rows deleted.
    pub deletes: u64,
    /// Junction rows inserted or deleted.
    pub junction_rows: u64,
    /// Committed transactions.
    pub commits: u64,
    /// Rolled back transactions.
    pub rollbacks: u64,
    /// Saves rejected because their writes could not be ordered.
    pub cascade_order_failures: u64,
    /// Row writes per table.
    pub writes_by_table: HashMap<String, u64>,
}

impl PersistenceMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a statement sent to the connection.
    pub fn record_statement(&self) {
        self.statements.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a row write against a table.
    pub fn record_write(&self, table: &str, kind: WriteKind) {
        match kind {
            WriteKind::Insert => self.inserts.fetch_add(1, Ordering::Relaxed),
            WriteKind::Update => self.updates.fetch_add(1, Ordering::Relaxed),
            WriteKind::Delete => self.deletes.fetch_add(1, Ordering::Relaxed),
        };

        {
            let map = self.writes_by_table.read();
            if let Some(counter) = map.get(table) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.writes_by_table
            .write()
            .entry(table.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record junction rows inserted or deleted.
    pub fn record_junction_rows(&self, rows: u64) {
        self.junction_rows.fetch_add(rows, Ordering::Relaxed);
    }

    /// Record a commit.
    pub fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rollback.
    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a save rejected by the write ordering.
    pub fn record_cascade_order_failure(&self) {
        self.cascade_order_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get statement count.
    pub fn statements(&self) -> u64 {
        self.statements.load(Ordering::Relaxed)
    }

    /// Get commit count.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Get rollback count.
    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    /// Copy every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            statements: self.statements.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            junction_rows: self.junction_rows.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            cascade_order_failures: self.cascade_order_failures.load(Ordering::Relaxed),
            writes_by_table: self
                .writes_by_table
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
                .collect(),
        }
    }

    /// Reset all counters (for testing).
    pub fn reset(&self) {
        self.statements.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
        self.updates.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.junction_rows.store(0, Ordering::Relaxed);
        self.commits.store(0, Ordering::Relaxed);
        self.rollbacks.store(0, Ordering::Relaxed);
        self.cascade_order_failures.store(0, Ordering::Relaxed);
        self.writes_by_table.write().clear();
    }
}

/// Shared metrics handle.
pub type SharedMetrics = Arc<PersistenceMetrics>;

/// Create a new shared metrics instance.
pub fn new_shared_metrics() -> SharedMetrics {
    Arc::new(PersistenceMetrics::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_counters() {
        let metrics = PersistenceMetrics::new();

        metrics.record_write("post", WriteKind::Insert);
        metrics.record_write("post", WriteKind::Update);
        metrics.record_write("category", WriteKind::Insert);
        metrics.record_write("category", WriteKind::Delete);
        metrics.record_junction_rows(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.inserts, 2);
        assert_eq!(snapshot.updates, 1);
        assert_eq!(snapshot.deletes, 1);
        assert_eq!(snapshot.junction_rows, 2);
        assert_eq!(snapshot.writes_by_table.get("post"), Some(&2));
        assert_eq!(snapshot.writes_by_table.get("category"), Some(&2));
    }

    #[test]
    fn test_reset() {
        let metrics = new_shared_metrics();
        metrics.record_statement();
        metrics.record_commit();
        metrics.record_rollback();
        metrics.record_write("post", WriteKind::Insert);

        assert_eq!(metrics.statements(), 1);
        assert_eq!(metrics.commits(), 1);
        assert_eq!(metrics.rollbacks(), 1);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
