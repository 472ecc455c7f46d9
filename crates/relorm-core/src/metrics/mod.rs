//! Metrics collection.
//!
//! Counters for statements, row writes and transaction outcomes, shared
//! between sessions through an `Arc`.
//!
//! # Usage
//!
//! ```ignore
//! use relorm_core::metrics::{new_shared_metrics, WriteKind};
//!
//! let metrics = new_shared_metrics();
//! metrics.record_write("post", WriteKind::Insert);
//! assert_eq!(metrics.snapshot().inserts, 1);
//! ```

mod registry;

pub use registry::{new_shared_metrics, MetricsSnapshot, PersistenceMetrics, SharedMetrics, WriteKind};
