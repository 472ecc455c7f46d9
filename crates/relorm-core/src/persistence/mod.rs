//! Cascading transactional persistence.
//!
//! Saves walk an [`ObjectGraph`] from a root object through relations that
//! cascade, decide insert or update per object, order the writes by their
//! foreign keys and issue them on one [`Transaction`](crate::Transaction).
//! Junction rows are written last.

mod executor;
mod graph;
mod order;
mod plan;
mod reader;

pub use executor::{Persister, RemovedGraph, SavedGraph};
pub use graph::{EntityObject, NodeId, ObjectGraph, Related};
pub use plan::SaveOptions;
pub use reader::{EntityReader, LoadedEntity, LoadedRelation};
