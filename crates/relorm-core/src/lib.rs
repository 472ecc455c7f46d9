//! relorm core - relationship metadata, constraint generation, dialect
//! rendering and cascading persistence.
//!
//! Entities and their relations are declared once ([`EntityDecl`]), built
//! into an immutable [`MetadataRegistry`], rendered to DDL for a dialect and
//! persisted through a [`Session`] over any [`Connection`].

pub mod catalog;
pub mod config;
pub mod connection;
pub mod constraint;
pub mod dialect;
pub mod error;
pub mod metrics;
pub mod persistence;
pub mod session;

pub use catalog::{
    build_metadata, CascadeOp, CascadeSet, ColumnDecl, ColumnType, DeferrableMode, EntityDecl,
    EntityId, EntityMetadata, ForeignKeyMetadata, Generation, JunctionTableManager,
    MetadataBuilder, MetadataRegistry, ReferentialAction, RelationDecl, RelationId, RelationKind,
    RelationMetadata,
};
pub use config::{EngineConfig, OrphanAction};
pub use connection::{Connection, Row, Transaction, Value};
pub use constraint::ConstraintGenerator;
pub use dialect::{drop_schema_objects, generate_schema_objects, DdlFragment, DialectCapabilities, DialectKind};
pub use error::{CascadeOrderError, ConstraintError, DriverError, Error, MetadataError, Result};
pub use persistence::{
    EntityObject, EntityReader, LoadedEntity, LoadedRelation, NodeId, ObjectGraph, Persister, Related,
    RemovedGraph, SaveOptions, SavedGraph,
};
pub use session::{EntityManager, Session};

// Metrics exports
pub use metrics::{new_shared_metrics, MetricsSnapshot, PersistenceMetrics, SharedMetrics};
