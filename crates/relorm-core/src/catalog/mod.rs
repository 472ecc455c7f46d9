//! Relationship metadata.
//!
//! Declarations go in, an immutable [`MetadataRegistry`] comes out. Entities
//! and relations reference each other by index, so bidirectional relations
//! never form reference cycles and the registry can be cloned, compared and
//! snapshotted.

mod builder;
mod declaration;
mod entity;
mod foreign_key;
mod junction;
mod registry;
mod relation;
mod types;

pub use builder::{build_metadata, MetadataBuilder};
pub use declaration::{snake_case, ColumnDecl, EntityDecl, RelationDecl};
pub use entity::{ColumnMetadata, ColumnReference, EntityId, EntityMetadata, JunctionInfo};
pub use foreign_key::ForeignKeyMetadata;
pub use junction::{JunctionSide, JunctionTableManager, JunctionTableMetadata};
pub use registry::MetadataRegistry;
pub use relation::{JoinColumn, RelationId, RelationMetadata};
pub use types::{
    CascadeOp, CascadeSet, ColumnType, DefaultValue, DeferrableMode, Generation,
    ReferentialAction, RelationKind, TableType,
};
