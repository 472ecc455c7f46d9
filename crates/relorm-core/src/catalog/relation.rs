//! Relation metadata between entities.

use rkyv::Archive;

use super::entity::EntityId;
use super::types::{CascadeSet, DeferrableMode, ReferentialAction, RelationKind};

/// Index of a relation in a [`MetadataRegistry`](super::MetadataRegistry).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Archive, rkyv::Serialize, rkyv::Deserialize,
)]
pub struct RelationId(pub u32);

impl RelationId {
    /// Position in the registry's relation list.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One navigable relation on an entity.
///
/// Entities and inverses are referenced by id, never by pointer, so a
/// bidirectional pair does not form a reference cycle.
#[derive(Debug, Clone, PartialEq, Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct RelationMetadata {
    /// Registry index.
    pub id: RelationId,
    /// Entity the property lives on.
    pub entity: EntityId,
    /// Property name.
    pub property: String,
    /// Relation kind seen from `entity`.
    pub kind: RelationKind,
    /// Whether this side carries the foreign key / defines the junction.
    pub owning: bool,
    /// Inverse relation on the target, if navigable both ways.
    pub inverse: Option<RelationId>,
    /// Target entity (lookup only).
    pub target: EntityId,
    /// Deferrable policy declared on this side.
    pub deferrable: Option<DeferrableMode>,
    /// Cascaded operations.
    pub cascade: CascadeSet,
    /// Whether join columns accept null.
    pub nullable: bool,
    /// `ON DELETE` action.
    pub on_delete: Option<ReferentialAction>,
    /// `ON UPDATE` action.
    pub on_update: Option<ReferentialAction>,
    /// Join columns on `entity` (owning one-to-one and many-to-one only).
    pub join_columns: Vec<JoinColumn>,
    /// Junction entity (many-to-many, both sides).
    pub junction: Option<EntityId>,
    /// Explicit junction table name declared on this side.
    pub join_table_name: Option<String>,
    /// Synthesized from the other side's `inverse_side` rather than declared.
    pub synthesized: bool,
}

/// A join column and the target column it references.
#[derive(Debug, Clone, PartialEq, Eq, Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct JoinColumn {
    /// Column on the owning entity.
    pub name: String,
    /// Referenced primary column on the target.
    pub referenced_column: String,
}

impl RelationMetadata {
    /// Check if this is a many-to-many relation.
    pub fn is_many_to_many(&self) -> bool {
        self.kind == RelationKind::ManyToMany
    }

    /// Check if this side holds the join columns.
    pub fn has_join_columns(&self) -> bool {
        self.owning && matches!(self.kind, RelationKind::ManyToOne | RelationKind::OneToOne)
    }

    /// Check if the join columns live on the target (inverse one-to-many or
    /// inverse one-to-one).
    pub fn is_referenced_by_target(&self) -> bool {
        !self.owning && matches!(self.kind, RelationKind::OneToMany | RelationKind::OneToOne)
    }
}
