//! Foreign key metadata.

use rkyv::Archive;

use super::entity::EntityId;
use super::relation::RelationId;
use super::types::{DeferrableMode, ReferentialAction};

/// One physical foreign-key constraint.
#[derive(Debug, Clone, PartialEq, Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct ForeignKeyMetadata {
    /// Constraint name.
    pub name: String,
    /// Entity whose table carries the constraint.
    pub entity: EntityId,
    /// Referencing columns.
    pub columns: Vec<String>,
    /// Referenced entity.
    pub referenced_entity: EntityId,
    /// Referenced columns, positionally matching `columns`.
    pub referenced_columns: Vec<String>,
    /// `ON DELETE` action.
    pub on_delete: Option<ReferentialAction>,
    /// `ON UPDATE` action.
    pub on_update: Option<ReferentialAction>,
    /// Deferral mode copied from the relation that produced the key;
    /// `None` when that relation declared no policy.
    pub deferrable: Option<DeferrableMode>,
    /// Relation that produced the key, if it has one (the inverse side of a
    /// unidirectional many-to-many does not).
    pub relation: Option<RelationId>,
}

impl ForeignKeyMetadata {
    /// Whether the constraint spans more than one column.
    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }

    /// Whether validation is postponed to commit.
    pub fn is_initially_deferred(&self) -> bool {
        self.deferrable == Some(DeferrableMode::InitiallyDeferred)
    }
}
