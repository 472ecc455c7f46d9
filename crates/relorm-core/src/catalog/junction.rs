//! Junction tables for many-to-many relations.

use crate::constraint::{primary_key_name, ConstraintGenerator};
use crate::error::MetadataError;

use super::entity::{ColumnMetadata, ColumnReference, EntityId, EntityMetadata, JunctionInfo};
use super::foreign_key::ForeignKeyMetadata;
use super::relation::{RelationId, RelationMetadata};
use super::types::{DeferrableMode, ReferentialAction, TableType};

/// Resolved layout of a junction table, before it is given a registry id.
#[derive(Debug, Clone, PartialEq)]
pub struct JunctionTableMetadata {
    /// Table name.
    pub table_name: String,
    /// The owning many-to-many relation.
    pub owning_relation: RelationId,
    /// Side referencing the owning entity.
    pub owner: JunctionSide,
    /// Side referencing the other entity.
    pub inverse: JunctionSide,
}

/// One participant of a junction table.
#[derive(Debug, Clone, PartialEq)]
pub struct JunctionSide {
    /// Participating entity.
    pub entity: EntityId,
    /// Relation on `entity` navigating through the junction, if declared.
    pub relation: Option<RelationId>,
    /// Junction columns referencing `entity`.
    pub columns: Vec<ColumnMetadata>,
    /// Primary columns of `entity`, positionally matching `columns`.
    pub referenced_columns: Vec<String>,
    /// Deferrable policy of this side's relation.
    pub deferrable: Option<DeferrableMode>,
    /// `ON DELETE` action.
    pub on_delete: Option<ReferentialAction>,
    /// `ON UPDATE` action.
    pub on_update: Option<ReferentialAction>,
}

impl JunctionTableMetadata {
    /// Column names of both sides, owner first.
    pub fn column_names(&self) -> Vec<String> {
        self.owner
            .columns
            .iter()
            .chain(self.inverse.columns.iter())
            .map(|c| c.name.clone())
            .collect()
    }

    /// The two foreign keys, owner side first.
    pub fn foreign_keys(&self, junction: EntityId) -> [ForeignKeyMetadata; 2] {
        [
            ConstraintGenerator::junction_foreign_key(&self.table_name, junction, &self.owner),
            ConstraintGenerator::junction_foreign_key(&self.table_name, junction, &self.inverse),
        ]
    }

    /// Name of the composite primary key.
    pub fn primary_key_name(&self) -> String {
        primary_key_name(&self.table_name, &self.column_names())
    }

    /// Materialize the junction as a registry entity.
    pub fn into_entity(self, id: EntityId) -> EntityMetadata {
        let foreign_keys = self.foreign_keys(id).to_vec();
        let info = JunctionInfo {
            owning_relation: self.owning_relation,
            owner_entity: self.owner.entity,
            inverse_entity: self.inverse.entity,
            owner_columns: self.owner.columns.iter().map(|c| c.name.clone()).collect(),
            inverse_columns: self.inverse.columns.iter().map(|c| c.name.clone()).collect(),
        };
        let name = self.table_name.clone();
        let columns = self
            .owner
            .columns
            .into_iter()
            .chain(self.inverse.columns)
            .collect();

        EntityMetadata {
            id,
            name,
            table_name: self.table_name,
            table_type: TableType::Junction,
            columns,
            relations: Vec::new(),
            foreign_keys,
            junction: Some(info),
        }
    }
}

/// Derives junction tables from many-to-many relation pairs.
///
/// Resolution only reads the participating entities, so calling it twice
/// for the same pair yields identical metadata.
pub struct JunctionTableManager<'a> {
    entities: &'a [EntityMetadata],
}

impl<'a> JunctionTableManager<'a> {
    /// Create a manager over the regular entities built so far.
    pub fn new(entities: &'a [EntityMetadata]) -> Self {
        Self { entities }
    }

    /// Resolve the junction for a many-to-many relation and its optional
    /// inverse. The arguments may be given in either order.
    pub fn resolve_junction(
        &self,
        a: &RelationMetadata,
        b: Option<&RelationMetadata>,
    ) -> Result<JunctionTableMetadata, MetadataError> {
        let (owning, inverse) = match b {
            Some(b) if !a.owning && b.owning => (b, Some(a)),
            _ => (a, b),
        };

        if !owning.is_many_to_many() {
            return Err(self.mismatch(owning, owning, "junction tables realize many-to-many relations only"));
        }
        if !owning.owning {
            return Err(MetadataError::NoOwningSide {
                entity: self.entity(owning.entity).name.clone(),
                property: owning.property.clone(),
                kind: owning.kind.to_string(),
            });
        }
        if let Some(inverse) = inverse {
            if inverse.owning {
                return Err(MetadataError::AmbiguousOwner {
                    entity: self.entity(owning.entity).name.clone(),
                    property: owning.property.clone(),
                    inverse: inverse.property.clone(),
                });
            }
            if !inverse.is_many_to_many()
                || inverse.entity != owning.target
                || inverse.target != owning.entity
            {
                return Err(self.mismatch(owning, inverse, "it does not navigate back through the same pair"));
            }
        }

        let owner_entity = self.entity(owning.entity);
        let inverse_entity = self.entity(owning.target);
        let self_referencing = owner_entity.id == inverse_entity.id;

        let table_name = owning
            .join_table_name
            .clone()
            .unwrap_or_else(|| Self::default_name(&owner_entity.table_name, &inverse_entity.table_name));

        let owner = Self::side(
            owner_entity,
            Some(owning.id),
            if self_referencing { "_1" } else { "" },
            owning.deferrable,
            owning.on_delete,
            owning.on_update,
        )?;
        let inverse_side = Self::side(
            inverse_entity,
            inverse.map(|r| r.id),
            if self_referencing { "_2" } else { "" },
            inverse.and_then(|r| r.deferrable),
            inverse.and_then(|r| r.on_delete),
            inverse.and_then(|r| r.on_update),
        )?;

        Ok(JunctionTableMetadata {
            table_name,
            owning_relation: owning.id,
            owner,
            inverse: inverse_side,
        })
    }

    /// Order-independent name for the junction between two tables.
    pub fn default_name(table_a: &str, table_b: &str) -> String {
        if table_a <= table_b {
            format!("{}_{}", table_a, table_b)
        } else {
            format!("{}_{}", table_b, table_a)
        }
    }

    fn side(
        entity: &EntityMetadata,
        relation: Option<RelationId>,
        suffix: &str,
        deferrable: Option<DeferrableMode>,
        on_delete: Option<ReferentialAction>,
        on_update: Option<ReferentialAction>,
    ) -> Result<JunctionSide, MetadataError> {
        let primary: Vec<&ColumnMetadata> = entity.primary_columns().collect();
        if primary.is_empty() {
            return Err(MetadataError::MissingPrimaryKey {
                entity: entity.name.clone(),
            });
        }

        let columns = primary
            .iter()
            .map(|pk| ColumnMetadata {
                name: format!("{}_{}{}", entity.table_name, pk.name, suffix),
                column_type: pk.column_type,
                nullable: false,
                primary: true,
                default: None,
                generation: None,
                declared: true,
                references: Some(ColumnReference {
                    entity: entity.id,
                    column: pk.name.clone(),
                }),
            })
            .collect();

        Ok(JunctionSide {
            entity: entity.id,
            relation,
            columns,
            referenced_columns: primary.iter().map(|pk| pk.name.clone()).collect(),
            deferrable,
            on_delete: Some(on_delete.unwrap_or(ReferentialAction::Cascade)),
            on_update,
        })
    }

    fn entity(&self, id: EntityId) -> &EntityMetadata {
        &self.entities[id.index()]
    }

    fn mismatch(
        &self,
        relation: &RelationMetadata,
        other: &RelationMetadata,
        reason: &str,
    ) -> MetadataError {
        MetadataError::InverseMismatch {
            entity: self.entity(relation.entity).name.clone(),
            property: relation.property.clone(),
            target: self.entity(relation.target).name.clone(),
            inverse: other.property.clone(),
            reason: reason.to_string(),
        }
    }
}
