//! Built relationship metadata.

use rkyv::Archive;

use crate::error::Error;

use super::entity::{EntityId, EntityMetadata};
use super::foreign_key::ForeignKeyMetadata;
use super::relation::{RelationId, RelationMetadata};
use super::types::DeferrableMode;

/// Every entity, junction and relation of a schema, addressed by index.
///
/// Built once by [`MetadataBuilder`](super::MetadataBuilder) and never
/// mutated afterwards; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct MetadataRegistry {
    entities: Vec<EntityMetadata>,
    relations: Vec<RelationMetadata>,
}

impl MetadataRegistry {
    pub(crate) fn new(entities: Vec<EntityMetadata>, relations: Vec<RelationMetadata>) -> Self {
        Self { entities, relations }
    }

    /// All entities: declared ones first, then junctions.
    pub fn entities(&self) -> &[EntityMetadata] {
        &self.entities
    }

    /// All relations, including synthesized inverses.
    pub fn relations(&self) -> &[RelationMetadata] {
        &self.relations
    }

    /// Get an entity by id.
    ///
    /// Ids come from this registry, so indexing cannot go out of bounds for
    /// ids it handed out.
    pub fn entity(&self, id: EntityId) -> &EntityMetadata {
        &self.entities[id.index()]
    }

    /// Get a relation by id.
    pub fn relation(&self, id: RelationId) -> &RelationMetadata {
        &self.relations[id.index()]
    }

    /// Find the first entity matching a predicate.
    pub fn find<P>(&self, predicate: P) -> Option<&EntityMetadata>
    where
        P: Fn(&EntityMetadata) -> bool,
    {
        self.entities.iter().find(|e| predicate(*e))
    }

    /// Get an entity by name.
    pub fn entity_by_name(&self, name: &str) -> Option<&EntityMetadata> {
        self.find(|e| e.name == name)
    }

    /// Get an entity by table name.
    pub fn entity_by_table(&self, table: &str) -> Option<&EntityMetadata> {
        self.find(|e| e.table_name == table)
    }

    /// Get a relation by the property it is declared under.
    pub fn relation_by_property(&self, entity: EntityId, property: &str) -> Option<&RelationMetadata> {
        self.entity(entity)
            .relations
            .iter()
            .map(|id| self.relation(*id))
            .find(|r| r.property == property)
    }

    /// Relations navigable from an entity.
    pub fn relations_of(&self, entity: EntityId) -> impl Iterator<Item = &RelationMetadata> {
        self.entity(entity).relations.iter().map(move |id| self.relation(*id))
    }

    /// All junction entities.
    pub fn junctions(&self) -> impl Iterator<Item = &EntityMetadata> {
        self.entities.iter().filter(|e| e.is_junction())
    }

    /// Find the junction between two tables, in either order.
    pub fn find_junction(&self, table_a: &str, table_b: &str) -> Option<&EntityMetadata> {
        let a = self.entity_by_table(table_a)?.id;
        let b = self.entity_by_table(table_b)?.id;
        self.junctions().find(|j| {
            j.junction.as_ref().is_some_and(|info| {
                (info.owner_entity == a && info.inverse_entity == b)
                    || (info.owner_entity == b && info.inverse_entity == a)
            })
        })
    }

    /// Foreign keys declared on a table, with their deferrable mode.
    pub fn foreign_keys_of(&self, table: &str) -> Vec<(&str, Option<DeferrableMode>)> {
        self.entity_by_table(table)
            .map(|e| {
                e.foreign_keys
                    .iter()
                    .map(|fk| (fk.name.as_str(), fk.deferrable))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Foreign key on `entity` referencing `referenced`.
    pub fn foreign_key_to(&self, entity: EntityId, referenced: EntityId) -> Option<&ForeignKeyMetadata> {
        self.entity(entity)
            .foreign_keys
            .iter()
            .find(|fk| fk.referenced_entity == referenced)
    }

    /// Foreign key realizing a relation's join columns.
    ///
    /// Resolves through the inverse for one-to-many relations, whose key
    /// lives on the target table.
    pub fn foreign_key_for_relation(&self, relation: &RelationMetadata) -> Option<&ForeignKeyMetadata> {
        let owner = if relation.has_join_columns() {
            relation
        } else if relation.is_referenced_by_target() {
            self.relation(relation.inverse?)
        } else {
            return None;
        };
        self.entity(owner.entity)
            .foreign_keys
            .iter()
            .find(|fk| fk.relation == Some(owner.id))
    }

    /// Serialize the registry to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a registry from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}
