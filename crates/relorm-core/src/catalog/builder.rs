//! Builds a [`MetadataRegistry`] from entity declarations.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::constraint::ConstraintGenerator;
use crate::error::MetadataError;

use super::declaration::EntityDecl;
use super::entity::{ColumnMetadata, ColumnReference, EntityId, EntityMetadata};
use super::junction::JunctionTableManager;
use super::registry::MetadataRegistry;
use super::relation::{JoinColumn, RelationId, RelationMetadata};
use super::types::{CascadeSet, RelationKind, TableType};

/// Build metadata for a set of declarations.
pub fn build_metadata(declarations: &[EntityDecl]) -> Result<MetadataRegistry, MetadataError> {
    MetadataBuilder::new(declarations).build()
}

/// Turns declarations into an immutable, index-based registry.
///
/// The build runs in fixed passes: entities, declared relations, inverse
/// pairing, ownership checks, join columns with their foreign keys, then
/// junction tables. Any malformed declaration aborts the whole build.
pub struct MetadataBuilder<'a> {
    declarations: &'a [EntityDecl],
    entities: Vec<EntityMetadata>,
    relations: Vec<RelationMetadata>,
    /// `inverse_side` of each declared relation, indexed like `relations`.
    inverse_sides: Vec<Option<String>>,
    /// Table name to the name of whatever claimed it first.
    tables: HashMap<String, String>,
}

impl<'a> MetadataBuilder<'a> {
    /// Create a builder over a set of declarations.
    pub fn new(declarations: &'a [EntityDecl]) -> Self {
        Self {
            declarations,
            entities: Vec::with_capacity(declarations.len()),
            relations: Vec::new(),
            inverse_sides: Vec::new(),
            tables: HashMap::new(),
        }
    }

    /// Run every pass and return the registry.
    pub fn build(mut self) -> Result<MetadataRegistry, MetadataError> {
        self.collect_entities()?;
        self.collect_relations()?;
        self.pair_inverses()?;
        self.check_ownership()?;
        self.build_join_columns()?;
        self.build_junctions()?;

        let junctions = self.entities.iter().filter(|e| e.is_junction()).count();
        info!(
            entities = self.entities.len() - junctions,
            junctions,
            relations = self.relations.len(),
            "built relationship metadata"
        );

        Ok(MetadataRegistry::new(self.entities, self.relations))
    }

    fn collect_entities(&mut self) -> Result<(), MetadataError> {
        let declarations = self.declarations;
        let mut names = HashSet::new();

        for (index, decl) in declarations.iter().enumerate() {
            if !names.insert(decl.name.as_str()) {
                return Err(MetadataError::DuplicateEntity {
                    entity: decl.name.clone(),
                });
            }

            let table_name = decl.resolved_table_name();
            self.claim_table(&table_name, &decl.name)?;

            let mut columns: Vec<ColumnMetadata> = Vec::with_capacity(decl.columns.len());
            for column in &decl.columns {
                if columns.iter().any(|c| c.name == column.name) {
                    return Err(MetadataError::DuplicateProperty {
                        entity: decl.name.clone(),
                        property: column.name.clone(),
                    });
                }
                columns.push(ColumnMetadata {
                    name: column.name.clone(),
                    column_type: column.column_type,
                    nullable: column.nullable && !column.primary,
                    primary: column.primary,
                    default: column.default.clone(),
                    generation: column.generation,
                    declared: true,
                    references: None,
                });
            }

            self.entities.push(EntityMetadata {
                id: EntityId(index as u32),
                name: decl.name.clone(),
                table_name,
                table_type: TableType::Regular,
                columns,
                relations: Vec::new(),
                foreign_keys: Vec::new(),
                junction: None,
            });
        }

        Ok(())
    }

    fn collect_relations(&mut self) -> Result<(), MetadataError> {
        let declarations = self.declarations;
        for (index, decl) in declarations.iter().enumerate() {
            let entity = EntityId(index as u32);

            for relation in &decl.relations {
                if self.property_taken(entity, &relation.property) {
                    return Err(MetadataError::DuplicateProperty {
                        entity: decl.name.clone(),
                        property: relation.property.clone(),
                    });
                }

                let target = self
                    .entities
                    .iter()
                    .find(|e| e.name == relation.target)
                    .map(|e| e.id)
                    .ok_or_else(|| MetadataError::UnknownTarget {
                        entity: decl.name.clone(),
                        property: relation.property.clone(),
                        target: relation.target.clone(),
                    })?;

                let id = RelationId(self.relations.len() as u32);
                self.relations.push(RelationMetadata {
                    id,
                    entity,
                    property: relation.property.clone(),
                    kind: relation.kind,
                    owning: relation.is_owning(),
                    inverse: None,
                    target,
                    deferrable: relation.deferrable,
                    cascade: relation.cascade,
                    nullable: relation.nullable,
                    on_delete: relation.on_delete,
                    on_update: relation.on_update,
                    join_columns: Vec::new(),
                    junction: None,
                    join_table_name: relation.join_table_name.clone(),
                    synthesized: false,
                });
                self.inverse_sides.push(relation.inverse_side.clone());
                self.entities[entity.index()].relations.push(id);
            }
        }

        Ok(())
    }

    /// Link each relation to its inverse, synthesizing inverses that are
    /// named but not declared on the target.
    fn pair_inverses(&mut self) -> Result<(), MetadataError> {
        for index in 0..self.inverse_sides.len() {
            let Some(inverse_property) = self.inverse_sides[index].clone() else {
                continue;
            };
            let id = RelationId(index as u32);
            let relation = self.relations[index].clone();

            match self.find_relation(relation.target, &inverse_property) {
                Some(other_id) => {
                    let other = &self.relations[other_id.index()];
                    let reason = if other_id == id {
                        Some("a relation cannot be its own inverse".to_string())
                    } else if other.kind != relation.kind.mirrored() {
                        Some(format!(
                            "expected a {} relation, found {}",
                            relation.kind.mirrored(),
                            other.kind
                        ))
                    } else if other.target != relation.entity {
                        Some(format!(
                            "it targets '{}'",
                            self.entities[other.target.index()].name
                        ))
                    } else if other.inverse.is_some_and(|i| i != id) {
                        Some("it is already paired with another relation".to_string())
                    } else {
                        match self.inverse_sides.get(other_id.index()).cloned().flatten() {
                            Some(named) if named != relation.property => {
                                Some(format!("it names '{}' as its inverse", named))
                            }
                            _ => None,
                        }
                    };

                    if let Some(reason) = reason {
                        return Err(self.inverse_mismatch(&relation, &inverse_property, reason));
                    }

                    self.relations[index].inverse = Some(other_id);
                    self.relations[other_id.index()].inverse = Some(id);
                }
                None if relation.owning => {
                    self.synthesize_inverse(&relation, inverse_property)?;
                }
                None => {
                    return Err(MetadataError::MissingInverse {
                        entity: self.entity_name(relation.entity),
                        property: relation.property.clone(),
                        target: self.entity_name(relation.target),
                    });
                }
            }
        }

        Ok(())
    }

    fn synthesize_inverse(
        &mut self,
        relation: &RelationMetadata,
        property: String,
    ) -> Result<(), MetadataError> {
        if self.property_taken(relation.target, &property) {
            return Err(MetadataError::DuplicateProperty {
                entity: self.entity_name(relation.target),
                property,
            });
        }

        let id = RelationId(self.relations.len() as u32);
        debug!(
            entity = %self.entity_name(relation.target),
            property = %property,
            "synthesizing inverse relation"
        );

        self.relations.push(RelationMetadata {
            id,
            entity: relation.target,
            property,
            kind: relation.kind.mirrored(),
            owning: false,
            inverse: Some(relation.id),
            target: relation.entity,
            deferrable: None,
            cascade: CascadeSet::none(),
            nullable: true,
            on_delete: None,
            on_update: None,
            join_columns: Vec::new(),
            junction: None,
            join_table_name: None,
            synthesized: true,
        });
        self.relations[relation.id.index()].inverse = Some(id);
        self.entities[relation.target.index()].relations.push(id);
        Ok(())
    }

    fn check_ownership(&self) -> Result<(), MetadataError> {
        for relation in &self.relations {
            match (relation.kind, relation.inverse) {
                (RelationKind::OneToMany, None) => {
                    return Err(MetadataError::MissingInverse {
                        entity: self.entity_name(relation.entity),
                        property: relation.property.clone(),
                        target: self.entity_name(relation.target),
                    });
                }
                (RelationKind::OneToOne | RelationKind::ManyToMany, Some(inverse)) => {
                    let inverse = &self.relations[inverse.index()];
                    if relation.owning && inverse.owning {
                        return Err(MetadataError::AmbiguousOwner {
                            entity: self.entity_name(relation.entity),
                            property: relation.property.clone(),
                            inverse: inverse.property.clone(),
                        });
                    }
                    if !relation.owning && !inverse.owning {
                        return Err(self.no_owning_side(relation));
                    }
                }
                (RelationKind::OneToOne | RelationKind::ManyToMany, None) if !relation.owning => {
                    return Err(self.no_owning_side(relation));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Add join columns and foreign keys for owning many-to-one and
    /// one-to-one relations.
    fn build_join_columns(&mut self) -> Result<(), MetadataError> {
        for index in 0..self.relations.len() {
            if !self.relations[index].has_join_columns() {
                continue;
            }

            let relation = &self.relations[index];
            let target = &self.entities[relation.target.index()];
            let primary: Vec<ColumnMetadata> = target.primary_columns().cloned().collect();
            if primary.is_empty() {
                return Err(MetadataError::MissingPrimaryKey {
                    entity: target.name.clone(),
                });
            }

            let target_id = target.id;
            let owner = relation.entity;
            let nullable = relation.nullable;
            let mut join_columns = Vec::with_capacity(primary.len());

            for pk in &primary {
                let name = format!("{}_{}", relation.property, pk.name);
                let reference = ColumnReference {
                    entity: target_id,
                    column: pk.name.clone(),
                };
                let entity = &mut self.entities[owner.index()];
                match entity.columns.iter_mut().find(|c| c.name == name) {
                    Some(existing) => existing.references = Some(reference),
                    None => entity.columns.push(ColumnMetadata {
                        name: name.clone(),
                        column_type: pk.column_type,
                        nullable,
                        primary: false,
                        default: None,
                        generation: None,
                        declared: false,
                        references: Some(reference),
                    }),
                }
                join_columns.push(JoinColumn {
                    name,
                    referenced_column: pk.name.clone(),
                });
            }

            self.relations[index].join_columns = join_columns;
            let entity = &mut self.entities[owner.index()];
            if let Some(fk) =
                ConstraintGenerator::relation_foreign_key(&self.relations[index], &entity.table_name)
            {
                entity.foreign_keys.push(fk);
            }
        }
        Ok(())
    }

    fn build_junctions(&mut self) -> Result<(), MetadataError> {
        for index in 0..self.relations.len() {
            let relation = &self.relations[index];
            if !(relation.is_many_to_many() && relation.owning) {
                continue;
            }

            let inverse = relation.inverse.map(|id| &self.relations[id.index()]);
            let junction =
                JunctionTableManager::new(&self.entities).resolve_junction(relation, inverse)?;
            let claimant = format!(
                "{}.{}",
                self.entities[relation.entity.index()].name,
                relation.property
            );
            let inverse_id = relation.inverse;
            self.claim_table(&junction.table_name, &claimant)?;

            let id = EntityId(self.entities.len() as u32);
            debug!(table = %junction.table_name, owner = %claimant, "resolved junction table");
            self.entities.push(junction.into_entity(id));

            self.relations[index].junction = Some(id);
            if let Some(inverse_id) = inverse_id {
                self.relations[inverse_id.index()].junction = Some(id);
            }
        }
        Ok(())
    }

    fn claim_table(&mut self, table: &str, claimant: &str) -> Result<(), MetadataError> {
        if let Some(first) = self.tables.get(table) {
            return Err(MetadataError::DuplicateTable {
                table: table.to_string(),
                first: first.clone(),
                second: claimant.to_string(),
            });
        }
        self.tables.insert(table.to_string(), claimant.to_string());
        Ok(())
    }

    fn property_taken(&self, entity: EntityId, property: &str) -> bool {
        let entity = &self.entities[entity.index()];
        entity.column(property).is_some() || self.find_relation(entity.id, property).is_some()
    }

    fn find_relation(&self, entity: EntityId, property: &str) -> Option<RelationId> {
        self.entities[entity.index()]
            .relations
            .iter()
            .copied()
            .find(|id| self.relations[id.index()].property == property)
    }

    fn entity_name(&self, id: EntityId) -> String {
        self.entities[id.index()].name.clone()
    }

    fn no_owning_side(&self, relation: &RelationMetadata) -> MetadataError {
        MetadataError::NoOwningSide {
            entity: self.entity_name(relation.entity),
            property: relation.property.clone(),
            kind: relation.kind.to_string(),
        }
    }

    fn inverse_mismatch(
        &self,
        relation: &RelationMetadata,
        inverse: &str,
        reason: String,
    ) -> MetadataError {
        MetadataError::InverseMismatch {
            entity: self.entity_name(relation.entity),
            property: relation.property.clone(),
            target: self.entity_name(relation.target),
            inverse: inverse.to_string(),
            reason,
        }
    }
}
