//! Reading rows back together with their relations.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::catalog::{EntityMetadata, MetadataRegistry, RelationMetadata};
use crate::connection::{Row, Transaction, Value};
use crate::dialect::{render_select, render_select_through};
use crate::error::Error;

/// A row read back from the database.
///
/// Serializes as a flat map of declared columns followed by the loaded
/// relations.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedEntity {
    /// Entity name.
    pub entity: String,
    /// Declared column values in declaration order.
    pub columns: Vec<(String, Value)>,
    /// Loaded relations in request order.
    pub relations: Vec<(String, LoadedRelation)>,
}

/// A loaded relation.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedRelation {
    One(Option<Box<LoadedEntity>>),
    Many(Vec<LoadedEntity>),
}

impl LoadedEntity {
    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    /// Get a loaded relation.
    pub fn relation(&self, property: &str) -> Option<&LoadedRelation> {
        self.relations.iter().find(|(p, _)| p == property).map(|(_, r)| r)
    }

    /// Render as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, Error> {
        serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl Serialize for LoadedEntity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len() + self.relations.len()))?;
        for (column, value) in &self.columns {
            map.serialize_entry(column, value)?;
        }
        for (property, relation) in &self.relations {
            map.serialize_entry(property, relation)?;
        }
        map.end()
    }
}

impl Serialize for LoadedRelation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LoadedRelation::One(None) => serializer.serialize_none(),
            LoadedRelation::One(Some(entity)) => entity.serialize(serializer),
            LoadedRelation::Many(entities) => {
                let mut seq = serializer.serialize_seq(Some(entities.len()))?;
                for entity in entities {
                    seq.serialize_element(entity)?;
                }
                seq.end()
            }
        }
    }
}

/// Loads entities and one level of relations.
pub struct EntityReader<'r> {
    registry: &'r MetadataRegistry,
}

impl<'r> EntityReader<'r> {
    pub fn new(registry: &'r MetadataRegistry) -> Self {
        Self { registry }
    }

    /// Load one row by primary key with the named relations.
    pub fn find_by_id(
        &self,
        tx: &mut Transaction<'_>,
        entity: &str,
        key: &[Value],
        relations: &[&str],
    ) -> Result<Option<LoadedEntity>, Error> {
        let entity = self.entity(entity)?;
        let primary = entity.primary_column_names();
        if key.len() != primary.len() {
            return Err(Error::InvalidGraph(format!(
                "'{}' has {} primary columns but {} values were given",
                entity.name,
                primary.len(),
                key.len()
            )));
        }
        let columns = all_columns(entity);
        let sql = render_select(&entity.table_name, &columns, &primary, &[], tx.capabilities());
        let rows = tx.query(&sql, key)?;
        match rows.first() {
            Some(row) => Ok(Some(self.load(tx, entity, &columns, row, relations)?)),
            None => Ok(None),
        }
    }

    /// Load every row of an entity, ordered by primary key.
    pub fn find_all(
        &self,
        tx: &mut Transaction<'_>,
        entity: &str,
        relations: &[&str],
    ) -> Result<Vec<LoadedEntity>, Error> {
        let entity = self.entity(entity)?;
        let columns = all_columns(entity);
        let sql = render_select(
            &entity.table_name,
            &columns,
            &[],
            &entity.primary_column_names(),
            tx.capabilities(),
        );
        let rows = tx.query(&sql, &[])?;
        rows.iter()
            .map(|row| self.load(tx, entity, &columns, row, relations))
            .collect()
    }

    fn entity(&self, name: &str) -> Result<&'r EntityMetadata, Error> {
        self.registry
            .entity_by_name(name)
            .ok_or_else(|| Error::InvalidGraph(format!("unknown entity '{}'", name)))
    }

    fn load(
        &self,
        tx: &mut Transaction<'_>,
        entity: &EntityMetadata,
        columns: &[String],
        row: &Row,
        relations: &[&str],
    ) -> Result<LoadedEntity, Error> {
        let mut loaded = plain(entity, columns, row);
        for property in relations {
            let relation = self.registry.relation_by_property(entity.id, property).ok_or_else(|| {
                Error::InvalidGraph(format!("'{}' has no relation '{}'", entity.name, property))
            })?;
            let value = self.load_relation(tx, entity, columns, row, relation)?;
            loaded.relations.push((property.to_string(), value));
        }
        Ok(loaded)
    }

    fn load_relation(
        &self,
        tx: &mut Transaction<'_>,
        entity: &EntityMetadata,
        columns: &[String],
        row: &Row,
        relation: &RelationMetadata,
    ) -> Result<LoadedRelation, Error> {
        let caps = tx.capabilities();
        let target = self.registry.entity(relation.target);
        let target_columns = all_columns(target);
        let value_of = |name: &str| {
            columns
                .iter()
                .position(|c| c == name)
                .and_then(|i| row.get_index(i))
                .cloned()
                .unwrap_or_default()
        };

        if relation.has_join_columns() {
            let key: Vec<Value> = relation.join_columns.iter().map(|jc| value_of(&jc.name)).collect();
            if key.iter().any(Value::is_null) {
                return Ok(LoadedRelation::One(None));
            }
            let referenced: Vec<String> = relation
                .join_columns
                .iter()
                .map(|jc| jc.referenced_column.clone())
                .collect();
            let sql = render_select(&target.table_name, &target_columns, &referenced, &[], caps);
            let rows = tx.query(&sql, &key)?;
            return Ok(LoadedRelation::One(
                rows.first().map(|r| Box::new(plain(target, &target_columns, r))),
            ));
        }

        if relation.is_referenced_by_target() {
            let inverse = relation.inverse.map(|id| self.registry.relation(id)).ok_or_else(|| {
                Error::InvalidGraph(format!("'{}.{}' has no owning side", entity.name, relation.property))
            })?;
            let key: Vec<Value> = inverse
                .join_columns
                .iter()
                .map(|jc| value_of(&jc.referenced_column))
                .collect();
            let join: Vec<String> = inverse.join_columns.iter().map(|jc| jc.name.clone()).collect();
            let sql = render_select(
                &target.table_name,
                &target_columns,
                &join,
                &target.primary_column_names(),
                caps,
            );
            let children: Vec<LoadedEntity> = tx
                .query(&sql, &key)?
                .iter()
                .map(|r| plain(target, &target_columns, r))
                .collect();
            return Ok(if relation.kind.is_to_many() {
                LoadedRelation::Many(children)
            } else {
                LoadedRelation::One(children.into_iter().next().map(Box::new))
            });
        }

        let junction = relation
            .junction
            .map(|id| self.registry.entity(id))
            .and_then(|j| j.junction.as_ref().map(|info| (j, info)));
        let Some((junction, info)) = junction else {
            return Err(Error::InvalidGraph(format!(
                "'{}.{}' cannot be loaded",
                entity.name, relation.property
            )));
        };
        let (anchor, other) = if relation.owning {
            (&info.owner_columns, &info.inverse_columns)
        } else {
            (&info.inverse_columns, &info.owner_columns)
        };
        let referenced = |name: &String| {
            junction
                .column(name)
                .and_then(|c| c.references.as_ref())
                .map(|r| r.column.clone())
                .unwrap_or_else(|| name.clone())
        };
        let key: Vec<Value> = anchor.iter().map(|c| value_of(&referenced(c))).collect();
        let join: Vec<(String, String)> = other.iter().map(|c| (c.clone(), referenced(c))).collect();
        let sql = render_select_through(target, &target_columns, &junction.table_name, &join, anchor, caps);
        let rows = tx.query(&sql, &key)?;
        Ok(LoadedRelation::Many(
            rows.iter().map(|r| plain(target, &target_columns, r)).collect(),
        ))
    }
}

fn all_columns(entity: &EntityMetadata) -> Vec<String> {
    entity.columns.iter().map(|c| c.name.clone()).collect()
}

/// Declared columns of a row, read by position and decoded by column type.
fn plain(entity: &EntityMetadata, columns: &[String], row: &Row) -> LoadedEntity {
    let values = columns
        .iter()
        .enumerate()
        .filter_map(|(i, name)| {
            let column = entity.column(name).filter(|c| c.declared)?;
            let value = row.get_index(i).cloned().unwrap_or_default();
            Some((name.clone(), value.decode(column.column_type)))
        })
        .collect();
    LoadedEntity {
        entity: entity.name.clone(),
        columns: values,
        relations: Vec::new(),
    }
}
