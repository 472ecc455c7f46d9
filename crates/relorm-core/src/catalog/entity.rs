//! Entity metadata.

use rkyv::Archive;

use super::foreign_key::ForeignKeyMetadata;
use super::relation::RelationId;
use super::types::{ColumnType, DefaultValue, Generation, TableType};

/// Index of an entity in a [`MetadataRegistry`](super::MetadataRegistry).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Archive, rkyv::Serialize, rkyv::Deserialize,
)]
pub struct EntityId(pub u32);

impl EntityId {
    /// Position in the registry's entity list.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Built metadata for one table.
#[derive(Debug, Clone, PartialEq, Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct EntityMetadata {
    /// Registry index.
    pub id: EntityId,
    /// Stable entity name.
    pub name: String,
    /// Table name (unique within the registry).
    pub table_name: String,
    /// Regular or junction table.
    pub table_type: TableType,
    /// Ordered columns, declared columns first, then join columns.
    pub columns: Vec<ColumnMetadata>,
    /// Relations navigable from this entity.
    pub relations: Vec<RelationId>,
    /// Physical foreign keys on this table.
    pub foreign_keys: Vec<ForeignKeyMetadata>,
    /// Participants, for junction tables.
    pub junction: Option<JunctionInfo>,
}

/// One column of an entity table.
#[derive(Debug, Clone, PartialEq, Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct ColumnMetadata {
    /// Column name.
    pub name: String,
    /// Data type.
    pub column_type: ColumnType,
    /// Accepts null.
    pub nullable: bool,
    /// Part of the primary key.
    pub primary: bool,
    /// Default value.
    pub default: Option<DefaultValue>,
    /// Generation strategy.
    pub generation: Option<Generation>,
    /// Declared explicitly (as opposed to synthesized for a relation).
    pub declared: bool,
    /// Column this one references, when it is a join column.
    pub references: Option<ColumnReference>,
}

/// Target of a join column.
#[derive(Debug, Clone, PartialEq, Eq, Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct ColumnReference {
    /// Referenced entity.
    pub entity: EntityId,
    /// Referenced column.
    pub column: String,
}

/// Participants of a junction table.
#[derive(Debug, Clone, PartialEq, Eq, Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct JunctionInfo {
    /// The owning many-to-many relation.
    pub owning_relation: RelationId,
    /// Entity declaring the owning relation.
    pub owner_entity: EntityId,
    /// Entity on the other side.
    pub inverse_entity: EntityId,
    /// Junction columns referencing the owner's primary key.
    pub owner_columns: Vec<String>,
    /// Junction columns referencing the inverse entity's primary key.
    pub inverse_columns: Vec<String>,
}

impl EntityMetadata {
    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary key columns in declaration order.
    pub fn primary_columns(&self) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.iter().filter(|c| c.primary)
    }

    /// Names of the primary key columns.
    pub fn primary_column_names(&self) -> Vec<String> {
        self.primary_columns().map(|c| c.name.clone()).collect()
    }

    /// Columns exposed when an object is read back.
    pub fn declared_columns(&self) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.iter().filter(|c| c.declared)
    }

    /// Whether this is a synthesized junction table.
    pub fn is_junction(&self) -> bool {
        self.table_type == TableType::Junction
    }

    /// Whether the primary key is generated by the database.
    pub fn has_database_generated_key(&self) -> bool {
        self.primary_columns()
            .any(|c| c.generation == Some(Generation::Increment))
    }
}

impl ColumnMetadata {
    /// Whether the value is produced by the database when omitted.
    pub fn is_database_generated(&self) -> bool {
        self.generation == Some(Generation::Increment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, primary: bool, declared: bool) -> ColumnMetadata {
        ColumnMetadata {
            name: name.into(),
            column_type: ColumnType::Integer,
            nullable: false,
            primary,
            default: None,
            generation: if primary { Some(Generation::Increment) } else { None },
            declared,
            references: None,
        }
    }

    #[test]
    fn test_column_lookup() {
        let entity = EntityMetadata {
            id: EntityId(0),
            name: "Comment".into(),
            table_name: "comment".into(),
            table_type: TableType::Regular,
            columns: vec![column("id", true, true), column("post_id", false, false)],
            relations: Vec::new(),
            foreign_keys: Vec::new(),
            junction: None,
        };

        assert_eq!(entity.primary_column_names(), vec!["id".to_string()]);
        assert_eq!(entity.declared_columns().count(), 1);
        assert!(entity.column("post_id").is_some());
        assert!(entity.has_database_generated_key());
        assert!(!entity.is_junction());
    }
}
