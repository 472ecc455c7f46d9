//! Foreign keys derived from relation metadata.

use crate::catalog::{
    EntityId, EntityMetadata, ForeignKeyMetadata, JunctionSide, MetadataRegistry,
    RelationMetadata,
};
use crate::dialect::DialectCapabilities;
use crate::error::ConstraintError;

use super::naming::foreign_key_name;

/// Derives [`ForeignKeyMetadata`] from relations and checks it against a
/// dialect.
///
/// Deferrable policies are copied verbatim. A relation that declared no
/// policy yields a key whose `deferrable` is `None`, never a default mode.
pub struct ConstraintGenerator;

impl ConstraintGenerator {
    /// Foreign key produced by a relation that holds join columns.
    ///
    /// Returns `None` for every relation that does not own join columns:
    /// inverse sides and many-to-many relations never produce a key on
    /// their own table.
    pub fn relation_foreign_key(
        relation: &RelationMetadata,
        table_name: &str,
    ) -> Option<ForeignKeyMetadata> {
        if !relation.has_join_columns() || relation.join_columns.is_empty() {
            return None;
        }

        let columns: Vec<String> = relation.join_columns.iter().map(|c| c.name.clone()).collect();
        let referenced_columns = relation
            .join_columns
            .iter()
            .map(|c| c.referenced_column.clone())
            .collect();

        Some(ForeignKeyMetadata {
            name: foreign_key_name(table_name, &columns),
            entity: relation.entity,
            columns,
            referenced_entity: relation.target,
            referenced_columns,
            on_delete: relation.on_delete,
            on_update: relation.on_update,
            deferrable: relation.deferrable,
            relation: Some(relation.id),
        })
    }

    /// Foreign key from a junction table to one participant.
    pub fn junction_foreign_key(
        junction_table: &str,
        junction: EntityId,
        side: &JunctionSide,
    ) -> ForeignKeyMetadata {
        let columns: Vec<String> = side.columns.iter().map(|c| c.name.clone()).collect();
        ForeignKeyMetadata {
            name: foreign_key_name(junction_table, &columns),
            entity: junction,
            columns,
            referenced_entity: side.entity,
            referenced_columns: side.referenced_columns.clone(),
            on_delete: side.on_delete,
            on_update: side.on_update,
            deferrable: side.deferrable,
            relation: side.relation,
        }
    }

    /// Check every foreign key in the registry against a dialect.
    ///
    /// Runs before any DDL is issued, so a schema that cannot be expressed
    /// is rejected at build time instead of at write time.
    pub fn validate(
        registry: &MetadataRegistry,
        caps: &DialectCapabilities,
    ) -> Result<(), ConstraintError> {
        for entity in registry.entities() {
            Self::validate_identifiers(entity, caps)?;
            for fk in &entity.foreign_keys {
                Self::validate_foreign_key(fk, &entity.table_name, caps)?;
            }
        }
        Ok(())
    }

    /// Check a single foreign key against a dialect.
    pub fn validate_foreign_key(
        fk: &ForeignKeyMetadata,
        table: &str,
        caps: &DialectCapabilities,
    ) -> Result<(), ConstraintError> {
        if let Some(mode) = fk.deferrable {
            if !caps.supports_deferrable(mode) {
                return Err(ConstraintError::UnsupportedDeferrable {
                    constraint: fk.name.clone(),
                    table: table.to_string(),
                    mode: mode.as_sql().to_string(),
                    dialect: caps.name.to_string(),
                });
            }
        }

        if fk.is_composite() && !caps.supports_composite_foreign_keys {
            return Err(ConstraintError::UnsupportedCompositeForeignKey {
                constraint: fk.name.clone(),
                table: table.to_string(),
                dialect: caps.name.to_string(),
            });
        }

        if let Some(action) = fk.on_update {
            if !caps.supports_on_update {
                return Err(ConstraintError::UnsupportedReferentialAction {
                    constraint: fk.name.clone(),
                    table: table.to_string(),
                    clause: "ON UPDATE".to_string(),
                    action: action.as_sql().to_string(),
                    dialect: caps.name.to_string(),
                });
            }
        }

        caps.check_identifier(&fk.name)
    }

    fn validate_identifiers(
        entity: &EntityMetadata,
        caps: &DialectCapabilities,
    ) -> Result<(), ConstraintError> {
        caps.check_identifier(&entity.table_name)?;
        for column in &entity.columns {
            caps.check_identifier(&column.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        build_metadata, CascadeSet, ColumnDecl, ColumnType, DeferrableMode, EntityDecl,
        JoinColumn, ReferentialAction, RelationDecl, RelationId, RelationKind,
    };
    use crate::dialect::DialectKind;

    fn many_to_one(deferrable: Option<DeferrableMode>) -> RelationMetadata {
        RelationMetadata {
            id: RelationId(3),
            entity: EntityId(1),
            property: "author".into(),
            kind: RelationKind::ManyToOne,
            owning: true,
            inverse: None,
            target: EntityId(0),
            deferrable,
            cascade: CascadeSet::none(),
            nullable: true,
            on_delete: Some(ReferentialAction::SetNull),
            on_update: None,
            join_columns: vec![JoinColumn {
                name: "author_id".into(),
                referenced_column: "id".into(),
            }],
            junction: None,
            join_table_name: None,
            synthesized: false,
        }
    }

    #[test]
    fn test_deferrable_copied_verbatim() {
        let fk = ConstraintGenerator::relation_foreign_key(&many_to_one(None), "book").unwrap();
        assert_eq!(fk.deferrable, None);
        assert_eq!(fk.columns, vec!["author_id".to_string()]);
        assert_eq!(fk.referenced_columns, vec!["id".to_string()]);
        assert_eq!(fk.relation, Some(RelationId(3)));

        let fk = ConstraintGenerator::relation_foreign_key(
            &many_to_one(Some(DeferrableMode::NotDeferrable)),
            "book",
        )
        .unwrap();
        assert_eq!(fk.deferrable, Some(DeferrableMode::NotDeferrable));
    }

    #[test]
    fn test_inverse_side_produces_no_key() {
        let mut relation = many_to_one(None);
        relation.kind = RelationKind::OneToMany;
        relation.owning = false;
        assert!(ConstraintGenerator::relation_foreign_key(&relation, "author").is_none());
    }

    fn deferred_schema() -> MetadataRegistry {
        build_metadata(&[
            EntityDecl::new("Post")
                .with_column(ColumnDecl::primary("id", ColumnType::Integer))
                .with_relation(
                    RelationDecl::many_to_many("categories", "Category")
                        .owning()
                        .deferrable(DeferrableMode::InitiallyDeferred),
                ),
            EntityDecl::new("Category").with_column(ColumnDecl::primary("id", ColumnType::Integer)),
        ])
        .unwrap()
    }

    #[test]
    fn test_validate_rejects_unsupported_deferral() {
        let registry = deferred_schema();

        assert!(ConstraintGenerator::validate(&registry, DialectKind::Postgres.capabilities()).is_ok());
        assert!(ConstraintGenerator::validate(&registry, DialectKind::Sqlite.capabilities()).is_ok());
        assert!(ConstraintGenerator::validate(&registry, DialectKind::Sap.capabilities()).is_ok());

        let err = ConstraintGenerator::validate(&registry, DialectKind::MySql.capabilities()).unwrap_err();
        match err {
            ConstraintError::UnsupportedDeferrable { mode, dialect, table, .. } => {
                assert_eq!(mode, "INITIALLY DEFERRED");
                assert_eq!(dialect, "mysql");
                assert_eq!(table, "category_post");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validate_accepts_absent_policy_everywhere() {
        let registry = build_metadata(&[
            EntityDecl::new("Article")
                .with_column(ColumnDecl::primary("id", ColumnType::Integer))
                .with_relation(RelationDecl::many_to_many("tags", "Tag").owning()),
            EntityDecl::new("Tag").with_column(ColumnDecl::primary("id", ColumnType::Integer)),
        ])
        .unwrap();

        for kind in DialectKind::ALL {
            assert!(ConstraintGenerator::validate(&registry, kind.capabilities()).is_ok());
        }
    }

    #[test]
    fn test_validate_rejects_on_update_on_oracle() {
        let registry = build_metadata(&[
            EntityDecl::new("Author").with_column(ColumnDecl::primary("id", ColumnType::Integer)),
            EntityDecl::new("Book")
                .with_column(ColumnDecl::primary("id", ColumnType::Integer))
                .with_relation(
                    RelationDecl::many_to_one("author", "Author").on_update(ReferentialAction::Cascade),
                ),
        ])
        .unwrap();

        let err = ConstraintGenerator::validate(&registry, DialectKind::Oracle.capabilities()).unwrap_err();
        assert!(matches!(err, ConstraintError::UnsupportedReferentialAction { .. }));
        assert!(err.to_string().contains("oracle"));
    }
}
