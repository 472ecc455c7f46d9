//! Whole-schema DDL generation.

use tracing::info;

use crate::catalog::MetadataRegistry;
use crate::constraint::ConstraintGenerator;
use crate::error::ConstraintError;

use super::capabilities::DialectKind;
use super::render::{render_add_foreign_key, render_create_table, render_drop_table, DdlFragment};

/// Render every table and foreign key of a registry for a dialect.
///
/// Regular tables come first and junction tables last. Foreign keys are
/// rendered inside `CREATE TABLE` on engines that cannot add them later,
/// and as trailing `ALTER TABLE` statements everywhere else.
pub fn generate_schema_objects(
    registry: &MetadataRegistry,
    dialect: DialectKind,
) -> Result<Vec<DdlFragment>, ConstraintError> {
    let caps = dialect.capabilities();
    ConstraintGenerator::validate(registry, caps)?;

    let inline = !caps.supports_alter_add_foreign_key;
    let ordered: Vec<_> = registry
        .entities()
        .iter()
        .filter(|e| !e.is_junction())
        .chain(registry.junctions())
        .collect();

    let mut fragments = Vec::with_capacity(ordered.len());
    for entity in &ordered {
        fragments.push(render_create_table(entity, registry, caps, inline)?);
    }
    if !inline {
        for entity in &ordered {
            for fk in &entity.foreign_keys {
                fragments.push(render_add_foreign_key(fk, registry, caps)?);
            }
        }
    }

    info!(
        dialect = %dialect,
        statements = fragments.len(),
        "generated schema objects"
    );
    Ok(fragments)
}

/// Render `DROP TABLE` for every table, junctions first.
pub fn drop_schema_objects(registry: &MetadataRegistry, dialect: DialectKind) -> Vec<DdlFragment> {
    let caps = dialect.capabilities();
    registry
        .junctions()
        .chain(registry.entities().iter().filter(|e| !e.is_junction()).rev())
        .map(|e| render_drop_table(e, caps))
        .collect()
}
