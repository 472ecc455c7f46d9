//! SQL rendering parameterized by a capability set.
//!
//! One function per statement shape. None of them branch on the engine
//! itself; every difference comes from [`DialectCapabilities`].

use std::fmt::Write;

use crate::catalog::{
    ColumnMetadata, DefaultValue, DeferrableMode, EntityMetadata, ForeignKeyMetadata,
    Generation, MetadataRegistry,
};
use crate::constraint::{primary_key_name, ConstraintGenerator};
use crate::error::ConstraintError;

use super::capabilities::{DialectCapabilities, IdentityStyle};

/// Kind of schema object a fragment creates or drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlKind {
    /// `CREATE TABLE`, with inline constraints.
    CreateTable,
    /// A `CONSTRAINT ... FOREIGN KEY` clause.
    ForeignKey,
    /// `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY`.
    AddForeignKey,
    /// `DROP TABLE`.
    DropTable,
}

/// One rendered DDL statement or clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdlFragment {
    /// What the fragment does.
    pub kind: DdlKind,
    /// Table the fragment applies to.
    pub table: String,
    /// Constraint name, for constraint fragments.
    pub name: Option<String>,
    /// Engine-specific SQL.
    pub sql: String,
}

/// Numbered placeholders in the dialect's bind style.
struct Placeholders<'c> {
    caps: &'c DialectCapabilities,
    next: usize,
}

impl<'c> Placeholders<'c> {
    fn new(caps: &'c DialectCapabilities) -> Self {
        Self { caps, next: 1 }
    }

    fn next(&mut self) -> String {
        let placeholder = self.caps.placeholder(self.next);
        self.next += 1;
        placeholder
    }
}

fn quote_list(columns: &[String], caps: &DialectCapabilities) -> String {
    columns
        .iter()
        .map(|c| caps.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn conditions(
    columns: &[String],
    qualifier: Option<&str>,
    placeholders: &mut Placeholders<'_>,
) -> String {
    let caps = placeholders.caps;
    columns
        .iter()
        .map(|c| {
            let column = match qualifier {
                Some(alias) => format!("{}.{}", alias, caps.quote_identifier(c)),
                None => caps.quote_identifier(c),
            };
            format!("{} = {}", column, placeholders.next())
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// The deferral clause for a mode, or `None` when no policy was declared.
///
/// Callers are expected to have validated the mode against `caps`.
pub fn deferrable_clause(mode: Option<DeferrableMode>, caps: &DialectCapabilities) -> Option<String> {
    match mode? {
        DeferrableMode::NotDeferrable => Some("NOT DEFERRABLE".to_string()),
        mode if caps.deferrable_keyword => Some(format!("DEFERRABLE {}", mode.as_sql())),
        mode => Some(mode.as_sql().to_string()),
    }
}

/// Render a foreign key as a `CONSTRAINT` clause.
///
/// Fails when the key asks for something the dialect cannot express. A key
/// without a deferrable policy renders no deferral clause on any dialect.
pub fn render_foreign_key(
    fk: &ForeignKeyMetadata,
    registry: &MetadataRegistry,
    caps: &DialectCapabilities,
) -> Result<DdlFragment, ConstraintError> {
    let table = &registry.entity(fk.entity).table_name;
    ConstraintGenerator::validate_foreign_key(fk, table, caps)?;

    let referenced = registry.entity(fk.referenced_entity);
    let name = caps.constraint_name(&fk.name);
    let mut sql = format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        caps.quote_identifier(name),
        quote_list(&fk.columns, caps),
        caps.quote_identifier(&referenced.table_name),
        quote_list(&fk.referenced_columns, caps),
    );
    if let Some(action) = fk.on_delete {
        let _ = write!(sql, " ON DELETE {}", action.as_sql());
    }
    if let Some(action) = fk.on_update {
        let _ = write!(sql, " ON UPDATE {}", action.as_sql());
    }
    if let Some(clause) = deferrable_clause(fk.deferrable, caps) {
        sql.push(' ');
        sql.push_str(&clause);
    }

    Ok(DdlFragment {
        kind: DdlKind::ForeignKey,
        table: table.clone(),
        name: Some(name.to_string()),
        sql,
    })
}

/// Render `ALTER TABLE ... ADD` for a foreign key.
pub fn render_add_foreign_key(
    fk: &ForeignKeyMetadata,
    registry: &MetadataRegistry,
    caps: &DialectCapabilities,
) -> Result<DdlFragment, ConstraintError> {
    let clause = render_foreign_key(fk, registry, caps)?;
    Ok(DdlFragment {
        kind: DdlKind::AddForeignKey,
        sql: format!("ALTER TABLE {} ADD {}", caps.quote_identifier(&clause.table), clause.sql),
        ..clause
    })
}

fn default_literal(default: &DefaultValue, caps: &DialectCapabilities) -> String {
    match default {
        DefaultValue::Null => "NULL".to_string(),
        DefaultValue::Bool(true) => caps.types.true_literal.to_string(),
        DefaultValue::Bool(false) => caps.types.false_literal.to_string(),
        DefaultValue::Int(v) => v.to_string(),
        DefaultValue::Float(v) => v.to_string(),
        DefaultValue::String(s) => format!("'{}'", s.replace('\'', "''")),
        DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        DefaultValue::Expression(expr) => expr.clone(),
    }
}

fn column_definition(
    column: &ColumnMetadata,
    single_primary: bool,
    caps: &DialectCapabilities,
) -> String {
    let name = caps.quote_identifier(&column.name);
    let identity = column.primary && column.generation == Some(Generation::Increment);

    if identity {
        match caps.identity_style {
            IdentityStyle::InlineAutoincrement if single_primary => {
                return format!("{} {} PRIMARY KEY AUTOINCREMENT NOT NULL", name, caps.types.integer);
            }
            IdentityStyle::GeneratedAsIdentity => {
                return format!(
                    "{} {} GENERATED BY DEFAULT AS IDENTITY NOT NULL",
                    name,
                    caps.type_name(column.column_type)
                );
            }
            IdentityStyle::AutoIncrement => {
                return format!("{} {} NOT NULL AUTO_INCREMENT", name, caps.type_name(column.column_type));
            }
            IdentityStyle::Identity => {
                return format!("{} {} IDENTITY(1,1) NOT NULL", name, caps.type_name(column.column_type));
            }
            IdentityStyle::InlineAutoincrement => {}
        }
    }

    let mut sql = format!("{} {}", name, caps.type_name(column.column_type));
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        let _ = write!(sql, " DEFAULT {}", default_literal(default, caps));
    }
    sql
}

/// Render `CREATE TABLE` for an entity.
///
/// With `inline_foreign_keys` the entity's foreign keys are rendered inside
/// the table body; otherwise the caller adds them afterwards.
pub fn render_create_table(
    entity: &EntityMetadata,
    registry: &MetadataRegistry,
    caps: &DialectCapabilities,
    inline_foreign_keys: bool,
) -> Result<DdlFragment, ConstraintError> {
    let primary = entity.primary_column_names();
    let single_primary = primary.len() == 1;
    let inline_autoincrement = caps.identity_style == IdentityStyle::InlineAutoincrement
        && single_primary
        && entity.has_database_generated_key();

    let mut parts: Vec<String> = entity
        .columns
        .iter()
        .map(|c| column_definition(c, single_primary, caps))
        .collect();

    if !primary.is_empty() && !inline_autoincrement {
        parts.push(format!(
            "CONSTRAINT {} PRIMARY KEY ({})",
            caps.quote_identifier(caps.constraint_name(&primary_key_name(&entity.table_name, &primary))),
            quote_list(&primary, caps)
        ));
    }

    if inline_foreign_keys {
        for fk in &entity.foreign_keys {
            parts.push(render_foreign_key(fk, registry, caps)?.sql);
        }
    }

    Ok(DdlFragment {
        kind: DdlKind::CreateTable,
        table: entity.table_name.clone(),
        name: None,
        sql: format!(
            "CREATE TABLE {} ({})",
            caps.quote_identifier(&entity.table_name),
            parts.join(", ")
        ),
    })
}

/// Render `DROP TABLE` for an entity.
pub fn render_drop_table(entity: &EntityMetadata, caps: &DialectCapabilities) -> DdlFragment {
    let if_exists = if caps.supports_drop_if_exists { "IF EXISTS " } else { "" };
    DdlFragment {
        kind: DdlKind::DropTable,
        table: entity.table_name.clone(),
        name: None,
        sql: format!("DROP TABLE {}{}", if_exists, caps.quote_identifier(&entity.table_name)),
    }
}

/// Render an `INSERT`, optionally returning generated columns.
pub fn render_insert(
    entity: &EntityMetadata,
    columns: &[String],
    returning: &[String],
    caps: &DialectCapabilities,
) -> String {
    let table = caps.quote_identifier(&entity.table_name);
    let mut sql = if !columns.is_empty() {
        let mut placeholders = Placeholders::new(caps);
        let values: Vec<String> = columns.iter().map(|_| placeholders.next()).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            quote_list(columns, caps),
            values.join(", ")
        )
    } else if caps.supports_default_values {
        format!("INSERT INTO {} DEFAULT VALUES", table)
    } else {
        let primary = entity.primary_column_names();
        let defaults = vec!["DEFAULT"; primary.len()].join(", ");
        format!("INSERT INTO {} ({}) VALUES ({})", table, quote_list(&primary, caps), defaults)
    };

    if caps.supports_returning && !returning.is_empty() {
        let _ = write!(sql, " RETURNING {}", quote_list(returning, caps));
    }
    sql
}

/// Render an `UPDATE` of `set_columns` filtered by equality on `key_columns`.
pub fn render_update(
    table: &str,
    set_columns: &[String],
    key_columns: &[String],
    caps: &DialectCapabilities,
) -> String {
    let mut placeholders = Placeholders::new(caps);
    let assignments = set_columns
        .iter()
        .map(|c| format!("{} = {}", caps.quote_identifier(c), placeholders.next()))
        .collect::<Vec<_>>()
        .join(", ");
    let filter = conditions(key_columns, None, &mut placeholders);
    format!(
        "UPDATE {} SET {} WHERE {}",
        caps.quote_identifier(table),
        assignments,
        filter
    )
}

/// Render a `DELETE` filtered by equality on `key_columns`.
pub fn render_delete(table: &str, key_columns: &[String], caps: &DialectCapabilities) -> String {
    let mut placeholders = Placeholders::new(caps);
    format!(
        "DELETE FROM {} WHERE {}",
        caps.quote_identifier(table),
        conditions(key_columns, None, &mut placeholders)
    )
}

/// Render a `SELECT` filtered by equality on `key_columns`.
///
/// An empty filter selects every row.
pub fn render_select(
    table: &str,
    columns: &[String],
    key_columns: &[String],
    order_by: &[String],
    caps: &DialectCapabilities,
) -> String {
    let mut placeholders = Placeholders::new(caps);
    let mut sql = format!(
        "SELECT {} FROM {}",
        quote_list(columns, caps),
        caps.quote_identifier(table)
    );
    if !key_columns.is_empty() {
        let _ = write!(sql, " WHERE {}", conditions(key_columns, None, &mut placeholders));
    }
    if !order_by.is_empty() {
        let order = order_by
            .iter()
            .map(|c| format!("{} ASC", caps.quote_identifier(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(sql, " ORDER BY {}", order);
    }
    sql
}

/// Render a `SELECT` of `target` rows linked through a junction table.
///
/// `join` pairs junction columns with the target columns they reference;
/// `filter` lists junction columns compared against bind parameters.
pub fn render_select_through(
    target: &EntityMetadata,
    columns: &[String],
    junction_table: &str,
    join: &[(String, String)],
    filter: &[String],
    caps: &DialectCapabilities,
) -> String {
    let mut placeholders = Placeholders::new(caps);
    let selected = columns
        .iter()
        .map(|c| format!("t.{}", caps.quote_identifier(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let on = join
        .iter()
        .map(|(junction_column, target_column)| {
            format!(
                "j.{} = t.{}",
                caps.quote_identifier(junction_column),
                caps.quote_identifier(target_column)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    let order = target
        .primary_column_names()
        .iter()
        .map(|c| format!("t.{} ASC", caps.quote_identifier(c)))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "SELECT {} FROM {} t INNER JOIN {} j ON {} WHERE {}",
        selected,
        caps.quote_identifier(&target.table_name),
        caps.quote_identifier(junction_table),
        on,
        conditions(filter, Some("j"), &mut placeholders)
    );
    if !order.is_empty() {
        let _ = write!(sql, " ORDER BY {}", order);
    }
    sql
}
