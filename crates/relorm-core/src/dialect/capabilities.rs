//! Per-engine capability table.
//!
//! Every dialect is described by one [`DialectCapabilities`] value. Rendering
//! and validation read these fields instead of branching on the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::{ColumnType, DeferrableMode};
use crate::error::ConstraintError;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// PostgreSQL.
    Postgres,
    /// SQLite (any driver).
    Sqlite,
    /// SAP HANA.
    Sap,
    /// MySQL / MariaDB.
    MySql,
    /// Microsoft SQL Server.
    MsSql,
    /// Oracle.
    Oracle,
    /// CockroachDB.
    CockroachDb,
}

/// How auto-increment primary keys are declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStyle {
    /// `GENERATED BY DEFAULT AS IDENTITY`.
    GeneratedAsIdentity,
    /// `AUTO_INCREMENT`.
    AutoIncrement,
    /// `IDENTITY(1,1)`.
    Identity,
    /// `PRIMARY KEY AUTOINCREMENT` inline on a single integer key.
    InlineAutoincrement,
}

/// Bind parameter placeholder syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `$1`, `$2`, ...
    Dollar,
    /// `?`
    Question,
    /// `@p1`, `@p2`, ...
    AtP,
    /// `:1`, `:2`, ...
    Colon,
}

/// Native type names for the abstract column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeNames {
    /// 32-bit integer.
    pub integer: &'static str,
    /// 64-bit integer.
    pub big_integer: &'static str,
    /// Double precision float.
    pub float: &'static str,
    /// Boolean.
    pub boolean: &'static str,
    /// Unbounded text.
    pub text: &'static str,
    /// Bounded text, rendered as `name(n)`.
    pub varchar: &'static str,
    /// Timestamp.
    pub timestamp: &'static str,
    /// UUID.
    pub uuid: &'static str,
    /// Binary data.
    pub bytes: &'static str,
    /// Literal for boolean true in defaults.
    pub true_literal: &'static str,
    /// Literal for boolean false in defaults.
    pub false_literal: &'static str,
}

/// What one engine can express.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialectCapabilities {
    /// Engine.
    pub kind: DialectKind,
    /// Human-readable engine name used in errors.
    pub name: &'static str,
    /// Accepts deferrable foreign keys at all.
    pub supports_deferred_constraints: bool,
    /// Deferrable modes the engine can render.
    pub supported_deferred_modes: &'static [DeferrableMode],
    /// Whether `INITIALLY ...` needs a leading `DEFERRABLE` keyword.
    pub deferrable_keyword: bool,
    /// Accepts multi-column foreign keys.
    pub supports_composite_foreign_keys: bool,
    /// Accepts `ON UPDATE` on foreign keys.
    pub supports_on_update: bool,
    /// Accepts `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY`.
    pub supports_alter_add_foreign_key: bool,
    /// Accepts `INSERT ... RETURNING`.
    pub supports_returning: bool,
    /// Accepts `DROP TABLE IF EXISTS`.
    pub supports_drop_if_exists: bool,
    /// Accepts `INSERT INTO t DEFAULT VALUES`.
    pub supports_default_values: bool,
    /// Auto-increment declaration style.
    pub identity_style: IdentityStyle,
    /// Placeholder style.
    pub param_style: ParamStyle,
    /// Opening and closing identifier quote.
    pub quote: (char, char),
    /// Maximum identifier length, if limited.
    pub max_identifier_length: Option<usize>,
    /// Native type names.
    pub types: TypeNames,
}

const ALL_MODES: &[DeferrableMode] = &[
    DeferrableMode::NotDeferrable,
    DeferrableMode::InitiallyImmediate,
    DeferrableMode::InitiallyDeferred,
];

const INITIALLY_MODES: &[DeferrableMode] = &[
    DeferrableMode::InitiallyImmediate,
    DeferrableMode::InitiallyDeferred,
];

static POSTGRES: DialectCapabilities = DialectCapabilities {
    kind: DialectKind::Postgres,
    name: "postgres",
    supports_deferred_constraints: true,
    supported_deferred_modes: ALL_MODES,
    deferrable_keyword: true,
    supports_composite_foreign_keys: true,
    supports_on_update: true,
    supports_alter_add_foreign_key: true,
    supports_returning: true,
    supports_drop_if_exists: true,
    supports_default_values: true,
    identity_style: IdentityStyle::GeneratedAsIdentity,
    param_style: ParamStyle::Dollar,
    quote: ('"', '"'),
    max_identifier_length: Some(63),
    types: TypeNames {
        integer: "integer",
        big_integer: "bigint",
        float: "double precision",
        boolean: "boolean",
        text: "text",
        varchar: "character varying",
        timestamp: "timestamp",
        uuid: "uuid",
        bytes: "bytea",
        true_literal: "true",
        false_literal: "false",
    },
};

static SQLITE: DialectCapabilities = DialectCapabilities {
    kind: DialectKind::Sqlite,
    name: "sqlite",
    supports_deferred_constraints: true,
    supported_deferred_modes: ALL_MODES,
    deferrable_keyword: true,
    supports_composite_foreign_keys: true,
    supports_on_update: true,
    supports_alter_add_foreign_key: false,
    supports_returning: true,
    supports_drop_if_exists: true,
    supports_default_values: true,
    identity_style: IdentityStyle::InlineAutoincrement,
    param_style: ParamStyle::Question,
    quote: ('"', '"'),
    max_identifier_length: None,
    types: TypeNames {
        integer: "integer",
        big_integer: "bigint",
        float: "real",
        boolean: "boolean",
        text: "text",
        varchar: "varchar",
        timestamp: "datetime",
        uuid: "varchar(36)",
        bytes: "blob",
        true_literal: "1",
        false_literal: "0",
    },
};

static SAP: DialectCapabilities = DialectCapabilities {
    kind: DialectKind::Sap,
    name: "sap",
    supports_deferred_constraints: true,
    supported_deferred_modes: INITIALLY_MODES,
    deferrable_keyword: false,
    supports_composite_foreign_keys: true,
    supports_on_update: true,
    supports_alter_add_foreign_key: true,
    supports_returning: false,
    supports_drop_if_exists: false,
    supports_default_values: false,
    identity_style: IdentityStyle::GeneratedAsIdentity,
    param_style: ParamStyle::Question,
    quote: ('"', '"'),
    max_identifier_length: Some(127),
    types: TypeNames {
        integer: "integer",
        big_integer: "bigint",
        float: "double",
        boolean: "boolean",
        text: "nclob",
        varchar: "nvarchar",
        timestamp: "timestamp",
        uuid: "nvarchar(36)",
        bytes: "blob",
        true_literal: "true",
        false_literal: "false",
    },
};

static MYSQL: DialectCapabilities = DialectCapabilities {
    kind: DialectKind::MySql,
    name: "mysql",
    supports_deferred_constraints: false,
    supported_deferred_modes: &[],
    deferrable_keyword: false,
    supports_composite_foreign_keys: true,
    supports_on_update: true,
    supports_alter_add_foreign_key: true,
    supports_returning: false,
    supports_drop_if_exists: true,
    supports_default_values: false,
    identity_style: IdentityStyle::AutoIncrement,
    param_style: ParamStyle::Question,
    quote: ('`', '`'),
    max_identifier_length: Some(64),
    types: TypeNames {
        integer: "int",
        big_integer: "bigint",
        float: "double",
        boolean: "tinyint(1)",
        text: "text",
        varchar: "varchar",
        timestamp: "datetime(6)",
        uuid: "varchar(36)",
        bytes: "blob",
        true_literal: "1",
        false_literal: "0",
    },
};

static MSSQL: DialectCapabilities = DialectCapabilities {
    kind: DialectKind::MsSql,
    name: "mssql",
    supports_deferred_constraints: false,
    supported_deferred_modes: &[],
    deferrable_keyword: false,
    supports_composite_foreign_keys: true,
    supports_on_update: true,
    supports_alter_add_foreign_key: true,
    supports_returning: false,
    supports_drop_if_exists: true,
    supports_default_values: true,
    identity_style: IdentityStyle::Identity,
    param_style: ParamStyle::AtP,
    quote: ('[', ']'),
    max_identifier_length: Some(128),
    types: TypeNames {
        integer: "int",
        big_integer: "bigint",
        float: "float",
        boolean: "bit",
        text: "nvarchar(max)",
        varchar: "nvarchar",
        timestamp: "datetime2",
        uuid: "uniqueidentifier",
        bytes: "varbinary(max)",
        true_literal: "1",
        false_literal: "0",
    },
};

static ORACLE: DialectCapabilities = DialectCapabilities {
    kind: DialectKind::Oracle,
    name: "oracle",
    supports_deferred_constraints: true,
    supported_deferred_modes: ALL_MODES,
    deferrable_keyword: true,
    supports_composite_foreign_keys: true,
    supports_on_update: false,
    supports_alter_add_foreign_key: true,
    supports_returning: false,
    supports_drop_if_exists: false,
    supports_default_values: false,
    identity_style: IdentityStyle::GeneratedAsIdentity,
    param_style: ParamStyle::Colon,
    quote: ('"', '"'),
    max_identifier_length: Some(30),
    types: TypeNames {
        integer: "number(10)",
        big_integer: "number(19)",
        float: "binary_double",
        boolean: "number(1)",
        text: "clob",
        varchar: "varchar2",
        timestamp: "timestamp",
        uuid: "varchar2(36)",
        bytes: "blob",
        true_literal: "1",
        false_literal: "0",
    },
};

static COCKROACHDB: DialectCapabilities = DialectCapabilities {
    kind: DialectKind::CockroachDb,
    name: "cockroachdb",
    supports_deferred_constraints: false,
    supported_deferred_modes: &[],
    deferrable_keyword: false,
    supports_composite_foreign_keys: true,
    supports_on_update: true,
    supports_alter_add_foreign_key: true,
    supports_returning: true,
    supports_drop_if_exists: true,
    supports_default_values: true,
    identity_style: IdentityStyle::GeneratedAsIdentity,
    param_style: ParamStyle::Dollar,
    quote: ('"', '"'),
    max_identifier_length: Some(63),
    types: TypeNames {
        integer: "int4",
        big_integer: "int8",
        float: "float8",
        boolean: "bool",
        text: "string",
        varchar: "varchar",
        timestamp: "timestamp",
        uuid: "uuid",
        bytes: "bytes",
        true_literal: "true",
        false_literal: "false",
    },
};

impl DialectKind {
    /// All supported dialects.
    pub const ALL: [DialectKind; 7] = [
        DialectKind::Postgres,
        DialectKind::Sqlite,
        DialectKind::Sap,
        DialectKind::MySql,
        DialectKind::MsSql,
        DialectKind::Oracle,
        DialectKind::CockroachDb,
    ];

    /// The capability profile of this dialect.
    pub fn capabilities(self) -> &'static DialectCapabilities {
        match self {
            DialectKind::Postgres => &POSTGRES,
            DialectKind::Sqlite => &SQLITE,
            DialectKind::Sap => &SAP,
            DialectKind::MySql => &MYSQL,
            DialectKind::MsSql => &MSSQL,
            DialectKind::Oracle => &ORACLE,
            DialectKind::CockroachDb => &COCKROACHDB,
        }
    }

    /// Canonical identifier.
    pub fn name(self) -> &'static str {
        self.capabilities().name
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DialectKind {
    type Err = ConstraintError;

    /// Accepts canonical names and common driver identifiers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "aurora-postgres" => Ok(DialectKind::Postgres),
            "sqlite" | "better-sqlite3" | "sqljs" | "capacitor" | "cordova" | "expo"
            | "react-native" | "nativescript" => Ok(DialectKind::Sqlite),
            "sap" | "hana" => Ok(DialectKind::Sap),
            "mysql" | "mariadb" | "aurora-mysql" => Ok(DialectKind::MySql),
            "mssql" | "sqlserver" => Ok(DialectKind::MsSql),
            "oracle" => Ok(DialectKind::Oracle),
            "cockroachdb" | "cockroach" => Ok(DialectKind::CockroachDb),
            _ => Err(ConstraintError::UnknownDialect { name: s.to_string() }),
        }
    }
}

impl DialectCapabilities {
    /// Whether `mode` can be rendered on this engine.
    pub fn supports_deferrable(&self, mode: DeferrableMode) -> bool {
        self.supports_deferred_constraints && self.supported_deferred_modes.contains(&mode)
    }

    /// Whether writes may rely on commit-time validation of a key declared
    /// with `mode`.
    pub fn defers_validation(&self, mode: Option<DeferrableMode>) -> bool {
        mode == Some(DeferrableMode::InitiallyDeferred)
            && self.supports_deferrable(DeferrableMode::InitiallyDeferred)
    }

    /// Quote an identifier.
    pub fn quote_identifier(&self, identifier: &str) -> String {
        let (open, close) = self.quote;
        let mut quoted = String::with_capacity(identifier.len() + 2);
        quoted.push(open);
        for ch in identifier.chars() {
            if ch == close {
                quoted.push(close);
            }
            quoted.push(ch);
        }
        quoted.push(close);
        quoted
    }

    /// Placeholder for the `index`-th (1-based) bind parameter.
    pub fn placeholder(&self, index: usize) -> String {
        match self.param_style {
            ParamStyle::Dollar => format!("${}", index),
            ParamStyle::Question => "?".to_string(),
            ParamStyle::AtP => format!("@p{}", index),
            ParamStyle::Colon => format!(":{}", index),
        }
    }

    /// Native type name for a column type.
    pub fn type_name(&self, column_type: ColumnType) -> String {
        let t = &self.types;
        match column_type {
            ColumnType::Integer => t.integer.to_string(),
            ColumnType::BigInteger => t.big_integer.to_string(),
            ColumnType::Float => t.float.to_string(),
            ColumnType::Boolean => t.boolean.to_string(),
            ColumnType::Text => t.text.to_string(),
            ColumnType::Varchar(len) => format!("{}({})", t.varchar, len),
            ColumnType::Timestamp => t.timestamp.to_string(),
            ColumnType::Uuid => t.uuid.to_string(),
            ColumnType::Bytes => t.bytes.to_string(),
        }
    }

    /// Cut a generated constraint name to the engine's identifier limit.
    pub fn constraint_name<'a>(&self, name: &'a str) -> &'a str {
        match self.max_identifier_length {
            Some(max) => name.char_indices().nth(max).map_or(name, |(end, _)| &name[..end]),
            None => name,
        }
    }

    /// Check an identifier against the engine's length limit.
    pub fn check_identifier(&self, identifier: &str) -> Result<(), ConstraintError> {
        match self.max_identifier_length {
            Some(max) if identifier.chars().count() > max => {
                Err(ConstraintError::IdentifierTooLong {
                    identifier: identifier.to_string(),
                    max,
                    dialect: self.name.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_names_fit_identifier_limit() {
        let long = format!("FK_{}", "a".repeat(60));
        assert_eq!(DialectKind::Oracle.capabilities().constraint_name(&long).len(), 30);
        assert_eq!(DialectKind::Postgres.capabilities().constraint_name(&long).len(), 63);
        assert_eq!(DialectKind::Sqlite.capabilities().constraint_name(&long), long);
        assert_eq!(DialectKind::Oracle.capabilities().constraint_name("FK_short"), "FK_short");
    }

    #[test]
    fn test_parse_driver_identifiers() {
        assert_eq!("better-sqlite3".parse::<DialectKind>().unwrap(), DialectKind::Sqlite);
        assert_eq!("postgres".parse::<DialectKind>().unwrap(), DialectKind::Postgres);
        assert_eq!("SAP".parse::<DialectKind>().unwrap(), DialectKind::Sap);
        assert!(matches!(
            "db2".parse::<DialectKind>(),
            Err(ConstraintError::UnknownDialect { .. })
        ));
    }

    #[test]
    fn test_profiles_match_kind() {
        for kind in DialectKind::ALL {
            let caps = kind.capabilities();
            assert_eq!(caps.kind, kind);
            assert_eq!(kind.name().parse::<DialectKind>().unwrap(), kind);
            if !caps.supports_deferred_constraints {
                assert!(caps.supported_deferred_modes.is_empty());
            }
        }
    }

    #[test]
    fn test_deferral_support() {
        let sqlite = DialectKind::Sqlite.capabilities();
        assert!(sqlite.supports_deferrable(DeferrableMode::InitiallyDeferred));
        assert!(sqlite.defers_validation(Some(DeferrableMode::InitiallyDeferred)));
        assert!(!sqlite.defers_validation(Some(DeferrableMode::InitiallyImmediate)));
        assert!(!sqlite.defers_validation(None));

        let sap = DialectKind::Sap.capabilities();
        assert!(!sap.supports_deferrable(DeferrableMode::NotDeferrable));

        let mysql = DialectKind::MySql.capabilities();
        assert!(!mysql.supports_deferrable(DeferrableMode::InitiallyDeferred));
        assert!(!mysql.defers_validation(Some(DeferrableMode::InitiallyDeferred)));
    }

    #[test]
    fn test_quoting_and_placeholders() {
        let pg = DialectKind::Postgres.capabilities();
        assert_eq!(pg.quote_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(pg.placeholder(2), "$2");

        let mssql = DialectKind::MsSql.capabilities();
        assert_eq!(mssql.quote_identifier("order"), "[order]");
        assert_eq!(mssql.placeholder(1), "@p1");

        let oracle = DialectKind::Oracle.capabilities();
        assert!(oracle.check_identifier("a_very_long_junction_table_name_x").is_err());
        assert!(oracle.check_identifier("post_category").is_ok());
        assert_eq!(oracle.type_name(ColumnType::Varchar(40)), "varchar2(40)");
    }
}
