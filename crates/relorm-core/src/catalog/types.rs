//! Core type definitions for the catalog.

use rkyv::Archive;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column data types understood by every dialect.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInteger,
    /// Double precision floating point.
    Float,
    /// Boolean.
    Boolean,
    /// Unbounded text.
    Text,
    /// Bounded text.
    Varchar(u32),
    /// Timestamp without time zone.
    Timestamp,
    /// UUID stored in the dialect's native or textual form.
    Uuid,
    /// Binary data.
    Bytes,
}

/// How a column value is generated when absent on insert.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    /// Database-side auto increment / identity.
    Increment,
    /// Client-side random UUID, assigned before the insert is issued.
    Uuid,
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Archive, rkyv::Serialize, rkyv::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
    /// Current timestamp (evaluated by the database at insert time).
    CurrentTimestamp,
    /// Raw SQL expression.
    Expression(String),
}

/// Kind of a navigable relation, seen from the declaring entity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    /// One-to-one (join column on the owning side).
    OneToOne,
    /// One-to-many (never owning; mirrored by a many-to-one).
    OneToMany,
    /// Many-to-one (always owning; carries the join column).
    ManyToOne,
    /// Many-to-many (realized through a junction table).
    ManyToMany,
}

impl RelationKind {
    /// The kind of the relation seen from the other side.
    pub fn mirrored(self) -> Self {
        match self {
            RelationKind::OneToOne => RelationKind::OneToOne,
            RelationKind::OneToMany => RelationKind::ManyToOne,
            RelationKind::ManyToOne => RelationKind::OneToMany,
            RelationKind::ManyToMany => RelationKind::ManyToMany,
        }
    }

    /// Whether the relation holds a list of related objects.
    pub fn is_to_many(self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationKind::OneToOne => "one-to-one",
            RelationKind::OneToMany => "one-to-many",
            RelationKind::ManyToOne => "many-to-one",
            RelationKind::ManyToMany => "many-to-many",
        };
        f.write_str(name)
    }
}

/// Deferral mode of a foreign-key constraint.
///
/// Always carried as `Option<DeferrableMode>`: `None` means no policy was
/// declared, which is not the same as an explicit [`DeferrableMode::NotDeferrable`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum DeferrableMode {
    /// Checked per statement, cannot be deferred.
    #[serde(alias = "NOT DEFERRABLE", alias = "none")]
    NotDeferrable,
    /// Deferrable, checked per statement unless deferred explicitly.
    #[serde(alias = "INITIALLY IMMEDIATE")]
    InitiallyImmediate,
    /// Deferrable, checked at commit.
    #[serde(alias = "INITIALLY DEFERRED")]
    InitiallyDeferred,
}

impl DeferrableMode {
    /// SQL spelling of the mode.
    pub fn as_sql(self) -> &'static str {
        match self {
            DeferrableMode::NotDeferrable => "NOT DEFERRABLE",
            DeferrableMode::InitiallyImmediate => "INITIALLY IMMEDIATE",
            DeferrableMode::InitiallyDeferred => "INITIALLY DEFERRED",
        }
    }
}

impl fmt::Display for DeferrableMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Referential action for `ON DELETE` / `ON UPDATE`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ReferentialAction {
    /// Propagate the change.
    Cascade,
    /// Reject the change.
    Restrict,
    /// Set referencing columns to null.
    SetNull,
    /// Do nothing (checked at statement or commit time).
    NoAction,
}

impl ReferentialAction {
    /// SQL spelling of the action.
    pub fn as_sql(self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::NoAction => "NO ACTION",
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A single cascaded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeOp {
    /// Insert new related objects.
    Insert,
    /// Update existing related objects.
    Update,
    /// Remove related objects together with the owner.
    Remove,
}

/// Set of operations cascaded through a relation.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(from = "CascadeRepr", into = "Vec<CascadeOp>")]
pub struct CascadeSet {
    /// Cascade inserts.
    pub insert: bool,
    /// Cascade updates.
    pub update: bool,
    /// Cascade removals.
    pub remove: bool,
}

/// Accepted JSON spellings: `true`, `false` or a list of operations.
#[derive(Deserialize)]
#[serde(untagged)]
enum CascadeRepr {
    All(bool),
    Ops(Vec<CascadeOp>),
}

impl From<CascadeRepr> for CascadeSet {
    fn from(repr: CascadeRepr) -> Self {
        match repr {
            CascadeRepr::All(true) => CascadeSet::all(),
            CascadeRepr::All(false) => CascadeSet::none(),
            CascadeRepr::Ops(ops) => ops.into_iter().collect(),
        }
    }
}

impl From<CascadeSet> for Vec<CascadeOp> {
    fn from(set: CascadeSet) -> Self {
        let mut ops = Vec::new();
        if set.insert {
            ops.push(CascadeOp::Insert);
        }
        if set.update {
            ops.push(CascadeOp::Update);
        }
        if set.remove {
            ops.push(CascadeOp::Remove);
        }
        ops
    }
}

impl FromIterator<CascadeOp> for CascadeSet {
    fn from_iter<I: IntoIterator<Item = CascadeOp>>(iter: I) -> Self {
        iter.into_iter().fold(CascadeSet::none(), |set, op| set.with(op))
    }
}

impl CascadeSet {
    /// Cascade nothing.
    pub const fn none() -> Self {
        Self {
            insert: false,
            update: false,
            remove: false,
        }
    }

    /// Cascade every operation.
    pub const fn all() -> Self {
        Self {
            insert: true,
            update: true,
            remove: true,
        }
    }

    /// Cascade inserts and updates.
    pub const fn save() -> Self {
        Self {
            insert: true,
            update: true,
            remove: false,
        }
    }

    /// Add an operation.
    pub fn with(mut self, op: CascadeOp) -> Self {
        match op {
            CascadeOp::Insert => self.insert = true,
            CascadeOp::Update => self.update = true,
            CascadeOp::Remove => self.remove = true,
        }
        self
    }

    /// Check whether an operation is cascaded.
    pub fn contains(&self, op: CascadeOp) -> bool {
        match op {
            CascadeOp::Insert => self.insert,
            CascadeOp::Update => self.update,
            CascadeOp::Remove => self.remove,
        }
    }

    /// Check whether nothing is cascaded.
    pub fn is_empty(&self) -> bool {
        !(self.insert || self.update || self.remove)
    }
}

/// Kind of table an entity maps to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    /// Table of a declared entity.
    Regular,
    /// Synthesized many-to-many junction table.
    Junction,
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableType::Regular => f.write_str("regular"),
            TableType::Junction => f.write_str("junction"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirrored_kinds() {
        assert_eq!(RelationKind::OneToMany.mirrored(), RelationKind::ManyToOne);
        assert_eq!(RelationKind::ManyToOne.mirrored(), RelationKind::OneToMany);
        assert_eq!(RelationKind::ManyToMany.mirrored(), RelationKind::ManyToMany);
        assert!(RelationKind::ManyToMany.is_to_many());
        assert!(!RelationKind::OneToOne.is_to_many());
    }

    #[test]
    fn test_deferrable_spellings() {
        let mode: DeferrableMode = serde_json::from_str("\"initially-deferred\"").unwrap();
        assert_eq!(mode, DeferrableMode::InitiallyDeferred);

        let mode: DeferrableMode = serde_json::from_str("\"INITIALLY IMMEDIATE\"").unwrap();
        assert_eq!(mode, DeferrableMode::InitiallyImmediate);

        assert_eq!(DeferrableMode::InitiallyDeferred.to_string(), "INITIALLY DEFERRED");
    }

    #[test]
    fn test_cascade_set_from_json() {
        let all: CascadeSet = serde_json::from_str("true").unwrap();
        assert_eq!(all, CascadeSet::all());

        let none: CascadeSet = serde_json::from_str("false").unwrap();
        assert!(none.is_empty());

        let some: CascadeSet = serde_json::from_str(r#"["insert", "remove"]"#).unwrap();
        assert!(some.contains(CascadeOp::Insert));
        assert!(!some.contains(CascadeOp::Update));
        assert!(some.contains(CascadeOp::Remove));

        let encoded = serde_json::to_string(&some).unwrap();
        assert_eq!(encoded, r#"["insert","remove"]"#);
    }
}
