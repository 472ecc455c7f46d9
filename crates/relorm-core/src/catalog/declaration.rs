//! Declarative input to the metadata builder.
//!
//! Declarations are plain data: they can be built in code with the builder
//! methods below or deserialized from JSON produced by an external
//! declaration-processing layer.

use serde::{Deserialize, Serialize};

use super::types::{
    CascadeSet, ColumnType, DefaultValue, DeferrableMode, Generation, ReferentialAction,
    RelationKind,
};

/// Declaration of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDecl {
    /// Entity name (unique across declarations).
    pub name: String,
    /// Table name; derived from the entity name when absent.
    #[serde(default)]
    pub table_name: Option<String>,
    /// Ordered column declarations.
    #[serde(default)]
    pub columns: Vec<ColumnDecl>,
    /// Relation declarations.
    #[serde(default)]
    pub relations: Vec<RelationDecl>,
}

/// Declaration of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDecl {
    /// Column name.
    pub name: String,
    /// Column data type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Part of the primary key.
    #[serde(default)]
    pub primary: bool,
    /// Accepts null.
    #[serde(default)]
    pub nullable: bool,
    /// Default value.
    #[serde(default)]
    pub default: Option<DefaultValue>,
    /// Generation strategy.
    #[serde(default)]
    pub generation: Option<Generation>,
}

/// Declaration of one relation property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDecl {
    /// Property name on the declaring entity.
    pub property: String,
    /// Relation kind.
    pub kind: RelationKind,
    /// Name of the target entity.
    pub target: String,
    /// Property on the target that navigates back, if any.
    #[serde(default)]
    pub inverse_side: Option<String>,
    /// Owning side marker for one-to-one (join column) and many-to-many
    /// (join table). Ignored for many-to-one and one-to-many.
    #[serde(default)]
    pub owner: bool,
    /// Deferrable policy for the constraint this side produces.
    #[serde(default)]
    pub deferrable: Option<DeferrableMode>,
    /// Cascaded operations.
    #[serde(default)]
    pub cascade: CascadeSet,
    /// Whether join columns accept null.
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// `ON DELETE` action.
    #[serde(default)]
    pub on_delete: Option<ReferentialAction>,
    /// `ON UPDATE` action.
    #[serde(default)]
    pub on_update: Option<ReferentialAction>,
    /// Explicit junction table name (owning many-to-many only).
    #[serde(default)]
    pub join_table_name: Option<String>,
}

fn default_true() -> bool {
    true
}

impl EntityDecl {
    /// Create a new entity declaration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Set an explicit table name.
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Add a column.
    pub fn with_column(mut self, column: ColumnDecl) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a relation.
    pub fn with_relation(mut self, relation: RelationDecl) -> Self {
        self.relations.push(relation);
        self
    }

    /// The table name this entity maps to.
    pub fn resolved_table_name(&self) -> String {
        self.table_name
            .clone()
            .unwrap_or_else(|| snake_case(&self.name))
    }

    /// Parse a list of declarations from JSON.
    pub fn list_from_json(json: &str) -> Result<Vec<EntityDecl>, crate::Error> {
        serde_json::from_str(json).map_err(|e| crate::Error::Deserialization(e.to_string()))
    }
}

impl ColumnDecl {
    /// Create a required column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary: false,
            nullable: false,
            default: None,
            generation: None,
        }
    }

    /// Create a primary column with an explicitly assigned value.
    pub fn primary(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            primary: true,
            ..Self::new(name, column_type)
        }
    }

    /// Create a generated primary column.
    pub fn generated(name: impl Into<String>, column_type: ColumnType, generation: Generation) -> Self {
        Self {
            primary: true,
            generation: Some(generation),
            ..Self::new(name, column_type)
        }
    }

    /// Mark as nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

impl RelationDecl {
    fn new(property: impl Into<String>, kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            kind,
            target: target.into(),
            inverse_side: None,
            owner: false,
            deferrable: None,
            cascade: CascadeSet::none(),
            nullable: true,
            on_delete: None,
            on_update: None,
            join_table_name: None,
        }
    }

    /// Declare a one-to-one relation.
    pub fn one_to_one(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(property, RelationKind::OneToOne, target)
    }

    /// Declare a one-to-many relation; `inverse_side` names the many-to-one
    /// on the target that owns the join column.
    pub fn one_to_many(
        property: impl Into<String>,
        target: impl Into<String>,
        inverse_side: impl Into<String>,
    ) -> Self {
        Self::new(property, RelationKind::OneToMany, target).inverse(inverse_side)
    }

    /// Declare a many-to-one relation.
    pub fn many_to_one(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(property, RelationKind::ManyToOne, target)
    }

    /// Declare a many-to-many relation.
    pub fn many_to_many(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(property, RelationKind::ManyToMany, target)
    }

    /// Name the inverse property on the target.
    pub fn inverse(mut self, property: impl Into<String>) -> Self {
        self.inverse_side = Some(property.into());
        self
    }

    /// Mark this side as owning.
    pub fn owning(mut self) -> Self {
        self.owner = true;
        self
    }

    /// Set the deferrable policy.
    pub fn deferrable(mut self, mode: DeferrableMode) -> Self {
        self.deferrable = Some(mode);
        self
    }

    /// Set the cascaded operations.
    pub fn cascade(mut self, cascade: CascadeSet) -> Self {
        self.cascade = cascade;
        self
    }

    /// Require join columns to be non-null.
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the `ON DELETE` action.
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Set the `ON UPDATE` action.
    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }

    /// Set an explicit junction table name.
    pub fn join_table(mut self, name: impl Into<String>) -> Self {
        self.join_table_name = Some(name.into());
        self
    }

    /// Whether this declaration owns the relation.
    pub fn is_owning(&self) -> bool {
        match self.kind {
            RelationKind::ManyToOne => true,
            RelationKind::OneToMany => false,
            RelationKind::OneToOne | RelationKind::ManyToMany => self.owner,
        }
    }
}

/// Convert a `CamelCase` entity name to `snake_case`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}
