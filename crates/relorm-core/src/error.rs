//! Core error types.

use thiserror::Error;

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or ambiguous relationship declarations.
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// A constraint feature the target dialect cannot express.
    #[error("constraint error: {0}")]
    Constraint(#[from] ConstraintError),

    /// A cascade write plan that cannot be ordered.
    #[error("cascade order error: {0}")]
    CascadeOrder(#[from] CascadeOrderError),

    /// Error reported by the underlying database driver.
    #[error("database error: {0}")]
    Driver(#[from] DriverError),

    /// The object graph handed to the persistence engine is inconsistent
    /// with the metadata.
    #[error("invalid object graph: {0}")]
    InvalidGraph(String),

    /// Transaction lifecycle error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Errors raised while building relationship metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// Two entities share a name.
    #[error("entity '{entity}' is declared more than once")]
    DuplicateEntity {
        /// Entity name.
        entity: String,
    },

    /// Two entities (or an entity and a junction) share a table name.
    #[error("table '{table}' is used by both '{first}' and '{second}'")]
    DuplicateTable {
        /// Table name.
        table: String,
        /// First owner of the table name.
        first: String,
        /// Second owner of the table name.
        second: String,
    },

    /// A property name is used twice on the same entity.
    #[error("property '{property}' is declared more than once on '{entity}'")]
    DuplicateProperty {
        /// Entity name.
        entity: String,
        /// Property name.
        property: String,
    },

    /// A relation points at an entity that was never declared.
    #[error("relation '{entity}.{property}' references undeclared entity '{target}'")]
    UnknownTarget {
        /// Entity declaring the relation.
        entity: String,
        /// Relation property.
        property: String,
        /// Missing target.
        target: String,
    },

    /// Neither side of a relation owns it.
    #[error("{kind} relation '{entity}.{property}' has no owning side")]
    NoOwningSide {
        /// Entity declaring the relation.
        entity: String,
        /// Relation property.
        property: String,
        /// Relation kind.
        kind: String,
    },

    /// Both sides of a relation claim ownership.
    #[error("relation '{entity}.{property}' and its inverse '{inverse}' both claim ownership")]
    AmbiguousOwner {
        /// Entity declaring the relation.
        entity: String,
        /// Relation property.
        property: String,
        /// Inverse property on the target.
        inverse: String,
    },

    /// A relation that needs an inverse relation does not name one, or
    /// names one that does not exist.
    #[error("relation '{entity}.{property}' requires an inverse relation on '{target}'")]
    MissingInverse {
        /// Entity declaring the relation.
        entity: String,
        /// Relation property.
        property: String,
        /// Target entity.
        target: String,
    },

    /// The named inverse relation does not mirror this relation.
    #[error("'{target}.{inverse}' is not a valid inverse of '{entity}.{property}': {reason}")]
    InverseMismatch {
        /// Entity declaring the relation.
        entity: String,
        /// Relation property.
        property: String,
        /// Target entity.
        target: String,
        /// Inverse property.
        inverse: String,
        /// Description of the mismatch.
        reason: String,
    },

    /// An entity referenced by a join column has no primary column.
    #[error("entity '{entity}' has no primary column")]
    MissingPrimaryKey {
        /// Entity name.
        entity: String,
    },
}

/// Errors raised while generating or rendering constraints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    /// The dialect cannot express the requested deferrable mode.
    #[error("{dialect} does not support deferrable mode {mode} (constraint '{constraint}' on '{table}')")]
    UnsupportedDeferrable {
        /// Constraint name.
        constraint: String,
        /// Table carrying the constraint.
        table: String,
        /// Requested mode.
        mode: String,
        /// Dialect name.
        dialect: String,
    },

    /// The dialect cannot express a multi-column foreign key.
    #[error("{dialect} does not support composite foreign keys (constraint '{constraint}' on '{table}')")]
    UnsupportedCompositeForeignKey {
        /// Constraint name.
        constraint: String,
        /// Table carrying the constraint.
        table: String,
        /// Dialect name.
        dialect: String,
    },

    /// The dialect cannot express the requested referential action.
    #[error("{dialect} does not support {clause} {action} (constraint '{constraint}' on '{table}')")]
    UnsupportedReferentialAction {
        /// Constraint name.
        constraint: String,
        /// Table carrying the constraint.
        table: String,
        /// `ON DELETE` or `ON UPDATE`.
        clause: String,
        /// Requested action.
        action: String,
        /// Dialect name.
        dialect: String,
    },

    /// An identifier exceeds the dialect's maximum length.
    #[error("{dialect} identifiers are limited to {max} characters: '{identifier}'")]
    IdentifierTooLong {
        /// Offending identifier.
        identifier: String,
        /// Maximum length.
        max: usize,
        /// Dialect name.
        dialect: String,
    },

    /// A dialect identifier did not match any known engine.
    #[error("unknown dialect '{name}'")]
    UnknownDialect {
        /// The identifier that was given.
        name: String,
    },
}

/// Errors raised while ordering a cascade write plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CascadeOrderError {
    /// The plan contains a cycle that only deferred constraints could resolve.
    #[error("cascade writes between [{}] form a cycle that requires deferred constraints", .entities.join(", "))]
    Cycle {
        /// Entities taking part in the cycle.
        entities: Vec<String>,
    },

    /// The cascade walked deeper than the configured limit.
    #[error("cascade exceeded maximum depth of {max_depth}")]
    MaxDepthExceeded {
        /// Configured limit.
        max_depth: usize,
    },
}

/// Error reported by a database driver, with the underlying cause preserved.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DriverError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl DriverError {
    /// Create a driver error without an underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a driver error wrapping the driver's own error.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result alias for core operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
