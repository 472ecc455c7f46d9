//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default limit on how deep a cascade may walk from its root.
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 100;

/// What happens to one-to-many children dropped from a loaded collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanAction {
    /// Set the child's join columns to null.
    #[default]
    Nullify,
    /// Leave the child untouched.
    Ignore,
}

/// Configuration for the persistence engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum cascade depth before a save is rejected.
    pub max_cascade_depth: usize,

    /// Handling of children removed from a one-to-many collection.
    pub orphan_action: OrphanAction,

    /// Let writes whose foreign key is deferred to commit skip ordering
    /// against the row they reference.
    pub relax_deferred_edges: bool,

    /// Emit every statement at `debug` level.
    pub log_statements: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
            orphan_action: OrphanAction::Nullify,
            relax_deferred_edges: true,
            log_statements: true,
        }
    }
}

impl EngineConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum cascade depth.
    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }

    /// Set the orphan action.
    pub fn with_orphan_action(mut self, action: OrphanAction) -> Self {
        self.orphan_action = action;
        self
    }

    /// Always order writes strictly, even when constraints are deferred.
    pub fn strict_ordering(mut self) -> Self {
        self.relax_deferred_edges = false;
        self
    }

    /// Set whether statements are logged.
    pub fn with_statement_logging(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }
}
