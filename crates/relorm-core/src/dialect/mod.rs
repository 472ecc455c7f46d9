//! Dialect capability layer.
//!
//! A static capability table per engine and a single set of rendering
//! functions parameterized by it.

mod capabilities;
mod render;
mod schema;

pub use capabilities::{DialectCapabilities, DialectKind, IdentityStyle, ParamStyle, TypeNames};
pub use render::{
    deferrable_clause, render_add_foreign_key, render_create_table, render_delete,
    render_drop_table, render_foreign_key, render_insert, render_select, render_select_through,
    render_update, DdlFragment, DdlKind,
};
pub use schema::{drop_schema_objects, generate_schema_objects};
