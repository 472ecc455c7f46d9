//! Constraint generation.
//!
//! Turns relation metadata into physical foreign keys and checks them
//! against what a dialect can express.

mod generator;
mod naming;

pub use generator::ConstraintGenerator;
pub use naming::{foreign_key_name, primary_key_name};
