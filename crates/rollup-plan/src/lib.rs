//! Turns introspected columns and a time window into a single parameterised
//! SQL statement: [`classify`] derives the dimension/numeric/nonnumeric
//! sets and filters them against the target schema, [`render`] renders the
//! resulting `INSERT ... SELECT ... ON CONFLICT` text.

pub mod classify;
pub mod render;

pub use classify::{classify_source, project_against_target, ProjectedColumns, SourceClassification};
pub use render::{quote_ident, quote_qualified, render_plan, RollupPlan};
