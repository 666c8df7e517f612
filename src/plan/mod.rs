// ABOUTME: Plan schema, YAML loading, and structural validation
// ABOUTME: Exports the PlanSpec/TaskSpec model and the PlanError type

pub mod error;
pub mod loader;
pub mod spec;

pub use error::{PlanError, Result};
pub use loader::load_plan;
pub use spec::{PlanSpec, TaskSpec};
