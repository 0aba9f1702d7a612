//! CLI command implementations

pub mod error;
pub mod plan;
pub mod run;

pub use error::CliError;
pub use plan::PlanArgs;
pub use run::{Cli, Commands, DimensionArgs, OutputFormat, RunArgs};
