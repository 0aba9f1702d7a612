//! Plan command: print the expanded task list without executing it

use clap::Parser;

use super::run::{DimensionArgs, OutputFormat};
use super::CliError;
use crate::batch::{TaskDescriptor, TaskSource};

/// Plan command arguments
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Batch dimensions
    #[command(flatten)]
    pub dimensions: DimensionArgs,
}

impl PlanArgs {
    /// Tasks a run with the same dimensions would execute, in start order
    pub fn tasks(&self) -> Result<Vec<TaskDescriptor<String, String>>, CliError> {
        let (categories, topics) = self.dimensions.dimensions()?;
        Ok(TaskSource::expand_dimensions(&categories, &topics))
    }

    /// Execute the plan command
    pub fn execute(&self, output_format: OutputFormat) -> Result<(), CliError> {
        let tasks = self.tasks()?;
        match output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&tasks)?),
            OutputFormat::Human => {
                println!("{} tasks:", tasks.len());
                for task in &tasks {
                    println!("  {task}");
                }
            }
        }
        Ok(())
    }
}
