#[cfg(feature = "cli")]
pub mod cli;
pub mod task_config;

#[cfg(feature = "cli")]
pub use cli::CliArgs;
pub use task_config::{CodegenConfig, TaskList};
