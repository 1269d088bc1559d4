pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;

pub use adapters::ChatCompletionsClient;
pub use config::{CodegenConfig, TaskList};
pub use crate::core::{
    runner::{PromptTemplate, RunReport, TaskRunner},
    scanner::{ContentScanner, PatternRule},
    writer::{SafeFileWriter, WritePolicy},
};
pub use domain::model::{Task, TaskOutcome, TaskStatus};
pub use utils::audit::{FileAuditSink, MemoryAuditSink, TracingAuditSink};
pub use utils::error::{CodegenError, FailureReason, GenerationError, Result, WriteError};
