pub mod runner;
pub mod scanner;
pub mod writer;

pub use crate::domain::model::{GenerationResult, Task, TaskOutcome, TaskStatus, WrittenFile};
pub use crate::domain::ports::{AssistantClient, AuditSink, ContentRule};
pub use crate::utils::error::Result;
