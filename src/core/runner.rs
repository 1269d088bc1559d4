use crate::config::task_config::DEFAULT_PROMPT_TEMPLATE;
use crate::core::writer::SafeFileWriter;
use crate::domain::model::{AuditEvent, AuditKind, GenerationResult, Task, TaskOutcome, TaskStatus};
use crate::domain::ports::{AssistantClient, AuditSink};
use crate::utils::error::WriteError;
use regex::{Captures, Regex};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// 以 `{description}` 與 `{filename}` 為佔位符的提示模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate(String);

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// 單次掃描替換，代入的文字不會再被當成佔位符
    pub fn render(&self, task: &Task) -> String {
        static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
        let placeholder = PLACEHOLDER
            .get_or_init(|| Regex::new(r"\{(description|filename)\}").expect("placeholder pattern is valid"));

        placeholder
            .replace_all(&self.0, |caps: &Captures| match &caps[1] {
                "description" => task.description.clone(),
                _ => task.filename.clone(),
            })
            .into_owned()
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_TEMPLATE)
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcomes: Vec<TaskOutcome>,
    pub duration: Duration,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    /// 獲取執行摘要
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "total_tasks": self.outcomes.len(),
            "succeeded": self.succeeded(),
            "failed": self.failed(),
            "total_duration_ms": self.duration.as_millis() as u64,
            "outcomes": serde_json::to_value(&self.outcomes).unwrap_or(serde_json::Value::Null),
        })
    }
}

/// 依序執行任務：生成、驗證、寫入。單一任務失敗不影響後續任務
pub struct TaskRunner<A: AssistantClient> {
    client: A,
    writer: SafeFileWriter,
    audit: Arc<dyn AuditSink>,
    prompt: PromptTemplate,
}

impl<A: AssistantClient> TaskRunner<A> {
    pub fn new(client: A, writer: SafeFileWriter, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            client,
            writer,
            audit,
            prompt: PromptTemplate::default(),
        }
    }

    pub fn with_prompt_template(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    pub async fn run(&self, tasks: &[Task]) -> RunReport {
        let started = Instant::now();
        tracing::info!("🚀 Starting code generation for {} tasks", tasks.len());

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            tracing::info!(
                "🛠️ [{}/{}] Generating code for: {}",
                index + 1,
                tasks.len(),
                task.description
            );

            let status = self.run_task(task).await;
            outcomes.push(TaskOutcome {
                index,
                filename: task.filename.clone(),
                status,
            });
        }

        let report = RunReport {
            outcomes,
            duration: started.elapsed(),
        };
        tracing::info!(
            "📊 Run finished: {} succeeded, {} failed in {:?}",
            report.succeeded(),
            report.failed(),
            report.duration
        );
        report
    }

    async fn run_task(&self, task: &Task) -> TaskStatus {
        let prompt = self.prompt.render(task);

        let content = match self.client.generate(&prompt).await {
            Ok(content) => content,
            Err(e) => {
                tracing::error!("❌ Generation failed for {}: {}", task.filename, e);
                self.audit.record(&AuditEvent::failure(
                    AuditKind::GenerationFailure,
                    &task.filename,
                    None,
                    e.to_string(),
                ));
                return TaskStatus::GenerationFailed {
                    transient: e.is_transient(),
                    message: e.to_string(),
                };
            }
        };

        let result = GenerationResult {
            filename: task.filename.clone(),
            content,
        };
        tracing::debug!(
            "📥 Received {} bytes for {}",
            result.content.len(),
            result.filename
        );

        match self.writer.write(&result.filename, &result.content) {
            Ok(written) => TaskStatus::Written {
                path: written.path,
                bytes: written.bytes,
                sha256: written.sha256,
            },
            Err(e @ WriteError::Io { .. }) => TaskStatus::IoFailed {
                detail: e.to_string(),
            },
            Err(e) => TaskStatus::Rejected {
                reason: e.reason(),
                detail: e.to_string(),
            },
        }
    }
}
