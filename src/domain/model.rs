use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::error::FailureReason;

/// 一筆程式碼生成任務：自然語言描述與輸出檔名
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub description: String,
    pub filename: String,
}

impl Task {
    pub fn new(description: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            filename: filename.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub filename: String,
    pub content: String,
}

/// 成功寫入後的檔案資訊
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub bytes: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    FileCreation,
    ValidationFail,
    ContentScan,
    WriteFailure,
    GenerationFailure,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::FileCreation => "FILE_CREATION",
            AuditKind::ValidationFail => "VALIDATION_FAIL",
            AuditKind::ContentScan => "CONTENT_SCAN",
            AuditKind::WriteFailure => "WRITE_FAILURE",
            AuditKind::GenerationFailure => "GENERATION_FAILURE",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    pub filename: String,
    pub success: bool,
    pub reason: Option<FailureReason>,
    pub details: String,
}

impl AuditEvent {
    pub fn success(kind: AuditKind, filename: &str, details: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            filename: filename.to_string(),
            success: true,
            reason: None,
            details: details.into(),
        }
    }

    pub fn failure(
        kind: AuditKind,
        filename: &str,
        reason: Option<FailureReason>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            filename: filename.to_string(),
            success: false,
            reason,
            details: details.into(),
        }
    }

    pub fn outcome(&self) -> &'static str {
        match (self.success, self.reason) {
            (true, _) => "SUCCESS",
            (false, Some(reason)) => reason.as_str(),
            (false, None) => "FAILED",
        }
    }

    /// 稽核檔案的單行格式
    pub fn to_log_line(&self) -> String {
        format!(
            "{} - {} - {} - {} - {}",
            self.timestamp.to_rfc3339(),
            self.kind.as_str(),
            self.filename,
            self.outcome(),
            self.details
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Written {
        path: PathBuf,
        bytes: usize,
        sha256: String,
    },
    GenerationFailed {
        transient: bool,
        message: String,
    },
    Rejected {
        reason: FailureReason,
        detail: String,
    },
    IoFailed {
        detail: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub index: usize,
    pub filename: String,
    #[serde(flatten)]
    pub status: TaskStatus,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, TaskStatus::Written { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_log_line_format() {
        let event = AuditEvent::failure(
            AuditKind::ValidationFail,
            "../../etc/passwd",
            Some(FailureReason::PathTraversal),
            "Path traversal rejected",
        );
        let line = event.to_log_line();
        assert!(line.contains(" - VALIDATION_FAIL - ../../etc/passwd - PATH_TRAVERSAL - "));
        assert!(line.ends_with("Path traversal rejected"));
        assert_eq!(event.outcome(), "PATH_TRAVERSAL");

        let ok = AuditEvent::success(AuditKind::FileCreation, "add.py", "hash abc");
        assert_eq!(ok.outcome(), "SUCCESS");
    }

    #[test]
    fn test_task_outcome_serializes_status_inline() {
        let outcome = TaskOutcome {
            index: 0,
            filename: "add.py".to_string(),
            status: TaskStatus::Rejected {
                reason: FailureReason::SizeExceeded,
                detail: "too big".to_string(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["reason"], "SIZE_EXCEEDED");
        assert_eq!(json["filename"], "add.py");
        assert!(!outcome.is_success());
    }
}
