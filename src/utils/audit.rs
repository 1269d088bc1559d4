use crate::domain::model::AuditEvent;
use crate::domain::ports::AuditSink;
use crate::utils::error::Result;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

fn trace_event(event: &AuditEvent) {
    if event.success {
        tracing::info!(
            kind = event.kind.as_str(),
            filename = %event.filename,
            outcome = event.outcome(),
            "✅ {}",
            event.details
        );
    } else {
        tracing::warn!(
            kind = event.kind.as_str(),
            filename = %event.filename,
            outcome = event.outcome(),
            "⚠️ {}",
            event.details
        );
    }
}

/// 只輸出到 tracing 的稽核接收端
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        trace_event(event);
    }
}

/// 追加寫入稽核檔，同時輸出到 tracing
#[derive(Debug)]
pub struct FileAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileAuditSink {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let existed = path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        if !existed {
            tracing::info!("Created new security audit log file: {}", path.display());
        }
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &AuditEvent) {
        trace_event(event);

        let line = event.to_log_line();
        match self.file.lock() {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", line) {
                    tracing::error!("Failed to append to audit log {}: {}", self.path.display(), e);
                }
            }
            Err(_) => tracing::error!("Audit log lock poisoned: {}", self.path.display()),
        }
    }
}

/// 保留所有事件於記憶體，供測試與嵌入使用
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        trace_event(event);
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::AuditKind;
    use crate::utils::error::FailureReason;
    use tempfile::TempDir;

    #[test]
    fn test_file_sink_appends_lines() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("logs").join("security_audit.log");

        let sink = FileAuditSink::open(&log_path).unwrap();
        sink.record(&AuditEvent::success(
            AuditKind::FileCreation,
            "add.py",
            "Created add.py",
        ));
        sink.record(&AuditEvent::failure(
            AuditKind::ValidationFail,
            "big.py",
            Some(FailureReason::SizeExceeded),
            "Content too large",
        ));
        drop(sink);

        // 重新開啟時必須保留既有內容
        let sink = FileAuditSink::open(&log_path).unwrap();
        sink.record(&AuditEvent::success(AuditKind::FileCreation, "b.py", "ok"));

        let content = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("FILE_CREATION - add.py - SUCCESS"));
        assert!(lines[1].contains("VALIDATION_FAIL - big.py - SIZE_EXCEEDED"));
        assert!(lines[2].contains("b.py"));
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());
        sink.record(&AuditEvent::success(AuditKind::FileCreation, "a.py", ""));
        sink.record(&AuditEvent::success(AuditKind::FileCreation, "b.py", ""));

        let names: Vec<String> = sink.events().into_iter().map(|e| e.filename).collect();
        assert_eq!(names, vec!["a.py", "b.py"]);
    }
}
