use crate::core::scanner::ContentScanner;
use crate::domain::model::{AuditEvent, AuditKind, WrittenFile};
use crate::domain::ports::AuditSink;
use crate::utils::error::{Result, WriteError};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct WritePolicy {
    pub max_file_size: usize,
    /// 空清單代表不限制副檔名
    pub allowed_extensions: Vec<String>,
}

/// 在輸出目錄內做驗證後的原子寫入
pub struct SafeFileWriter {
    root: PathBuf,
    requested_root: PathBuf,
    policy: WritePolicy,
    scanner: ContentScanner,
    audit: Arc<dyn AuditSink>,
}

impl SafeFileWriter {
    /// 建立寫入器；輸出目錄不存在時會先建立
    pub fn new<P: AsRef<Path>>(
        output_dir: P,
        policy: WritePolicy,
        scanner: ContentScanner,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir)?;
        let root = output_dir.canonicalize()?;
        let requested_root = if output_dir.is_absolute() {
            output_dir.to_path_buf()
        } else {
            std::env::current_dir()?.join(output_dir)
        };

        tracing::debug!(
            "Safe writer rooted at {} (max {} bytes, {} content rules)",
            root.display(),
            policy.max_file_size,
            scanner.rule_count()
        );

        Ok(Self {
            root,
            requested_root,
            policy,
            scanner,
            audit,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 驗證並寫入；每次嘗試都會留下一筆稽核紀錄
    pub fn write(&self, filename: &str, content: &str) -> std::result::Result<WrittenFile, WriteError> {
        let result = self
            .validate(filename, content)
            .and_then(|target| self.commit(&target, content));

        let event = match &result {
            Ok(written) => AuditEvent::success(
                AuditKind::FileCreation,
                filename,
                format!(
                    "Created {} ({} bytes) with hash {}",
                    written.path.display(),
                    written.bytes,
                    written.sha256
                ),
            ),
            Err(e) => {
                let kind = match e {
                    WriteError::ForbiddenContent { .. } => AuditKind::ContentScan,
                    WriteError::Io { .. } => AuditKind::WriteFailure,
                    _ => AuditKind::ValidationFail,
                };
                AuditEvent::failure(kind, filename, Some(e.reason()), e.to_string())
            }
        };
        self.audit.record(&event);

        result
    }

    /// 執行全部檢查但不寫入，通過時回傳目標路徑
    pub fn validate(&self, filename: &str, content: &str) -> std::result::Result<PathBuf, WriteError> {
        let target = self.resolve_target(filename)?;

        let size = content.len();
        if size > self.policy.max_file_size {
            return Err(WriteError::SizeExceeded {
                filename: filename.to_string(),
                size,
                limit: self.policy.max_file_size,
            });
        }

        let findings = self.scanner.scan(content);
        if !findings.is_empty() {
            return Err(WriteError::ForbiddenContent {
                filename: filename.to_string(),
                findings,
            });
        }

        Ok(target)
    }

    /// 只檢查檔名：格式、路徑逃逸、副檔名
    pub fn resolve_target(&self, filename: &str) -> std::result::Result<PathBuf, WriteError> {
        let invalid = |reason: &str| WriteError::InvalidFilename {
            filename: filename.to_string(),
            reason: reason.to_string(),
        };
        let traversal = || WriteError::PathTraversal {
            filename: filename.to_string(),
        };

        if filename.trim().is_empty() {
            return Err(invalid("filename is empty"));
        }
        if filename.contains('\0') {
            return Err(invalid("filename contains null bytes"));
        }

        // 模型有時會產生 Windows 風格路徑
        let normalized = filename.replace('\\', "/");
        // `components()` 會吞掉結尾的 `.`，所以 `dir/.` 要在這裡擋下
        let last_segment = normalized.rsplit('/').next().unwrap_or_default();
        if normalized.ends_with('/') || last_segment == "." {
            return Err(invalid("filename names a directory"));
        }

        let raw = Path::new(&normalized);
        if raw.components().any(|c| c == Component::ParentDir) {
            return Err(traversal());
        }

        let relative = if raw.is_absolute() {
            raw.strip_prefix(&self.root)
                .or_else(|_| raw.strip_prefix(&self.requested_root))
                .map_err(|_| traversal())?
        } else {
            raw
        };

        let mut clean = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(traversal())
                }
            }
        }
        if clean.as_os_str().is_empty() {
            return Err(invalid("filename resolves to the output directory itself"));
        }

        let target = self.root.join(&clean);
        if !self.is_inside_root(&target) {
            return Err(traversal());
        }
        self.check_extension(filename, &clean)?;

        Ok(target)
    }

    /// 以最近一個已存在的上層目錄做 canonicalize，避免經由符號連結逃出
    fn is_inside_root(&self, target: &Path) -> bool {
        target
            .ancestors()
            .skip(1)
            .find(|ancestor| ancestor.exists())
            .and_then(|ancestor| ancestor.canonicalize().ok())
            .is_some_and(|resolved| resolved.starts_with(&self.root))
    }

    fn check_extension(&self, filename: &str, path: &Path) -> std::result::Result<(), WriteError> {
        if self.policy.allowed_extensions.is_empty() {
            return Ok(());
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        let allowed = self
            .policy
            .allowed_extensions
            .iter()
            .any(|a| a.eq_ignore_ascii_case(extension));

        if allowed {
            Ok(())
        } else {
            Err(WriteError::DisallowedExtension {
                filename: filename.to_string(),
                extension: extension.to_string(),
            })
        }
    }

    /// 寫入同目錄暫存檔後 rename 取代目標
    fn commit(&self, target: &Path, content: &str) -> std::result::Result<WrittenFile, WriteError> {
        let io_err = |source: std::io::Error| WriteError::Io {
            path: target.to_path_buf(),
            source,
        };

        let parent = target.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(parent).map_err(io_err)?;

        let mut temp = tempfile::Builder::new()
            .prefix(".safe-codegen-")
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(io_err)?;
        temp.write_all(content.as_bytes()).map_err(io_err)?;
        temp.as_file().sync_all().map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o644))
                .map_err(io_err)?;
        }

        // persist 失敗時暫存檔隨 PersistError 一併刪除
        temp.persist(target).map_err(|e| io_err(e.error))?;

        let sha256 = hex::encode(Sha256::digest(content.as_bytes()));
        tracing::debug!("💾 Wrote {} ({} bytes)", target.display(), content.len());

        Ok(WrittenFile {
            path: target.to_path_buf(),
            bytes: content.len(),
            sha256,
        })
    }
}

impl std::fmt::Debug for SafeFileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeFileWriter")
            .field("root", &self.root)
            .field("policy", &self.policy)
            .field("scanner", &self.scanner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::task_config::default_forbidden_patterns;
    use crate::utils::audit::MemoryAuditSink;
    use crate::utils::error::FailureReason;
    use tempfile::TempDir;

    fn policy() -> WritePolicy {
        WritePolicy {
            max_file_size: 64,
            allowed_extensions: vec!["py".to_string(), "js".to_string(), "ts".to_string(), "txt".to_string()],
        }
    }

    fn writer_in(dir: &Path) -> (SafeFileWriter, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        let scanner = ContentScanner::from_patterns(&default_forbidden_patterns()).unwrap();
        let writer = SafeFileWriter::new(dir, policy(), scanner, audit.clone()).unwrap();
        (writer, audit)
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_write_creates_file_with_exact_content() {
        let temp_dir = TempDir::new().unwrap();
        let (writer, audit) = writer_in(temp_dir.path());

        let written = writer.write("add.py", "def add(a,b): return a+b").unwrap();

        let on_disk = fs::read_to_string(temp_dir.path().join("add.py")).unwrap();
        assert_eq!(on_disk, "def add(a,b): return a+b");
        assert_eq!(written.bytes, 24);
        assert_eq!(written.sha256.len(), 64);
        assert_eq!(dir_entries(temp_dir.path()), vec!["add.py"]);

        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AuditKind::FileCreation);
        assert!(events[0].details.contains(&written.sha256));
    }

    #[test]
    fn test_nested_filename_creates_subdirectories() {
        let temp_dir = TempDir::new().unwrap();
        let (writer, _) = writer_in(temp_dir.path());

        writer.write("./pkg/util/strings.py", "x = 1").unwrap();
        assert!(temp_dir.path().join("pkg/util/strings.py").is_file());
    }

    #[test]
    fn test_parent_segments_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("output");
        let (writer, audit) = writer_in(&output);

        for name in ["../../etc/passwd", "../escape.py", "pkg/../../x.py", "..\\..\\win.py"] {
            let err = writer.write(name, "x = 1").unwrap_err();
            assert_eq!(err.reason(), FailureReason::PathTraversal, "{}", name);
        }

        assert!(dir_entries(&output).is_empty());
        assert_eq!(dir_entries(temp_dir.path()), vec!["output"]);
        assert_eq!(audit.len(), 4);
        assert!(audit.events().iter().all(|e| e.kind == AuditKind::ValidationFail));
    }

    #[test]
    fn test_absolute_paths() {
        let temp_dir = TempDir::new().unwrap();
        let (writer, _) = writer_in(temp_dir.path());

        let err = writer.write("/etc/evil.py", "x = 1").unwrap_err();
        assert_eq!(err.reason(), FailureReason::PathTraversal);

        let inside = writer.root().join("inside.py");
        let written = writer.write(inside.to_str().unwrap(), "x = 1").unwrap();
        assert_eq!(written.path, inside);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let (writer, _) = writer_in(temp_dir.path());
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("link")).unwrap();

        let err = writer.write("link/evil.py", "x = 1").unwrap_err();
        assert_eq!(err.reason(), FailureReason::PathTraversal);
        assert!(dir_entries(outside.path()).is_empty());
    }

    #[test]
    fn test_malformed_filenames() {
        let temp_dir = TempDir::new().unwrap();
        let (writer, _) = writer_in(temp_dir.path());

        for name in ["", "   ", "dir/", ".", "./", "bad\0name.py"] {
            let err = writer.write(name, "x = 1").unwrap_err();
            assert_eq!(err.reason(), FailureReason::InvalidFilename, "{:?}", name);
        }
    }

    #[test]
    fn test_trailing_current_dir_is_a_directory_name() {
        let temp_dir = TempDir::new().unwrap();
        let audit = Arc::new(MemoryAuditSink::new());
        let open_policy = WritePolicy {
            max_file_size: 64,
            allowed_extensions: Vec::new(),
        };
        let writer =
            SafeFileWriter::new(temp_dir.path(), open_policy, ContentScanner::new(), audit).unwrap();

        for name in ["dir/.", "dir\\.", "a/b/."] {
            let err = writer.write(name, "x").unwrap_err();
            assert_eq!(err.reason(), FailureReason::InvalidFilename, "{:?}", name);
        }
        assert!(dir_entries(temp_dir.path()).is_empty());
        assert!(writer.write("dir/.hidden", "x").is_ok());
    }

    #[test]
    fn test_extension_allowlist() {
        let temp_dir = TempDir::new().unwrap();
        let (writer, _) = writer_in(temp_dir.path());

        assert_eq!(
            writer.write("run.sh", "echo hi").unwrap_err().reason(),
            FailureReason::DisallowedExtension
        );
        assert_eq!(
            writer.write("Makefile", "all:").unwrap_err().reason(),
            FailureReason::DisallowedExtension
        );
        assert!(writer.write("NOTES.TXT", "hello").is_ok());
    }

    #[test]
    fn test_size_limit_is_in_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let (writer, audit) = writer_in(temp_dir.path());

        assert!(writer.write("exact.txt", &"a".repeat(64)).is_ok());

        let err = writer.write("big.txt", &"a".repeat(65)).unwrap_err();
        assert!(matches!(err, WriteError::SizeExceeded { size: 65, limit: 64, .. }));

        // 22 個字元但超過 64 位元組
        let err = writer.write("wide.txt", &"測試".repeat(11)).unwrap_err();
        assert_eq!(err.reason(), FailureReason::SizeExceeded);

        assert!(!temp_dir.path().join("big.txt").exists());
        assert!(!temp_dir.path().join("wide.txt").exists());
        assert_eq!(audit.events()[1].reason, Some(FailureReason::SizeExceeded));
    }

    #[test]
    fn test_forbidden_content_is_not_written() {
        let temp_dir = TempDir::new().unwrap();
        let (writer, audit) = writer_in(temp_dir.path());

        let err = writer.write("danger.py", "eval(input())").unwrap_err();
        match err {
            WriteError::ForbiddenContent { findings, .. } => {
                assert_eq!(findings.len(), 1);
                assert!(findings[0].contains("Code evaluation"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!temp_dir.path().join("danger.py").exists());
        assert_eq!(audit.events()[0].kind, AuditKind::ContentScan);
    }

    #[test]
    fn test_rejected_write_leaves_existing_file_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let (writer, _) = writer_in(temp_dir.path());

        writer.write("keep.py", "original = True").unwrap();
        assert!(writer.write("keep.py", &"x".repeat(100)).is_err());

        let on_disk = fs::read_to_string(temp_dir.path().join("keep.py")).unwrap();
        assert_eq!(on_disk, "original = True");
    }

    #[test]
    fn test_failed_commit_leaves_no_temporary_files() {
        let temp_dir = TempDir::new().unwrap();
        let (writer, audit) = writer_in(temp_dir.path());
        fs::create_dir(temp_dir.path().join("taken.py")).unwrap();
        fs::write(temp_dir.path().join("taken.py").join("child.txt"), "x").unwrap();

        let err = writer.write("taken.py", "x = 1").unwrap_err();
        assert_eq!(err.reason(), FailureReason::IoFailure);
        assert!(!err.is_validation());
        assert_eq!(dir_entries(temp_dir.path()), vec!["taken.py"]);
        assert_eq!(audit.events()[0].kind, AuditKind::WriteFailure);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_commit_keeps_existing_target() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let (writer, audit) = writer_in(temp_dir.path());
        writer.write("locked/keep.py", "old = 1").unwrap();

        let locked = temp_dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
        // root 不受目錄權限限制，此時無法製造寫入失敗
        if fs::write(locked.join("access-check"), "").is_ok() {
            fs::remove_file(locked.join("access-check")).unwrap();
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let err = writer.write("locked/keep.py", "new = 2").unwrap_err();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(err.reason(), FailureReason::IoFailure);
        assert_eq!(fs::read_to_string(locked.join("keep.py")).unwrap(), "old = 1");
        assert_eq!(dir_entries(&locked), vec!["keep.py"]);
        assert_eq!(audit.events()[1].kind, AuditKind::WriteFailure);
    }

    #[test]
    fn test_rewriting_same_content_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let (writer, _) = writer_in(temp_dir.path());

        let first = writer.write("same.py", "print('hi')").unwrap();
        let after_first = fs::read(temp_dir.path().join("same.py")).unwrap();
        let second = writer.write("same.py", "print('hi')").unwrap();
        let after_second = fs::read(temp_dir.path().join("same.py")).unwrap();

        assert_eq!(after_first, after_second);
        assert_eq!(first, second);
        assert_eq!(dir_entries(temp_dir.path()), vec!["same.py"]);
    }

    #[test]
    fn test_validate_does_not_write_or_audit() {
        let temp_dir = TempDir::new().unwrap();
        let (writer, audit) = writer_in(temp_dir.path());

        let target = writer.validate("plan.py", "x = 1").unwrap();
        assert_eq!(target, writer.root().join("plan.py"));
        assert!(!target.exists());
        assert!(audit.is_empty());
    }
}
