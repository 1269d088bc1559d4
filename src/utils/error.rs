use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid configuration value for '{field}': {value} ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

pub type Result<T> = std::result::Result<T, CodegenError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Generation,
    Validation,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CodegenError {
    pub fn config(message: impl Into<String>) -> Self {
        CodegenError::ConfigError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            CodegenError::ConfigError { .. }
            | CodegenError::InvalidConfigValueError { .. }
            | CodegenError::MissingConfigError { .. } => ErrorCategory::Configuration,
            CodegenError::Generation(_) | CodegenError::HttpClientError(_) => {
                ErrorCategory::Generation
            }
            CodegenError::Write(WriteError::Io { .. }) | CodegenError::IoError(_) => {
                ErrorCategory::Io
            }
            CodegenError::Write(_) => ErrorCategory::Validation,
        }
    }

    /// 只有配置錯誤會中止整個執行，其餘錯誤都侷限於單一任務
    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Configuration => ErrorSeverity::Critical,
            ErrorCategory::Io => ErrorSeverity::High,
            ErrorCategory::Generation => ErrorSeverity::Medium,
            ErrorCategory::Validation => ErrorSeverity::Low,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            CodegenError::ConfigError { .. } => {
                "Check that the configuration file exists and is valid TOML"
            }
            CodegenError::InvalidConfigValueError { .. } => {
                "Fix the reported field in the configuration file"
            }
            CodegenError::MissingConfigError { .. } => {
                "Add the missing field to the configuration file or set the matching environment variable"
            }
            CodegenError::Generation(e) if e.is_transient() => {
                "The assistant API is temporarily unavailable; run again later"
            }
            CodegenError::Generation(_) | CodegenError::HttpClientError(_) => {
                "Check the API key, model name and base URL"
            }
            CodegenError::Write(WriteError::Io { .. }) | CodegenError::IoError(_) => {
                "Check disk space and permissions of the output directory"
            }
            CodegenError::Write(_) => "Adjust the task filename or the security settings",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Generation => format!("Code generation failed: {}", self),
            ErrorCategory::Validation => format!("Generated file rejected: {}", self),
            ErrorCategory::Io => format!("File system error: {}", self),
        }
    }
}

/// 寫入被拒絕或失敗的原因代碼，用於稽核紀錄與執行摘要
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    InvalidFilename,
    PathTraversal,
    DisallowedExtension,
    SizeExceeded,
    ForbiddenContent,
    IoFailure,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::InvalidFilename => "INVALID_FILENAME",
            FailureReason::PathTraversal => "PATH_TRAVERSAL",
            FailureReason::DisallowedExtension => "DISALLOWED_EXTENSION",
            FailureReason::SizeExceeded => "SIZE_EXCEEDED",
            FailureReason::ForbiddenContent => "FORBIDDEN_CONTENT",
            FailureReason::IoFailure => "IO_FAILURE",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Invalid filename '{filename}': {reason}")]
    InvalidFilename { filename: String, reason: String },

    #[error("Path traversal rejected for '{filename}'")]
    PathTraversal { filename: String },

    #[error("Extension '{extension}' of '{filename}' is not allowed")]
    DisallowedExtension { filename: String, extension: String },

    #[error("Content of '{filename}' is {size} bytes, limit is {limit}")]
    SizeExceeded {
        filename: String,
        size: usize,
        limit: usize,
    },

    #[error("Forbidden content in '{filename}': {}", .findings.join(", "))]
    ForbiddenContent {
        filename: String,
        findings: Vec<String>,
    },

    #[error("Failed to write '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WriteError {
    pub fn reason(&self) -> FailureReason {
        match self {
            WriteError::InvalidFilename { .. } => FailureReason::InvalidFilename,
            WriteError::PathTraversal { .. } => FailureReason::PathTraversal,
            WriteError::DisallowedExtension { .. } => FailureReason::DisallowedExtension,
            WriteError::SizeExceeded { .. } => FailureReason::SizeExceeded,
            WriteError::ForbiddenContent { .. } => FailureReason::ForbiddenContent,
            WriteError::Io { .. } => FailureReason::IoFailure,
        }
    }

    /// 驗證類錯誤（未觸碰檔案系統即被拒絕）
    pub fn is_validation(&self) -> bool {
        !matches!(self, WriteError::Io { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    /// Connection refused, DNS failure, timeout
    Network,
    RateLimited,
    ServerError,
    /// Bad request, auth failures, unknown model
    ClientError,
    ParseError,
    /// The reply carried no fenced code block
    NoCode,
}

impl GenerationErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationErrorKind::Network
                | GenerationErrorKind::RateLimited
                | GenerationErrorKind::ServerError
        )
    }
}

#[derive(Error, Debug, Clone)]
#[error("{kind:?} error{}: {message}", .status_code.map(|c| format!(" (HTTP {})", c)).unwrap_or_default())]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub status_code: Option<u16>,
    pub message: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status_code: None,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::Network, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::ParseError, message)
    }

    pub fn no_code(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::NoCode, message)
    }

    pub fn from_status(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            kind: classify_http_status(status_code),
            status_code: Some(status_code),
            message: body.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

pub fn classify_http_status(status: u16) -> GenerationErrorKind {
    match status {
        429 => GenerationErrorKind::RateLimited,
        500..=599 => GenerationErrorKind::ServerError,
        _ => GenerationErrorKind::ClientError,
    }
}
