use crate::core::scanner::ContentScanner;
use crate::core::writer::WritePolicy;
use crate::domain::model::Task;
use crate::utils::error::{CodegenError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_PROMPT_TEMPLATE: &str = "Write Python code that does the following: {description}\nMake sure the code is secure and well-documented.";

pub const DEFAULT_INSTRUCTIONS: &str = "You are a specialized coding assistant that can write and explain code. \
When writing code, place it in fenced code blocks (```). \
Always explain your code thoroughly and consider security implications.";

const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct CodegenConfig {
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// 原始任務條目；格式錯誤的條目在 `tasks()` 中被略過
    #[serde(default, rename = "tasks")]
    raw_tasks: Option<Vec<toml::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub instructions: String,
    pub prompt_template: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4-0125-preview".to_string(),
            api_key: None,
            timeout_seconds: 120,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl AssistantConfig {
    /// 設定檔中的 key 優先，其次為 OPENAI_API_KEY 環境變數
    pub fn resolve_api_key(&self) -> Result<String> {
        let from_config = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && !key.contains("${"));

        if let Some(key) = from_config {
            return Ok(key.to_string());
        }

        let from_env = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty());
        validation::validate_required_field(
            &format!("assistant.api_key (or {})", API_KEY_ENV),
            &from_env,
        )
        .cloned()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "./output".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub max_file_size: usize,
    pub allowed_extensions: Vec<String>,
    /// 空字串代表不寫稽核檔，只輸出 tracing
    pub audit_log: String,
    pub forbidden_patterns: Vec<PatternConfig>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            allowed_extensions: ["py", "js", "ts", "txt"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            audit_log: "security_audit.log".to_string(),
            forbidden_patterns: default_forbidden_patterns(),
        }
    }
}

impl SecurityConfig {
    pub fn audit_log_path(&self) -> Option<&str> {
        let path = self.audit_log.trim();
        if path.is_empty() {
            None
        } else {
            Some(path)
        }
    }

    pub fn write_policy(&self) -> WritePolicy {
        WritePolicy {
            max_file_size: self.max_file_size,
            allowed_extensions: self.allowed_extensions.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub pattern: String,
    pub description: String,
}

pub fn default_forbidden_patterns() -> Vec<PatternConfig> {
    [
        (r"os\.system\(", "Direct system command execution"),
        (r"subprocess\.", "Subprocess execution"),
        (r"eval\(", "Code evaluation"),
        (r"exec\(", "Code execution"),
        (r"__import__\(", "Dynamic imports"),
        (r"open\(.*,.*w.*\)", "File write operations"),
        (r"requests\.", "Network requests"),
        (r"socket\.", "Socket operations"),
    ]
    .iter()
    .map(|(pattern, description)| PatternConfig {
        pattern: pattern.to_string(),
        description: description.to_string(),
    })
    .collect()
}

/// 因格式錯誤而被略過的任務條目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTask {
    /// 在設定檔中的位置（從 1 開始）
    pub position: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct TaskList {
    pub tasks: Vec<Task>,
    pub skipped: Vec<SkippedTask>,
}

impl CodegenConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CodegenError::config(format!("Cannot read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content)
            .map_err(|e| CodegenError::config(format!("TOML parsing error: {}", e)))
    }

    /// 替換環境變數 (例如 ${OPENAI_API_KEY})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> String {
        use regex::Regex;
        use std::sync::OnceLock;

        static ENV_VAR: OnceLock<Regex> = OnceLock::new();
        let re = ENV_VAR.get_or_init(|| {
            Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid")
        });

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned()
    }

    /// 解析任務清單；缺少 `[[tasks]]` 為致命錯誤，單筆格式錯誤則略過
    pub fn tasks(&self) -> Result<TaskList> {
        let raw_tasks = self
            .raw_tasks
            .as_ref()
            .ok_or_else(|| CodegenError::config("No [[tasks]] entries found in configuration"))?;

        let mut list = TaskList::default();
        for (i, entry) in raw_tasks.iter().enumerate() {
            let position = i + 1;
            match Self::parse_task(entry) {
                Ok(task) => list.tasks.push(task),
                Err(reason) => {
                    tracing::error!("❌ Skipping task #{}: {}", position, reason);
                    list.skipped.push(SkippedTask { position, reason });
                }
            }
        }

        if list.tasks.is_empty() {
            tracing::warn!("⚠️ Configuration contains no runnable tasks");
        }

        Ok(list)
    }

    fn parse_task(entry: &toml::Value) -> std::result::Result<Task, String> {
        let task: Task = entry
            .clone()
            .try_into()
            .map_err(|e| format!("malformed task entry: {}", e))?;

        if task.description.trim().is_empty() {
            return Err("description is empty".to_string());
        }
        if task.filename.trim().is_empty() {
            return Err("filename is empty".to_string());
        }
        Ok(task)
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("assistant.base_url", &self.assistant.base_url)?;
        validation::validate_non_empty_string("assistant.model", &self.assistant.model)?;
        validation::validate_positive_number(
            "assistant.timeout_seconds",
            self.assistant.timeout_seconds as usize,
            1,
        )?;
        if !self.assistant.prompt_template.contains("{description}") {
            return Err(CodegenError::InvalidConfigValueError {
                field: "assistant.prompt_template".to_string(),
                value: self.assistant.prompt_template.clone(),
                reason: "Template must contain the {description} placeholder".to_string(),
            });
        }

        validation::validate_path("output.directory", &self.output.directory)?;

        validation::validate_positive_number(
            "security.max_file_size",
            self.security.max_file_size,
            1,
        )?;
        validation::validate_extensions(
            "security.allowed_extensions",
            &self.security.allowed_extensions,
        )?;
        ContentScanner::from_patterns(&self.security.forbidden_patterns)?;

        if self.raw_tasks.is_none() {
            return Err(CodegenError::config(
                "No [[tasks]] entries found in configuration",
            ));
        }
        Ok(())
    }
}

impl Validate for CodegenConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
