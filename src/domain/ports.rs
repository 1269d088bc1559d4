use crate::domain::model::AuditEvent;
use crate::utils::error::GenerationError;
use async_trait::async_trait;

/// 外部程式碼生成服務：輸入提示文字，回傳程式碼
#[async_trait]
pub trait AssistantClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError>;
}

/// 稽核紀錄接收端，由呼叫端注入而非全域狀態
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// 內容掃描規則；新增規則不需修改寫入器
pub trait ContentRule: Send + Sync {
    fn name(&self) -> &str;

    /// 命中時回傳描述文字
    fn check(&self, content: &str) -> Option<String>;
}
