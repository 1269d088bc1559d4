//! OpenAI-compatible chat-completions client.
//!
//! One request per prompt. Failures are classified as transient or permanent
//! but never retried here.

use crate::adapters::code_block::extract_code_block;
use crate::config::task_config::AssistantConfig;
use crate::domain::ports::AssistantClient;
use crate::utils::error::{GenerationError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 錯誤訊息中保留的回應內容上限
const MAX_ERROR_BODY: usize = 500;

pub struct ChatCompletionsClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    instructions: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        instructions: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
            instructions: instructions.into(),
        })
    }

    /// 依設定建立；API key 缺少時回傳配置錯誤
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        Self::new(
            &config.base_url,
            api_key,
            config.model.clone(),
            config.instructions.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn truncate(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}

#[async_trait]
impl AssistantClient for ChatCompletionsClient {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.instructions,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        tracing::debug!("Sending chat completion request to {} (model {})", self.endpoint, self.model);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::network(format!("Request timeout: {}", e))
                } else if e.is_connect() {
                    GenerationError::network(format!("Connection failed: {}", e))
                } else {
                    GenerationError::network(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::network(format!("Failed to read response body: {}", e)))?;

        tracing::debug!("Assistant API response status: {}", status);

        if !status.is_success() {
            return Err(GenerationError::from_status(
                status.as_u16(),
                Self::truncate(&body),
            ));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            GenerationError::parse(format!(
                "Failed to parse response: {}, body: {}",
                e,
                Self::truncate(&body)
            ))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::parse("No choices in response"))?;

        extract_code_block(&content)
            .ok_or_else(|| GenerationError::no_code("No code was found in the assistant's response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = ChatCompletionsClient::new(
            "https://api.openai.com/v1/",
            "sk-test",
            "gpt-4o-mini",
            "You write code.",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "錯".repeat(400);
        let truncated = ChatCompletionsClient::truncate(&long);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= MAX_ERROR_BODY + 3);
        assert_eq!(ChatCompletionsClient::truncate("short"), "short");
    }
}
