//! Messages-API client for the assistant.
//!
//! One-shot requests only: failed calls surface to the conversation as
//! errors instead of being retried.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ChatConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("json error: {0}")]
    Serde(String),
}

/// A content block in a conversation turn, in provider wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

impl ApiMessage {
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
        }
    }

    pub fn tool_result(tool_use_id: String, content: String, is_error: bool) -> Self {
        Self {
            role: "user".to_string(),
            content: vec![ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            }],
        }
    }
}

/// A tool the model may invoke, with a JSON-schema input contract.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [ApiMessage],
    tools: &'a [ToolDef],
}

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
}

impl CompletionResponse {
    /// Concatenated text blocks of the response.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// HTTP client for the messages endpoint.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl LlmClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    /// Returns None when no API key is configured; the chat endpoint then
    /// reports the assistant as unavailable.
    pub fn from_config(config: &ChatConfig) -> Option<Result<Self, LlmError>> {
        let api_key = config.api_key.clone()?;

        let http = match Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("atelier/", env!("CARGO_PKG_VERSION")))
            .build()
        {
            Ok(client) => client,
            Err(e) => return Some(Err(LlmError::Transport(e.to_string()))),
        };

        Some(Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }))
    }

    /// Runs one model step over the conversation.
    pub async fn complete(
        &self,
        system: &str,
        messages: &[ApiMessage],
        tools: &[ToolDef],
    ) -> Result<CompletionResponse, LlmError> {
        let request = CompletionRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: Some(system),
            messages,
            tools,
        };

        let res = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => res
                .json::<CompletionResponse>()
                .await
                .map_err(|e| LlmError::Serde(e.to_string())),
            StatusCode::UNAUTHORIZED => Err(LlmError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(LlmError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(LlmError::Http { status, body })
            }
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_api_key() {
        let config = ChatConfig {
            api_url: "https://api.anthropic.com".to_string(),
            api_key: None,
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 2048,
            max_steps: 10,
        };
        assert!(LlmClient::from_config(&config).is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let config = ChatConfig {
            api_url: "https://api.anthropic.com/".to_string(),
            api_key: Some("key".to_string()),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 2048,
            max_steps: 10,
        };
        let client = LlmClient::from_config(&config).unwrap().unwrap();
        assert_eq!(client.base_url, "https://api.anthropic.com");
    }

    #[test]
    fn test_content_block_wire_format() {
        let block = ContentBlock::ToolUse {
            id: "toolu_1".to_string(),
            name: "findProjects".to_string(),
            input: serde_json::json!({"query": "portail"}),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_use");
        assert_eq!(json["name"], "findProjects");

        let parsed: ContentBlock =
            serde_json::from_value(serde_json::json!({"type": "text", "text": "hi"})).unwrap();
        assert!(matches!(parsed, ContentBlock::Text { .. }));
    }

    #[test]
    fn test_tool_result_error_flag_is_omitted_when_false() {
        let ok = ApiMessage::tool_result("toolu_1".to_string(), "{}".to_string(), false);
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json["content"][0].get("is_error").is_none());

        let err = ApiMessage::tool_result("toolu_1".to_string(), "boom".to_string(), true);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["content"][0]["is_error"], true);
    }

    #[test]
    fn test_response_text_concatenates_blocks() {
        let response = CompletionResponse {
            content: vec![
                ContentBlock::Text {
                    text: "Hello ".to_string(),
                },
                ContentBlock::ToolUse {
                    id: "t".to_string(),
                    name: "findProjects".to_string(),
                    input: serde_json::json!({}),
                },
                ContentBlock::Text {
                    text: "world".to_string(),
                },
            ],
            stop_reason: Some("end_turn".to_string()),
        };
        assert_eq!(response.text(), "Hello world");
    }
}
