// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! LLM client abstraction for LLM-as-judge evaluators
//!
//! Judges answer in one of two shapes: free text carrying an encoded verdict
//! (parsed by the evaluator), or a structured object constrained by a JSON
//! schema. Requests state which one they want via [`ResponseFormat`] and
//! responses come back as the matching [`JudgeOutput`] arm.

use async_trait::async_trait;
use ragcheck_core::JudgeConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert evaluator.";

/// Trait for LLM clients used as judges
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Send a request and get the judge's reply
    async fn complete(&self, request: JudgeRequest) -> Result<LLMResponse, LLMError>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Shape the judge must answer in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    Structured {
        name: String,
        schema: serde_json::Value,
    },
}

/// A single judge call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub format: ResponseFormat,
}

impl JudgeRequest {
    /// Free-text request
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            format: ResponseFormat::Text,
        }
    }

    /// Request constrained to a JSON schema
    pub fn structured(
        prompt: impl Into<String>,
        name: impl Into<String>,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            format: ResponseFormat::Structured {
                name: name.into(),
                schema,
            },
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Judge reply, either free text or a structured object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JudgeOutput {
    FreeText(String),
    Structured(serde_json::Map<String, serde_json::Value>),
}

impl JudgeOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            JudgeOutput::FreeText(text) => Some(text),
            JudgeOutput::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self {
            JudgeOutput::Structured(fields) => Some(fields),
            JudgeOutput::FreeText(_) => None,
        }
    }

    pub fn arm(&self) -> &'static str {
        match self {
            JudgeOutput::FreeText(_) => "free text",
            JudgeOutput::Structured(_) => "structured",
        }
    }
}

/// Response from LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub output: JudgeOutput,
    pub usage: TokenUsage,
    pub model: String,
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Errors from LLM clients
#[derive(Debug, Error)]
pub enum LLMError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Client for OpenAI-compatible chat completion endpoints
pub struct OpenAIClient {
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.0,
            client: reqwest::Client::new(),
        }
    }

    /// Build a client from the judge section of the harness config
    pub fn from_config(config: &JudgeConfig) -> Self {
        Self::new(config.api_key.clone().unwrap_or_default(), config.model.clone())
            .with_base_url(config.endpoint.clone())
            .with_temperature(config.temperature)
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn request_body(&self, request: &JudgeRequest) -> serde_json::Value {
        let system = request.system.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": request.prompt }
            ],
            "temperature": self.temperature
        });

        if let ResponseFormat::Structured { name, schema } = &request.format {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": name,
                    "strict": true,
                    "schema": schema
                }
            });
        }

        body
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn complete(&self, request: JudgeRequest) -> Result<LLMResponse, LLMError> {
        let body = self.request_body(&request);

        let mut http = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json");
        if !self.api_key.is_empty() {
            http = http.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = http.json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LLMError::RateLimitExceeded);
            }
            return Err(LLMError::ApiError(format!("{}: {}", status, error_text)));
        }

        let response_data: serde_json::Value = response.json().await?;

        let content = response_data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(LLMError::InvalidResponse("Missing content".to_string()))?
            .to_string();

        let output = match request.format {
            ResponseFormat::Text => JudgeOutput::FreeText(content),
            // A reply that is not a JSON object is handed back verbatim; the
            // evaluator rejects the free-text arm as a parse failure.
            ResponseFormat::Structured { .. } => {
                match serde_json::from_str::<serde_json::Value>(&content) {
                    Ok(serde_json::Value::Object(fields)) => JudgeOutput::Structured(fields),
                    _ => JudgeOutput::FreeText(content),
                }
            }
        };

        let usage_data = &response_data["usage"];
        let usage = TokenUsage {
            prompt_tokens: usage_data["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: usage_data["completion_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: usage_data["total_tokens"].as_u64().unwrap_or(0) as u32,
        };

        tracing::debug!(
            model = %self.model,
            total_tokens = usage.total_tokens,
            arm = output.arm(),
            "judge call completed"
        );

        Ok(LLMResponse {
            output,
            usage,
            model: self.model.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion_body(content: &str) -> String {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }],
            "usage": { "prompt_tokens": 120, "completion_tokens": 8, "total_tokens": 128 }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_free_text_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("The answer is grounded. Rating: [[9]]"))
            .create_async()
            .await;

        let client = OpenAIClient::new("sk-test".to_string(), "gpt-4o-mini".to_string())
            .with_base_url(server.url());
        let response = client
            .complete(JudgeRequest::text("Rate this answer"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            response.output.as_text(),
            Some("The answer is grounded. Rating: [[9]]")
        );
        assert_eq!(response.usage.total_tokens, 128);
        assert_eq!(response.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_structured_completion_sends_schema() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "response_format": {
                    "type": "json_schema",
                    "json_schema": { "name": "grade", "strict": true }
                }
            })))
            .with_status(200)
            .with_body(completion_body(r#"{"binary_score": 1}"#))
            .create_async()
            .await;

        let client = OpenAIClient::new(String::new(), "gpt-4o".to_string())
            .with_base_url(format!("{}/", server.url()));
        let request = JudgeRequest::structured(
            "Is the answer grounded?",
            "grade",
            serde_json::json!({ "type": "object" }),
        );
        let response = client.complete(request).await.unwrap();

        mock.assert_async().await;
        let fields = response.output.as_structured().unwrap();
        assert_eq!(fields.get("binary_score"), Some(&serde_json::json!(1)));
        assert!(response.output.as_text().is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client =
            OpenAIClient::new("k".to_string(), "m".to_string()).with_base_url(server.url());
        let err = client.complete(JudgeRequest::text("hi")).await.unwrap_err();
        assert!(matches!(err, LLMError::RateLimitExceeded));
    }

    #[tokio::test]
    async fn test_structured_non_object_comes_back_as_text() {
        for content in ["[1]", "yes, grounded"] {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("POST", "/chat/completions")
                .with_status(200)
                .with_body(completion_body(content))
                .create_async()
                .await;

            let client =
                OpenAIClient::new("k".to_string(), "m".to_string()).with_base_url(server.url());
            let request = JudgeRequest::structured("p", "grade", serde_json::json!({}));
            let response = client.complete(request).await.unwrap();
            assert_eq!(response.output.as_text(), Some(content));
            assert!(response.output.as_structured().is_none());
        }
    }
}
