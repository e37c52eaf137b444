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

//! Deterministic stand-ins for the external collaborators
//!
//! Judges, document stores and answer generators are black boxes; these
//! doubles let evaluators and the runner be exercised without network calls.

use crate::llm_client::{JudgeOutput, JudgeRequest, LLMClient, LLMError, LLMResponse, TokenUsage};
use crate::pipeline::{AnswerGenerator, DocumentStore};
use crate::EvalError;
use async_trait::async_trait;
use parking_lot::Mutex;
use ragcheck_core::Document;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Scripted {
    Output(JudgeOutput),
    Failure(String),
}

type Responder = Box<dyn Fn(&JudgeRequest) -> Result<JudgeOutput, LLMError> + Send + Sync>;

/// Judge that replays scripted replies
///
/// Replies are consumed in order; the last one repeats once the script is
/// exhausted. Every request is recorded for later inspection.
pub struct ScriptedLLMClient {
    script: Mutex<VecDeque<Scripted>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<JudgeRequest>>,
    delay: Option<Duration>,
}

impl ScriptedLLMClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            responder: None,
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Answer every request by calling `f`
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&JudgeRequest) -> Result<JudgeOutput, LLMError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(f)),
            ..Self::new()
        }
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.script
            .lock()
            .push_back(Scripted::Output(JudgeOutput::FreeText(text.into())));
        self
    }

    pub fn with_structured(self, value: serde_json::Value) -> Self {
        let fields = match value {
            serde_json::Value::Object(fields) => fields,
            other => {
                let mut fields = serde_json::Map::new();
                fields.insert("value".to_string(), other);
                fields
            }
        };
        self.script
            .lock()
            .push_back(Scripted::Output(JudgeOutput::Structured(fields)));
        self
    }

    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.script.lock().push_back(Scripted::Failure(message.into()));
        self
    }

    /// Sleep before answering, to exercise timeouts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<JudgeRequest> {
        self.requests.lock().clone()
    }

    fn next_reply(&self, request: &JudgeRequest) -> Result<JudgeOutput, LLMError> {
        if let Some(responder) = &self.responder {
            return responder(request);
        }

        let mut script = self.script.lock();
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };

        match next {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::Failure(message)) => Err(LLMError::ApiError(message)),
            None => Err(LLMError::InvalidResponse("script exhausted".to_string())),
        }
    }
}

impl Default for ScriptedLLMClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for ScriptedLLMClient {
    async fn complete(&self, request: JudgeRequest) -> Result<LLMResponse, LLMError> {
        self.requests.lock().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let output = self.next_reply(&request)?;
        Ok(LLMResponse {
            output,
            usage: TokenUsage::default(),
            model: self.model_name().to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "scripted-judge"
    }
}

/// Document store that always returns the same ranked documents
pub struct StaticDocumentStore {
    documents: Vec<Document>,
}

impl StaticDocumentStore {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl DocumentStore for StaticDocumentStore {
    async fn query(&self, _text: &str, k: usize) -> Result<Vec<Document>, EvalError> {
        Ok(self.documents.iter().take(k).cloned().collect())
    }
}

/// Generator that answers with a fixed string, or fails for chosen questions
pub struct StaticAnswerGenerator {
    answer: String,
    failing_questions: Vec<String>,
}

impl StaticAnswerGenerator {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            failing_questions: Vec::new(),
        }
    }

    pub fn failing_on(mut self, question: impl Into<String>) -> Self {
        self.failing_questions.push(question.into());
        self
    }
}

#[async_trait]
impl AnswerGenerator for StaticAnswerGenerator {
    async fn generate(
        &self,
        _system_prompt: &str,
        question: &str,
        _context_block: &str,
    ) -> Result<String, EvalError> {
        if self.failing_questions.iter().any(|q| q == question) {
            return Err(EvalError::UpstreamCall(format!(
                "generator unavailable for '{}'",
                question
            )));
        }
        Ok(self.answer.clone())
    }
}
