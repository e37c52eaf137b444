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

//! Trace-based binary graders
//!
//! These graders skip the field router and walk the recorded run tree by
//! name, so they can read intermediate values (the documents `retrieve_docs`
//! actually returned) even when the pipeline's public output omits them.
//! The cost is coupling to the pipeline's step names; both graders take
//! their paths through `with_paths`.
//!
//! The judge answers with a structured object holding a single integer field
//! `binary_score`. Anything but the integers 0 or 1 is a parse error.

use crate::llm_client::{JudgeOutput, JudgeRequest, LLMClient};
use crate::{EvalError, Evaluator, EvaluatorMetadata};
use async_trait::async_trait;
use ragcheck_core::run::join_documents;
use ragcheck_core::{
    Example, InputField, Judgment, RunNode, RunTree, GET_ANSWER_RUN, RETRIEVE_DOCS_RUN,
};
use std::sync::Arc;

pub const BINARY_SCORE_FIELD: &str = "binary_score";

fn binary_score_schema(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "binary_score": {
                "type": "integer",
                "enum": [0, 1],
                "description": description
            }
        },
        "required": ["binary_score"],
        "additionalProperties": false
    })
}

/// Read `binary_score` from a structured reply; only the integers 0 and 1 pass
pub(crate) fn parse_binary_score(output: &JudgeOutput) -> Result<u8, EvalError> {
    let fields = output.as_structured().ok_or_else(|| {
        EvalError::ScoreParse(format!(
            "expected a structured verdict, got a {} reply",
            output.arm()
        ))
    })?;
    let value = fields.get(BINARY_SCORE_FIELD).ok_or_else(|| {
        EvalError::ScoreParse(format!("structured verdict has no '{}' field", BINARY_SCORE_FIELD))
    })?;

    match value.as_u64() {
        Some(0) => Ok(0),
        Some(1) => Ok(1),
        _ => Err(EvalError::ScoreParse(format!(
            "'{}' must be the integer 0 or 1, got {}",
            BINARY_SCORE_FIELD, value
        ))),
    }
}

fn default_docs_path() -> Vec<String> {
    vec![GET_ANSWER_RUN.to_string(), RETRIEVE_DOCS_RUN.to_string()]
}

fn path_label(path: &[String]) -> String {
    path.join("/")
}

/// Joined documents recorded on a retrieval step
fn retrieved_documents(node: &RunNode, path: &[String]) -> Result<String, EvalError> {
    match node.outputs.contexts.as_deref() {
        Some(docs) if !docs.is_empty() => Ok(join_documents(docs)),
        _ => Err(EvalError::missing(
            InputField::Reference,
            &format!("{}.outputs.contexts", path_label(path)),
        )),
    }
}

/// Does the retrieval step return documents relevant to the question
pub struct DocumentRelevanceGrader {
    judge: Arc<dyn LLMClient>,
    key: String,
    docs_path: Vec<String>,
}

impl DocumentRelevanceGrader {
    pub fn new(judge: Arc<dyn LLMClient>) -> Self {
        Self {
            judge,
            key: "document_relevance".to_string(),
            docs_path: default_docs_path(),
        }
    }

    /// Path from the root to the retrieval step
    pub fn with_paths<S: Into<String>>(mut self, docs_path: impl IntoIterator<Item = S>) -> Self {
        self.docs_path = docs_path.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    fn build_request(&self, documents: &str, question: &str) -> JudgeRequest {
        let prompt = format!(
            "Retrieved documents:\n\n{}\n\nUser question: {}",
            documents, question
        );
        JudgeRequest::structured(
            prompt,
            "relevance_grade",
            binary_score_schema("1 if the documents are relevant to the question, otherwise 0"),
        )
        .with_system(
            "You are a grader assessing relevance of retrieved documents to a user question. \
If the documents contain keyword(s) or semantic meaning related to the user question, \
grade them as relevant. It does not need to be a stringent test. The goal is to filter \
out erroneous retrievals. Give a binary score 1 or 0, where 1 means that the documents \
are relevant to the question.",
        )
    }
}

#[async_trait]
impl Evaluator for DocumentRelevanceGrader {
    fn key(&self) -> &str {
        &self.key
    }

    async fn evaluate(&self, run: &RunTree, example: &Example) -> Result<Judgment, EvalError> {
        let retrieval = run.resolve(self.docs_path.as_slice())?;
        let documents = retrieved_documents(retrieval, &self.docs_path)?;
        let question = retrieval
            .inputs
            .question
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(example.inputs.question.as_str());

        let response = self
            .judge
            .complete(self.build_request(&documents, question))
            .await?;
        let score = parse_binary_score(&response.output)?;

        Ok(Judgment::new(&self.key, f64::from(score)))
    }

    fn metadata(&self) -> EvaluatorMetadata {
        EvaluatorMetadata {
            name: "Document Relevance Grader".to_string(),
            version: "1.0.0".to_string(),
            description: format!(
                "Binary relevance of the documents recorded at '{}' to the question.",
                path_label(&self.docs_path)
            ),
            requires_reference: false,
            tags: vec![
                "relevance".to_string(),
                "trace".to_string(),
                "llm-as-judge".to_string(),
            ],
        }
    }
}

/// Is the final answer grounded in the retrieved documents
pub struct HallucinationGrader {
    judge: Arc<dyn LLMClient>,
    key: String,
    answer_path: Vec<String>,
    docs_path: Vec<String>,
}

impl HallucinationGrader {
    pub fn new(judge: Arc<dyn LLMClient>) -> Self {
        Self {
            judge,
            key: "answer_hallucination".to_string(),
            answer_path: vec![GET_ANSWER_RUN.to_string()],
            docs_path: default_docs_path(),
        }
    }

    /// Paths from the root to the answering step and the retrieval step
    pub fn with_paths<A, D>(
        mut self,
        answer_path: impl IntoIterator<Item = A>,
        docs_path: impl IntoIterator<Item = D>,
    ) -> Self
    where
        A: Into<String>,
        D: Into<String>,
    {
        self.answer_path = answer_path.into_iter().map(Into::into).collect();
        self.docs_path = docs_path.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    fn build_request(&self, documents: &str, answer: &str) -> JudgeRequest {
        let prompt = format!(
            "Set of facts:\n\n{}\n\nLLM generation: {}",
            documents, answer
        );
        JudgeRequest::structured(
            prompt,
            "grounding_grade",
            binary_score_schema("1 if the answer is grounded in the facts, otherwise 0"),
        )
        .with_system(
            "You are a grader assessing whether an LLM generation is grounded in / supported \
by a set of retrieved facts. Give a binary score 1 or 0, where 1 means that the answer \
is grounded in / supported by the set of facts.",
        )
    }
}

#[async_trait]
impl Evaluator for HallucinationGrader {
    fn key(&self) -> &str {
        &self.key
    }

    async fn evaluate(&self, run: &RunTree, _example: &Example) -> Result<Judgment, EvalError> {
        let retrieval = run.resolve(self.docs_path.as_slice())?;
        let documents = retrieved_documents(retrieval, &self.docs_path)?;

        let answering = run.resolve(self.answer_path.as_slice())?;
        let answer = answering
            .outputs
            .answer
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| {
                EvalError::missing(
                    InputField::Prediction,
                    &format!("{}.outputs.answer", path_label(&self.answer_path)),
                )
            })?;

        let response = self
            .judge
            .complete(self.build_request(&documents, answer))
            .await?;
        let score = parse_binary_score(&response.output)?;

        Ok(Judgment::new(&self.key, f64::from(score)))
    }

    fn metadata(&self) -> EvaluatorMetadata {
        EvaluatorMetadata {
            name: "Hallucination Grader".to_string(),
            version: "1.0.0".to_string(),
            description: format!(
                "Binary grounding of the answer at '{}' in the documents at '{}'.",
                path_label(&self.answer_path),
                path_label(&self.docs_path)
            ),
            requires_reference: false,
            tags: vec![
                "hallucination".to_string(),
                "groundedness".to_string(),
                "trace".to_string(),
                "llm-as-judge".to_string(),
            ],
        }
    }
}
