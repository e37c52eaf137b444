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

//! # Ragcheck Evaluation Framework
//!
//! Scores a retrieval-augmented generation pipeline along four axes: answer
//! vs reference, answer vs question, answer vs retrieved context, and
//! retrieved context vs question.
//!
//! ## Features
//!
//! - **Field routers**: each evaluator declares how `{prediction, reference, input}`
//!   is assembled from a recorded run and a dataset example
//! - **LLM-as-judge evaluators**: reference QA (direct and chain-of-thought),
//!   graded rubric scoring with optional normalization
//! - **Trace-based graders**: reach into the recorded run tree for intermediate
//!   values the pipeline does not expose
//! - **Experiment runner**: bounded concurrency, per-call timeouts, per-example
//!   failure isolation
//!
//! ## Example
//!
//! ```rust,ignore
//! use ragcheck_evals::llm_client::OpenAIClient;
//! use ragcheck_evals::{EvalBuilder, EvalPreset};
//! use std::sync::Arc;
//!
//! let judge = Arc::new(OpenAIClient::new(api_key, "gpt-4o-mini".to_string()));
//!
//! let runner = EvalBuilder::new()
//!     .with_preset(EvalPreset::Full, judge)
//!     .max_concurrent(4)
//!     .build()?;
//!
//! let report = runner.run(&pipeline, &dataset).await;
//! println!("{}", report.summary());
//! ```

use async_trait::async_trait;
use ragcheck_core::{Example, InputField, Judgment, RunTree, TraceLookupError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod cache;
pub mod evaluators;
pub mod llm_client;
pub mod pipeline;
pub mod presets;
pub mod report;
pub mod router;
pub mod runner;
pub mod testing;

pub use cache::{CacheStats, CachedLLMClient};
pub use evaluators::{
    Criterion, DocumentRelevanceGrader, HallucinationGrader, QaEvaluator, QaVariant,
    ScoreStringEvaluator,
};
pub use llm_client::{JudgeOutput, JudgeRequest, LLMClient, LLMError, LLMResponse, ResponseFormat};
pub use pipeline::{AnswerGenerator, DocumentStore, Pipeline, RagPipeline, RecordedPipeline};
pub use presets::{EvalBuilder, EvalPreset};
pub use report::{
    ErrorDescriptor, ErrorKind, ExampleRecord, ExampleStatus, ExperimentReport, KeyAggregate,
    ReportSummary,
};
pub use router::{FieldRouter, RouterFn};
pub use runner::{EvaluationRunner, RunnerConfig};

/// Core trait that all evaluators implement
///
/// An evaluator receives the full recorded run tree and the dataset example
/// it was produced from. String evaluators route fields from the root run
/// through their [`FieldRouter`]; trace-based evaluators walk the tree.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Judgment key; identical for every example of an experiment
    fn key(&self) -> &str;

    /// Score one (run, example) pair
    async fn evaluate(&self, run: &RunTree, example: &Example) -> Result<Judgment, EvalError>;

    /// Metadata about this evaluator (name, version, tags)
    fn metadata(&self) -> EvaluatorMetadata;
}

/// Metadata about an evaluator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorMetadata {
    /// Human-readable name
    pub name: String,

    /// Version string (e.g., "1.0.0")
    pub version: String,

    /// Description of what this evaluator does
    pub description: String,

    /// Whether the evaluator reads the example's reference answer
    pub requires_reference: bool,

    /// Tags for categorization
    pub tags: Vec<String>,
}

/// Errors that can occur while evaluating one example
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Could not parse judge verdict: {0}")]
    ScoreParse(String),

    #[error("Trace lookup failed: {0}")]
    TraceLookup(#[from] TraceLookupError),

    #[error("Upstream call failed: {0}")]
    UpstreamCall(String),

    #[error("Upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Skipped: {0}")]
    Skipped(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl EvalError {
    /// Router failure for a field of the evaluator triple
    pub fn missing(field: InputField, source: &str) -> Self {
        EvalError::MissingField(format!("{} ({})", field, source))
    }

    /// Category used by the experiment report
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::MissingField(_) => ErrorKind::MissingField,
            EvalError::ScoreParse(_) => ErrorKind::ScoreParse,
            EvalError::TraceLookup(_) => ErrorKind::TraceLookup,
            EvalError::UpstreamCall(_) | EvalError::Timeout(_) => ErrorKind::UpstreamCall,
            EvalError::Skipped(_) => ErrorKind::Skipped,
            EvalError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

impl From<LLMError> for EvalError {
    fn from(err: LLMError) -> Self {
        EvalError::UpstreamCall(err.to_string())
    }
}
