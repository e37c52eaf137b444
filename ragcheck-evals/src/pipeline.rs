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

//! The pipeline under evaluation and its external collaborators
//!
//! A [`Pipeline`] turns one example into a recorded [`RunTree`]. The stock
//! [`RagPipeline`] records a `get_answer` root with a `retrieve_docs` child;
//! [`RecordedPipeline`] replays trees captured elsewhere.

use crate::llm_client::{JudgeOutput, JudgeRequest, LLMClient, OpenAIClient};
use crate::EvalError;
use async_trait::async_trait;
use ragcheck_core::run::join_documents;
use ragcheck_core::{
    Document, Example, PipelineConfig, RunInputs, RunOutputs, RunTree, GET_ANSWER_RUN,
    RETRIEVE_DOCS_RUN,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Top-k similarity search over an indexed corpus
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// At most `k` documents, most similar first
    async fn query(&self, text: &str, k: usize) -> Result<Vec<Document>, EvalError>;
}

/// Free-text answer generation from a question and retrieved context
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        question: &str,
        context_block: &str,
    ) -> Result<String, EvalError>;
}

/// Anything that produces a recorded run for an example
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn invoke(&self, example: &Example) -> Result<RunTree, EvalError>;
}

/// Retrieval followed by generation, recorded as `get_answer` / `retrieve_docs`
pub struct RagPipeline {
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn AnswerGenerator>,
    config: PipelineConfig,
}

impl RagPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn AnswerGenerator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            generator,
            config,
        }
    }

    /// Whether `get_answer` exposes the retrieved documents in its outputs
    pub fn with_return_contexts(mut self, return_contexts: bool) -> Self {
        self.config.return_contexts = return_contexts;
        self
    }
}

#[async_trait]
impl Pipeline for RagPipeline {
    async fn invoke(&self, example: &Example) -> Result<RunTree, EvalError> {
        let question = example.inputs.question.as_str();

        let mut run = RunTree::new(GET_ANSWER_RUN, RunInputs::question(question));
        let root = run.root_id();

        let retrieval = run.add_child(root, RETRIEVE_DOCS_RUN, RunInputs::question(question));
        let documents = self.store.query(question, self.config.k).await?;
        run.set_outputs(
            retrieval,
            RunOutputs {
                answer: None,
                contexts: Some(documents.clone()),
            },
        );
        run.finish(retrieval);

        let answer = self
            .generator
            .generate(
                &self.config.system_prompt,
                question,
                &join_documents(&documents),
            )
            .await?;

        tracing::debug!(
            example_id = %example.id,
            documents = documents.len(),
            "pipeline produced answer"
        );

        run.set_outputs(
            root,
            RunOutputs {
                answer: Some(answer),
                contexts: self.config.return_contexts.then_some(documents),
            },
        );
        run.finish(root);
        Ok(run)
    }
}

#[async_trait]
impl AnswerGenerator for OpenAIClient {
    async fn generate(
        &self,
        system_prompt: &str,
        question: &str,
        context_block: &str,
    ) -> Result<String, EvalError> {
        let prompt = format!(
            "Use the following pieces of retrieved context to answer the question.\n\n\
             {}\n\nQuestion: {}",
            context_block, question
        );
        let response = self
            .complete(JudgeRequest::text(prompt).with_system(system_prompt))
            .await?;

        match response.output {
            JudgeOutput::FreeText(answer) => Ok(answer),
            other => Err(EvalError::UpstreamCall(format!(
                "generator returned a {} reply",
                other.arm()
            ))),
        }
    }
}

/// A run captured for one example, as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedRun {
    pub example_id: Uuid,
    pub run: RunTree,
}

/// Replays runs recorded by an external pipeline, keyed by example id
#[derive(Debug, Default)]
pub struct RecordedPipeline {
    runs: HashMap<Uuid, RunTree>,
}

impl RecordedPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_runs(runs: impl IntoIterator<Item = RecordedRun>) -> Self {
        Self {
            runs: runs
                .into_iter()
                .map(|recorded| (recorded.example_id, recorded.run))
                .collect(),
        }
    }

    pub fn insert(&mut self, example_id: Uuid, run: RunTree) {
        self.runs.insert(example_id, run);
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[async_trait]
impl Pipeline for RecordedPipeline {
    async fn invoke(&self, example: &Example) -> Result<RunTree, EvalError> {
        let run = self.runs.get(&example.id).ok_or_else(|| {
            EvalError::UpstreamCall(format!("no recorded run for example {}", example.id))
        })?;

        // A run whose root failed has nothing to evaluate
        if let Some(error) = &run.root().error {
            return Err(EvalError::UpstreamCall(format!(
                "recorded run '{}' failed: {}",
                run.root().name,
                error
            )));
        }
        Ok(run.clone())
    }
}
