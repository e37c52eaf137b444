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

//! Experiment runner
//!
//! Drives a pipeline over every example of a dataset and scores each run with
//! the configured evaluators. Examples and the evaluators of one example run
//! concurrently; a shared semaphore bounds in-flight external calls and every
//! call runs under a timeout. Failures are recorded per (example, evaluator)
//! and never stop the remaining work.

use crate::pipeline::Pipeline;
use crate::report::{ErrorDescriptor, ExampleRecord, ExperimentReport};
use crate::{EvalError, Evaluator};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use ragcheck_core::{Dataset, Example, ExecutionConfig, RunTree};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

/// Concurrency and timeout settings for a runner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerConfig {
    /// Maximum in-flight external calls
    pub rate_limit: usize,
    /// Deadline for each external call
    pub timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for RunnerConfig {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            rate_limit: config.rate_limit,
            timeout: config.timeout(),
        }
    }
}

/// Runs a pipeline over a dataset and evaluates every run
pub struct EvaluationRunner {
    evaluators: Vec<Arc<dyn Evaluator>>,
    config: RunnerConfig,
    limiter: Arc<Semaphore>,
}

impl EvaluationRunner {
    pub fn new(evaluators: Vec<Arc<dyn Evaluator>>, config: RunnerConfig) -> Self {
        let config = RunnerConfig {
            rate_limit: config.rate_limit.max(1),
            ..config
        };
        Self {
            evaluators,
            limiter: Arc::new(Semaphore::new(config.rate_limit)),
            config,
        }
    }

    pub fn config(&self) -> RunnerConfig {
        self.config
    }

    pub fn evaluators(&self) -> &[Arc<dyn Evaluator>] {
        &self.evaluators
    }

    pub fn evaluator_keys(&self) -> Vec<String> {
        self.evaluators.iter().map(|e| e.key().to_string()).collect()
    }

    /// Invoke the pipeline once per example and score each run.
    ///
    /// Records come back in dataset order whatever order they completed in.
    pub async fn run(&self, pipeline: &dyn Pipeline, dataset: &Dataset) -> ExperimentReport {
        let started_at = Utc::now();
        info!(
            dataset = %dataset.name,
            examples = dataset.len(),
            evaluators = self.evaluators.len(),
            rate_limit = self.config.rate_limit,
            "starting experiment"
        );

        let mut records: Vec<ExampleRecord> = stream::iter(dataset.iter().enumerate())
            .map(|(index, example)| self.run_example(pipeline, index, example))
            .buffer_unordered(self.config.rate_limit)
            .collect()
            .await;
        records.sort_by_key(|r| r.index);

        let report = ExperimentReport {
            id: Uuid::new_v4(),
            dataset_id: dataset.id,
            dataset_name: dataset.name.clone(),
            started_at,
            finished_at: Utc::now(),
            evaluator_keys: self.evaluator_keys(),
            records,
        };

        let summary = report.summary();
        info!(
            dataset = %dataset.name,
            scored = summary.scored,
            partial = summary.partial,
            errored = summary.errored,
            duration_ms = summary.duration_ms,
            "experiment finished"
        );
        report
    }

    /// Score an already recorded run with every evaluator
    pub async fn evaluate_run(
        &self,
        index: usize,
        run: &RunTree,
        example: &Example,
    ) -> ExampleRecord {
        let outcomes = futures::future::join_all(self.evaluators.iter().map(|evaluator| async move {
            let outcome = self.guarded(evaluator.evaluate(run, example)).await;
            (evaluator.key(), outcome)
        }))
        .await;

        let mut judgments = Vec::new();
        let mut errors = Vec::new();
        for (key, outcome) in outcomes {
            match outcome {
                Ok(judgment) => judgments.push(judgment),
                Err(err) => {
                    warn!(evaluator = key, error = %err, "evaluator failed");
                    errors.push(ErrorDescriptor::from_error(Some(key), &err));
                }
            }
        }

        ExampleRecord::new(index, example.id, judgments, errors)
    }

    #[tracing::instrument(skip(self, pipeline, example), fields(example_id = %example.id))]
    async fn run_example(
        &self,
        pipeline: &dyn Pipeline,
        index: usize,
        example: &Example,
    ) -> ExampleRecord {
        match self.guarded(pipeline.invoke(example)).await {
            Ok(run) => self.evaluate_run(index, &run, example).await,
            Err(err) => {
                warn!(error = %err, "pipeline failed, skipping evaluators");
                let mut errors = vec![ErrorDescriptor::from_error(None, &err)];
                let skipped = EvalError::Skipped(format!("pipeline failed: {}", err));
                errors.extend(
                    self.evaluators
                        .iter()
                        .map(|e| ErrorDescriptor::from_error(Some(e.key()), &skipped)),
                );
                ExampleRecord::new(index, example.id, Vec::new(), errors)
            }
        }
    }

    /// Run one external call under the shared limit and the call deadline
    async fn guarded<T, F>(&self, call: F) -> Result<T, EvalError>
    where
        F: Future<Output = Result<T, EvalError>>,
    {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| EvalError::UpstreamCall("call limiter closed".to_string()))?;

        tokio::time::timeout(self.config.timeout, call)
            .await
            .map_err(|_| EvalError::Timeout(self.config.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ErrorKind, ExampleStatus};
    use crate::testing::ScriptedLLMClient;
    use crate::{EvaluatorMetadata, QaEvaluator, QaVariant};
    use async_trait::async_trait;
    use ragcheck_core::{ExampleInputs, ExampleOutputs, Judgment, RunInputs, RunOutputs};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the reference answer and counts invocations
    #[derive(Default)]
    struct EchoPipeline {
        invocations: AtomicUsize,
    }

    #[async_trait]
    impl Pipeline for EchoPipeline {
        async fn invoke(&self, example: &Example) -> Result<RunTree, EvalError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            let mut run = RunTree::new("get_answer", RunInputs::question(&example.inputs.question));
            let root = run.root_id();
            run.set_outputs(
                root,
                RunOutputs {
                    answer: example.outputs.answer.clone(),
                    contexts: None,
                },
            );
            Ok(run)
        }
    }

    /// Sleeps for the number of milliseconds given in the question
    struct SlowEvaluator;

    #[async_trait]
    impl Evaluator for SlowEvaluator {
        fn key(&self) -> &str {
            "slow"
        }

        async fn evaluate(&self, _run: &RunTree, example: &Example) -> Result<Judgment, EvalError> {
            let millis: u64 = example.inputs.question.parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(Judgment::new("slow", 1.0))
        }

        fn metadata(&self) -> EvaluatorMetadata {
            EvaluatorMetadata {
                name: "Slow".to_string(),
                version: "0.0.0".to_string(),
                description: String::new(),
                requires_reference: false,
                tags: Vec::new(),
            }
        }
    }

    fn dataset(questions: &[&str]) -> Dataset {
        let mut dataset = Dataset::new("runner-test");
        for q in questions {
            dataset.add_example(Example::new(ExampleInputs::new(*q), ExampleOutputs::new("a")));
        }
        dataset
    }

    #[tokio::test]
    async fn test_records_keep_dataset_order() {
        let runner = EvaluationRunner::new(
            vec![Arc::new(SlowEvaluator)],
            RunnerConfig {
                rate_limit: 4,
                timeout: Duration::from_secs(5),
            },
        );
        let data = dataset(&["40", "0", "20", "5"]);

        let report = runner.run(&EchoPipeline::default(), &data).await;
        let ids: Vec<_> = report.records.iter().map(|r| r.example_id).collect();
        let expected: Vec<_> = data.iter().map(|e| e.id).collect();
        assert_eq!(ids, expected);
        assert_eq!(report.evaluator_keys, vec!["slow".to_string()]);
    }

    #[tokio::test]
    async fn test_timeout_is_upstream_error() {
        let runner = EvaluationRunner::new(
            vec![Arc::new(SlowEvaluator)],
            RunnerConfig {
                rate_limit: 2,
                timeout: Duration::from_millis(20),
            },
        );

        let report = runner.run(&EchoPipeline::default(), &dataset(&["0", "1000"])).await;
        assert_eq!(report.records[0].status, ExampleStatus::Scored);

        let timed_out = &report.records[1];
        assert_eq!(timed_out.status, ExampleStatus::Errored);
        assert!(timed_out.judgments.is_empty());
        assert_eq!(timed_out.errors[0].kind, ErrorKind::UpstreamCall);
    }

    #[tokio::test]
    async fn test_pipeline_invoked_once_for_all_evaluators() {
        let judge = Arc::new(ScriptedLLMClient::new().with_text("GRADE: CORRECT"));
        let evaluators: Vec<Arc<dyn Evaluator>> = vec![
            Arc::new(QaEvaluator::new(judge.clone(), QaVariant::Qa)),
            Arc::new(QaEvaluator::new(judge.clone(), QaVariant::CotQa).with_key("cot_correctness")),
            Arc::new(SlowEvaluator),
        ];
        let runner = EvaluationRunner::new(evaluators, RunnerConfig::default());
        let pipeline = EchoPipeline::default();
        let data = dataset(&["q1", "q2"]);

        let report = runner.run(&pipeline, &data).await;
        assert_eq!(pipeline.invocations.load(Ordering::SeqCst), data.len());
        for record in &report.records {
            assert_eq!(record.status, ExampleStatus::Scored);
            assert_eq!(record.judgment("correctness").map(|j| j.score), Some(1.0));
            assert_eq!(record.judgment("cot_correctness").map(|j| j.score), Some(1.0));
            assert_eq!(record.judgment("slow").map(|j| j.score), Some(1.0));
        }
        assert_eq!(judge.call_count(), 4);
    }

    #[tokio::test]
    async fn test_slow_judge_times_out_without_judgment() {
        let judge = Arc::new(
            ScriptedLLMClient::new()
                .with_text("GRADE: CORRECT")
                .with_delay(Duration::from_millis(500)),
        );
        let runner = EvaluationRunner::new(
            vec![Arc::new(QaEvaluator::new(judge.clone(), QaVariant::Qa))],
            RunnerConfig {
                rate_limit: 2,
                timeout: Duration::from_millis(20),
            },
        );

        let report = runner.run(&EchoPipeline::default(), &dataset(&["q1"])).await;
        let record = &report.records[0];
        assert_eq!(record.status, ExampleStatus::Errored);
        assert!(record.judgment("correctness").is_none());
        assert_eq!(record.errors[0].kind, ErrorKind::UpstreamCall);
        assert!(record.errors[0].message.contains("timed out"));
        assert_eq!(judge.call_count(), 1);
    }

    #[test]
    fn test_config_from_execution() {
        let exec = ExecutionConfig {
            rate_limit: 3,
            timeout_secs: 7,
            ..ExecutionConfig::default()
        };
        let config = RunnerConfig::from(&exec);
        assert_eq!(config.rate_limit, 3);
        assert_eq!(config.timeout, Duration::from_secs(7));

        let runner = EvaluationRunner::new(
            Vec::new(),
            RunnerConfig {
                rate_limit: 0,
                ..config
            },
        );
        assert_eq!(runner.config().rate_limit, 1);
    }
}
