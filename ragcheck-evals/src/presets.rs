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

//! Pre-configured evaluator suites
//!
//! Instead of assembling evaluators by hand, pick a preset:
//!
//! ```rust,ignore
//! use ragcheck_evals::{EvalBuilder, EvalPreset};
//!
//! let runner = EvalBuilder::new()
//!     .with_preset(EvalPreset::Full, judge)
//!     .max_concurrent(4)
//!     .timeout_secs(30)
//!     .build()?;
//! let report = runner.run(&pipeline, &dataset).await;
//! ```

use crate::cache::CachedLLMClient;
use crate::evaluators::*;
use crate::llm_client::LLMClient;
use crate::runner::{EvaluationRunner, RunnerConfig};
use crate::{EvalError, Evaluator};
use ragcheck_core::ExecutionConfig;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Graded verdicts are divided by this so scores land in (0, 1]
const GRADED_NORMALIZE_BY: f64 = 10.0;

/// Evaluator suites for the four RAG axes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalPreset {
    /// Answer vs reference answer (chain-of-thought QA)
    Reference,

    /// Rubric-graded answer vs context, context vs question and answer vs
    /// question, normalized to (0, 1]
    Graded,

    /// Binary trace graders reading the recorded retrieval step
    Trace,

    /// One evaluator per axis: reference QA, graded hallucination and
    /// helpfulness, trace relevance and grounding
    Full,
}

impl EvalPreset {
    /// Create evaluators for this preset
    pub fn create_evaluators(&self, judge: Arc<dyn LLMClient>) -> Vec<Arc<dyn Evaluator>> {
        match self {
            EvalPreset::Reference => {
                vec![Arc::new(QaEvaluator::new(judge, QaVariant::CotQa))]
            }
            EvalPreset::Graded => vec![
                Arc::new(
                    ScoreStringEvaluator::labeled(judge.clone())
                        .with_normalize_by(GRADED_NORMALIZE_BY),
                ),
                Arc::new(
                    ScoreStringEvaluator::unlabeled(judge.clone())
                        .with_normalize_by(GRADED_NORMALIZE_BY),
                ),
                Arc::new(
                    ScoreStringEvaluator::helpfulness(judge).with_normalize_by(GRADED_NORMALIZE_BY),
                ),
            ],
            EvalPreset::Trace => vec![
                Arc::new(DocumentRelevanceGrader::new(judge.clone())),
                Arc::new(HallucinationGrader::new(judge)),
            ],
            EvalPreset::Full => vec![
                Arc::new(QaEvaluator::new(judge.clone(), QaVariant::CotQa)),
                Arc::new(
                    ScoreStringEvaluator::labeled(judge.clone())
                        .with_normalize_by(GRADED_NORMALIZE_BY),
                ),
                Arc::new(
                    ScoreStringEvaluator::helpfulness(judge.clone())
                        .with_normalize_by(GRADED_NORMALIZE_BY),
                ),
                Arc::new(DocumentRelevanceGrader::new(judge.clone())),
                Arc::new(HallucinationGrader::new(judge)),
            ],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EvalPreset::Reference => "reference",
            EvalPreset::Graded => "graded",
            EvalPreset::Trace => "trace",
            EvalPreset::Full => "full",
        }
    }

    /// Get a description of this preset
    pub fn description(&self) -> &'static str {
        match self {
            EvalPreset::Reference => "Correctness against the reference answer",
            EvalPreset::Graded => {
                "1-10 rubric scores: grounding in context, document relevance, helpfulness"
            }
            EvalPreset::Trace => "Binary document relevance and grounding from the run trace",
            EvalPreset::Full => "All four axes: correctness, grounding, relevance, helpfulness",
        }
    }

    /// Get all available presets
    pub fn all() -> Vec<Self> {
        vec![
            EvalPreset::Reference,
            EvalPreset::Graded,
            EvalPreset::Trace,
            EvalPreset::Full,
        ]
    }
}

impl fmt::Display for EvalPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EvalPreset {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EvalError::InvalidInput(format!("unknown preset '{}'", s)))
    }
}

/// Fluent builder for an [`EvaluationRunner`]
pub struct EvalBuilder {
    presets: Vec<(EvalPreset, Arc<dyn LLMClient>)>,
    evaluators: Vec<Arc<dyn Evaluator>>,
    config: RunnerConfig,
    cache_ttl: Option<Duration>,
}

impl EvalBuilder {
    pub fn new() -> Self {
        Self {
            presets: Vec::new(),
            evaluators: Vec::new(),
            config: RunnerConfig::default(),
            cache_ttl: None,
        }
    }

    /// Add evaluators from a preset, judged by `judge`
    pub fn with_preset(mut self, preset: EvalPreset, judge: Arc<dyn LLMClient>) -> Self {
        self.presets.push((preset, judge));
        self
    }

    /// Add a custom evaluator
    pub fn add_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Take limits and caching from the `[execution]` section
    pub fn with_execution(mut self, execution: &ExecutionConfig) -> Self {
        self.config = RunnerConfig::from(execution);
        self.cache_ttl = execution
            .enable_cache
            .then(|| Duration::from_secs(execution.cache_ttl_secs));
        self
    }

    /// Set maximum in-flight external calls
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.config.rate_limit = max;
        self
    }

    /// Set timeout per external call (seconds)
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout = Duration::from_secs(secs);
        self
    }

    /// Cache judge responses of preset evaluators for `ttl_secs`
    pub fn with_cache(mut self, ttl_secs: u64) -> Self {
        self.cache_ttl = Some(Duration::from_secs(ttl_secs));
        self
    }

    /// Build the runner.
    ///
    /// Fails when no evaluator is configured or two evaluators share a key,
    /// since per-key aggregation needs one evaluator per key.
    pub fn build(self) -> Result<EvaluationRunner, EvalError> {
        let mut evaluators = Vec::new();
        for (preset, judge) in self.presets {
            let judge: Arc<dyn LLMClient> = match self.cache_ttl {
                Some(ttl) => Arc::new(CachedLLMClient::new(judge, ttl.as_secs())),
                None => judge,
            };
            evaluators.extend(preset.create_evaluators(judge));
        }
        evaluators.extend(self.evaluators);

        if evaluators.is_empty() {
            return Err(EvalError::InvalidInput(
                "No evaluators configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for evaluator in &evaluators {
            if !seen.insert(evaluator.key().to_string()) {
                return Err(EvalError::InvalidInput(format!(
                    "duplicate evaluator key '{}'",
                    evaluator.key()
                )));
            }
        }

        Ok(EvaluationRunner::new(evaluators, self.config))
    }
}

impl Default for EvalBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLLMClient;

    fn judge() -> Arc<dyn LLMClient> {
        Arc::new(ScriptedLLMClient::new())
    }

    #[test]
    fn test_preset_descriptions() {
        for preset in EvalPreset::all() {
            assert!(!preset.description().is_empty());
            assert_eq!(preset.name().parse::<EvalPreset>().unwrap(), preset);
        }
        assert!("everything".parse::<EvalPreset>().is_err());
    }

    #[test]
    fn test_full_preset_covers_four_axes() {
        let keys: Vec<String> = EvalPreset::Full
            .create_evaluators(judge())
            .iter()
            .map(|e| e.key().to_string())
            .collect();
        assert_eq!(
            keys,
            vec![
                "correctness",
                "hallucination",
                "answer_helpfulness",
                "document_relevance",
                "answer_hallucination"
            ]
        );
    }

    #[test]
    fn test_eval_builder() {
        let runner = EvalBuilder::new()
            .with_preset(EvalPreset::Trace, judge())
            .add_evaluator(Arc::new(QaEvaluator::new(judge(), QaVariant::Qa)))
            .max_concurrent(5)
            .timeout_secs(60)
            .with_cache(600)
            .build()
            .unwrap();

        assert_eq!(runner.config().rate_limit, 5);
        assert_eq!(runner.config().timeout, Duration::from_secs(60));
        assert_eq!(
            runner.evaluator_keys(),
            vec!["document_relevance", "answer_hallucination", "correctness"]
        );
    }

    #[test]
    fn test_builder_rejects_empty_and_duplicate_keys() {
        assert!(matches!(
            EvalBuilder::new().build(),
            Err(EvalError::InvalidInput(_))
        ));

        let duplicate = EvalBuilder::new()
            .with_preset(EvalPreset::Graded, judge())
            .with_preset(EvalPreset::Trace, judge())
            .build();
        assert!(matches!(duplicate, Err(EvalError::InvalidInput(ref m)) if m.contains("document_relevance")));
    }
}
