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

//! Experiment report and per-key aggregates

use crate::EvalError;
use chrono::{DateTime, Utc};
use ragcheck_core::Judgment;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Category of a recorded failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingField,
    ScoreParse,
    TraceLookup,
    UpstreamCall,
    Skipped,
    InvalidInput,
}

/// One failure recorded against an example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Evaluator key, or `None` for a pipeline failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDescriptor {
    pub fn from_error(evaluator: Option<&str>, error: &EvalError) -> Self {
        Self {
            evaluator: evaluator.map(str::to_string),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome of one example across all evaluators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExampleStatus {
    /// Every evaluator produced a judgment
    Scored,
    /// Some evaluators failed
    Partial,
    /// No judgment at all
    Errored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleRecord {
    /// Position of the example in its dataset
    pub index: usize,
    pub example_id: Uuid,
    pub status: ExampleStatus,
    pub judgments: Vec<Judgment>,
    pub errors: Vec<ErrorDescriptor>,
}

impl ExampleRecord {
    pub fn new(
        index: usize,
        example_id: Uuid,
        judgments: Vec<Judgment>,
        errors: Vec<ErrorDescriptor>,
    ) -> Self {
        let status = match (judgments.is_empty(), errors.is_empty()) {
            (_, true) => ExampleStatus::Scored,
            (true, false) => ExampleStatus::Errored,
            (false, false) => ExampleStatus::Partial,
        };
        Self {
            index,
            example_id,
            status,
            judgments,
            errors,
        }
    }

    pub fn judgment(&self, key: &str) -> Option<&Judgment> {
        self.judgments.iter().find(|j| j.key == key)
    }
}

/// Statistics for one judgment key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyAggregate {
    pub key: String,
    /// Mean over examples that produced a judgment for this key
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub count: usize,
    pub error_count: usize,
}

/// Results of running a dataset through a pipeline and its evaluators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub dataset_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Evaluator keys in configuration order
    pub evaluator_keys: Vec<String>,
    /// One record per example, in dataset order
    pub records: Vec<ExampleRecord>,
}

impl ExperimentReport {
    /// Per-key statistics, one entry per configured evaluator key
    pub fn aggregate(&self) -> Vec<KeyAggregate> {
        self.evaluator_keys
            .iter()
            .map(|key| {
                let scores: Vec<f64> = self
                    .records
                    .iter()
                    .filter_map(|r| r.judgment(key))
                    .map(|j| j.score)
                    .collect();
                let error_count = self
                    .records
                    .iter()
                    .flat_map(|r| &r.errors)
                    .filter(|e| e.evaluator.as_deref() == Some(key.as_str()))
                    .count();

                let count = scores.len();
                let mean = (count > 0).then(|| scores.iter().sum::<f64>() / count as f64);
                KeyAggregate {
                    key: key.clone(),
                    mean,
                    min: scores.iter().copied().reduce(f64::min),
                    max: scores.iter().copied().reduce(f64::max),
                    count,
                    error_count,
                }
            })
            .collect()
    }

    /// Mean score for `key` over the examples that produced it
    pub fn mean(&self, key: &str) -> Option<f64> {
        let scores: Vec<f64> = self
            .records
            .iter()
            .filter_map(|r| r.judgment(key))
            .map(|j| j.score)
            .collect();
        (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64)
    }

    pub fn record(&self, example_id: Uuid) -> Option<&ExampleRecord> {
        self.records.iter().find(|r| r.example_id == example_id)
    }

    pub fn count_status(&self, status: ExampleStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            dataset_name: self.dataset_name.clone(),
            total: self.records.len(),
            scored: self.count_status(ExampleStatus::Scored),
            partial: self.count_status(ExampleStatus::Partial),
            errored: self.count_status(ExampleStatus::Errored),
            duration_ms: (self.finished_at - self.started_at).num_milliseconds().max(0) as u64,
            aggregates: self.aggregate(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Summary statistics for an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub dataset_name: String,
    pub total: usize,
    pub scored: usize,
    pub partial: usize,
    pub errored: usize,
    pub duration_ms: u64,
    pub aggregates: Vec<KeyAggregate>,
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Experiment on '{}': {} examples, {} scored, {} partial, {} errored, {}ms total",
            self.dataset_name, self.total, self.scored, self.partial, self.errored, self.duration_ms
        )?;
        for agg in &self.aggregates {
            match (agg.mean, agg.min, agg.max) {
                (Some(mean), Some(min), Some(max)) => writeln!(
                    f,
                    "  {:<22} mean {:.3}  min {:.3}  max {:.3}  n={}  errors={}",
                    agg.key, mean, min, max, agg.count, agg.error_count
                )?,
                _ => writeln!(
                    f,
                    "  {:<22} no judgments  errors={}",
                    agg.key, agg.error_count
                )?,
            }
        }
        Ok(())
    }
}
