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

use serde::{Deserialize, Serialize};

/// One evaluator's verdict on one example
///
/// The key is stable for a given evaluator across an experiment so that
/// judgments can be aggregated per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub key: String,

    /// Normalized score, or the evaluator's native scale when no divisor is set
    pub score: f64,

    /// Verdict as emitted by the judge, before normalization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_score: Option<f64>,

    /// Judge rationale, when one was elicited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Judgment {
    pub fn new(key: impl Into<String>, score: f64) -> Self {
        Self {
            key: key.into(),
            score,
            raw_score: None,
            reasoning: None,
        }
    }

    pub fn with_raw_score(mut self, raw: f64) -> Self {
        self.raw_score = Some(raw);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        let reasoning = reasoning.into();
        if !reasoning.trim().is_empty() {
            self.reasoning = Some(reasoning);
        }
        self
    }
}
