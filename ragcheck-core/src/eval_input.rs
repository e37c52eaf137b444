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
use std::fmt;

/// Canonical triple consumed by string evaluators
///
/// Built fresh for every (run, example) pair and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorInput {
    pub prediction: String,
    pub reference: Option<String>,
    pub input: Option<String>,
}

/// Fields of an [`EvaluatorInput`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputField {
    Prediction,
    Reference,
    Input,
}

impl InputField {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputField::Prediction => "prediction",
            InputField::Reference => "reference",
            InputField::Input => "input",
        }
    }
}

impl fmt::Display for InputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability set of an evaluator variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Requirements {
    pub reference: bool,
    pub input: bool,
}

impl Requirements {
    pub const LABELED: Self = Self {
        reference: true,
        input: true,
    };
    pub const LABELED_NO_INPUT: Self = Self {
        reference: true,
        input: false,
    };
    pub const UNLABELED: Self = Self {
        reference: false,
        input: true,
    };
}

impl EvaluatorInput {
    pub fn new(prediction: impl Into<String>) -> Self {
        Self {
            prediction: prediction.into(),
            reference: None,
            input: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Check the triple against an evaluator's requirements.
    ///
    /// Returns the first missing field. Blank strings count as missing so an
    /// empty value never reaches a judge prompt.
    pub fn check(&self, requirements: Requirements) -> Result<(), InputField> {
        if is_blank(Some(&self.prediction)) {
            return Err(InputField::Prediction);
        }
        if requirements.reference && is_blank(self.reference.as_ref()) {
            return Err(InputField::Reference);
        }
        if requirements.input && is_blank(self.input.as_ref()) {
            return Err(InputField::Input);
        }
        Ok(())
    }

    pub fn reference_or_empty(&self) -> &str {
        self.reference.as_deref().unwrap_or_default()
    }

    pub fn input_or_empty(&self) -> &str {
        self.input.as_deref().unwrap_or_default()
    }
}

fn is_blank(value: Option<&String>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}
