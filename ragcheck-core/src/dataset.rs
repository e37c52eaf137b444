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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{RagcheckError, Result};

/// Inputs of a labeled example
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExampleInputs {
    pub question: String,
}

impl ExampleInputs {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
        }
    }
}

/// Reference outputs of a labeled example
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExampleOutputs {
    /// Reference answer. Absent for examples used only by unlabeled evaluators.
    #[serde(default)]
    pub answer: Option<String>,
}

impl ExampleOutputs {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: Some(answer.into()),
        }
    }
}

/// A labeled question/answer pair within a dataset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Example {
    /// Unique identifier for the example
    pub id: Uuid,

    pub inputs: ExampleInputs,

    #[serde(default)]
    pub outputs: ExampleOutputs,

    /// Additional metadata (source, tags, etc.)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Example {
    /// Create an example with a fresh id
    pub fn new(inputs: ExampleInputs, outputs: ExampleOutputs) -> Self {
        Self {
            id: Uuid::new_v4(),
            inputs,
            outputs,
            metadata: HashMap::new(),
        }
    }

    /// Add metadata to the example
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A named, ordered collection of labeled examples
///
/// Order is irrelevant for scoring and only kept so reports are reproducible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    pub id: Uuid,

    /// Human-readable name
    pub name: String,

    #[serde(default)]
    pub description: String,

    examples: Vec<Example>,

    pub created_at: DateTime<Utc>,
}

impl Dataset {
    /// Create an empty dataset
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            examples: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Pair up question inputs with reference outputs.
    ///
    /// Fails when the two sequences differ in length; nothing is paired
    /// positionally past the shorter one.
    pub fn from_pairs(
        name: impl Into<String>,
        inputs: Vec<ExampleInputs>,
        outputs: Vec<ExampleOutputs>,
    ) -> Result<Self> {
        if inputs.len() != outputs.len() {
            return Err(RagcheckError::DatasetLengthMismatch {
                inputs: inputs.len(),
                outputs: outputs.len(),
            });
        }

        let mut dataset = Self::new(name);
        dataset.examples = inputs
            .into_iter()
            .zip(outputs)
            .map(|(inputs, outputs)| Example::new(inputs, outputs))
            .collect();
        Ok(dataset)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn add_example(&mut self, example: Example) {
        self.examples.push(example);
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn iter(&self) -> impl Iterator<Item = &Example> {
        self.examples.iter()
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Find an example by ID
    pub fn find_example(&self, id: Uuid) -> Option<&Example> {
        self.examples.iter().find(|ex| ex.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_keeps_order() {
        let dataset = Dataset::from_pairs(
            "langchain-docs",
            vec![
                ExampleInputs::new("How can I make the output of my chain a string?"),
                ExampleInputs::new("What is a retriever?"),
            ],
            vec![
                ExampleOutputs::new("Use an output parser."),
                ExampleOutputs::new("An interface that returns documents for a query."),
            ],
        )
        .unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(
            dataset.examples()[0].outputs.answer.as_deref(),
            Some("Use an output parser.")
        );
        assert_eq!(dataset.examples()[1].inputs.question, "What is a retriever?");
        assert_ne!(dataset.examples()[0].id, dataset.examples()[1].id);
    }

    #[test]
    fn test_from_pairs_length_mismatch() {
        let err = Dataset::from_pairs(
            "broken",
            vec![ExampleInputs::new("q1"), ExampleInputs::new("q2")],
            vec![ExampleOutputs::new("a1")],
        )
        .unwrap_err();

        assert!(matches!(
            err,
            RagcheckError::DatasetLengthMismatch {
                inputs: 2,
                outputs: 1
            }
        ));
    }

    #[test]
    fn test_find_example() {
        let mut dataset = Dataset::new("lookup");
        let example = Example::new(ExampleInputs::new("q"), ExampleOutputs::default())
            .with_metadata("source", "manual");
        let id = example.id;
        dataset.add_example(example);

        let found = dataset.find_example(id).unwrap();
        assert_eq!(found.metadata.get("source").map(String::as_str), Some("manual"));
        assert!(found.outputs.answer.is_none());
        assert!(dataset.find_example(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_outputs_default_when_absent_in_json() {
        let json = format!(
            r#"{{"id":"{}","inputs":{{"question":"q"}}}}"#,
            Uuid::new_v4()
        );
        let example: Example = serde_json::from_str(&json).unwrap();
        assert!(example.outputs.answer.is_none());
    }
}
