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

//! Field routing from (run, example) to the evaluator triple
//!
//! Every string evaluator owns a [`FieldRouter`]. The router decides where
//! `prediction`, `reference` and `input` come from, so the pipeline never has
//! to know which evaluators consume its outputs.
//!
//! | router              | prediction        | reference          | input            |
//! |---------------------|-------------------|--------------------|------------------|
//! | `ReferenceAnswer`   | run answer        | example answer     | example question |
//! | `AnswerVsContext`   | run answer        | joined run context | example question |
//! | `ContextVsQuestion` | joined run context| -                  | example question |
//! | `AnswerVsQuestion`  | run answer        | -                  | example question |

use crate::EvalError;
use ragcheck_core::{EvaluatorInput, Example, InputField, RunTree};
use std::fmt;
use std::sync::Arc;

/// User-supplied routing function
pub type RouterFn =
    Arc<dyn Fn(&RunTree, &Example) -> Result<EvaluatorInput, EvalError> + Send + Sync>;

/// How an evaluator assembles its input triple
#[derive(Clone)]
pub enum FieldRouter {
    ReferenceAnswer,
    AnswerVsContext,
    ContextVsQuestion,
    AnswerVsQuestion,
    Custom { name: String, route: RouterFn },
}

impl FieldRouter {
    pub fn custom<F>(name: impl Into<String>, route: F) -> Self
    where
        F: Fn(&RunTree, &Example) -> Result<EvaluatorInput, EvalError> + Send + Sync + 'static,
    {
        FieldRouter::Custom {
            name: name.into(),
            route: Arc::new(route),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FieldRouter::ReferenceAnswer => "reference_answer",
            FieldRouter::AnswerVsContext => "answer_vs_context",
            FieldRouter::ContextVsQuestion => "context_vs_question",
            FieldRouter::AnswerVsQuestion => "answer_vs_question",
            FieldRouter::Custom { name, .. } => name,
        }
    }

    /// Build the triple from the root run's outputs and the example.
    ///
    /// Fields this router is responsible for must be present; an absent one
    /// fails with `MissingField` naming where it was expected.
    pub fn route(&self, run: &RunTree, example: &Example) -> Result<EvaluatorInput, EvalError> {
        let outputs = &run.root().outputs;

        let answer = || {
            outputs
                .answer
                .clone()
                .ok_or_else(|| EvalError::missing(InputField::Prediction, "run.outputs.answer"))
        };
        let question = example.inputs.question.clone();

        match self {
            FieldRouter::ReferenceAnswer => {
                let reference = example.outputs.answer.clone().ok_or_else(|| {
                    EvalError::missing(InputField::Reference, "example.outputs.answer")
                })?;
                Ok(EvaluatorInput::new(answer()?)
                    .with_reference(reference)
                    .with_input(question))
            }
            FieldRouter::AnswerVsContext => {
                let prediction = answer()?;
                let contexts = outputs.joined_contexts().ok_or_else(|| {
                    EvalError::missing(InputField::Reference, "run.outputs.contexts")
                })?;
                Ok(EvaluatorInput::new(prediction)
                    .with_reference(contexts)
                    .with_input(question))
            }
            FieldRouter::ContextVsQuestion => {
                let contexts = outputs.joined_contexts().ok_or_else(|| {
                    EvalError::missing(InputField::Prediction, "run.outputs.contexts")
                })?;
                Ok(EvaluatorInput::new(contexts).with_input(question))
            }
            FieldRouter::AnswerVsQuestion => Ok(EvaluatorInput::new(answer()?).with_input(question)),
            FieldRouter::Custom { route, .. } => route(run, example),
        }
    }
}

impl fmt::Debug for FieldRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRouter::Custom { name, .. } => {
                f.debug_struct("Custom").field("name", name).finish_non_exhaustive()
            }
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragcheck_core::{Document, ExampleInputs, ExampleOutputs, RunInputs, RunOutputs};

    const QUESTION: &str = "How can I make the output of my chain a string?";

    fn example() -> Example {
        Example::new(
            ExampleInputs::new(QUESTION),
            ExampleOutputs::new("Use an output parser."),
        )
    }

    fn run(answer: Option<&str>, contexts: Option<Vec<&str>>) -> RunTree {
        let mut tree = RunTree::new("get_answer", RunInputs::question(QUESTION));
        let root = tree.root_id();
        tree.set_outputs(
            root,
            RunOutputs {
                answer: answer.map(str::to_string),
                contexts: contexts.map(|docs| docs.into_iter().map(Document::new).collect()),
            },
        );
        tree
    }

    #[test]
    fn test_reference_answer_copies_fields() {
        let tree = run(Some("Use StrOutputParser."), None);
        let input = FieldRouter::ReferenceAnswer.route(&tree, &example()).unwrap();

        assert_eq!(input.prediction, "Use StrOutputParser.");
        assert_eq!(input.reference.as_deref(), Some("Use an output parser."));
        assert_eq!(input.input.as_deref(), Some(QUESTION));
    }

    #[test]
    fn test_answer_vs_context_joins_documents() {
        let tree = run(Some("answer"), Some(vec!["first doc", "second doc"]));
        let input = FieldRouter::AnswerVsContext.route(&tree, &example()).unwrap();

        assert_eq!(input.prediction, "answer");
        assert_eq!(input.reference.as_deref(), Some("first doc\n\nsecond doc"));
    }

    #[test]
    fn test_context_vs_question_leaves_reference_unset() {
        let tree = run(Some("answer"), Some(vec!["doc"]));
        let input = FieldRouter::ContextVsQuestion.route(&tree, &example()).unwrap();

        assert_eq!(input.prediction, "doc");
        assert_eq!(input.reference, None);
        assert_eq!(input.input.as_deref(), Some(QUESTION));
    }

    #[test]
    fn test_missing_contexts_fail() {
        let tree = run(Some("answer"), None);
        let err = FieldRouter::AnswerVsContext.route(&tree, &example()).unwrap_err();
        assert!(matches!(err, EvalError::MissingField(ref m) if m.contains("run.outputs.contexts")));

        let err = FieldRouter::ContextVsQuestion.route(&tree, &example()).unwrap_err();
        assert!(matches!(err, EvalError::MissingField(_)));
    }

    #[test]
    fn test_missing_reference_fails() {
        let unlabeled = Example::new(ExampleInputs::new(QUESTION), ExampleOutputs::default());
        let tree = run(Some("answer"), None);
        let err = FieldRouter::ReferenceAnswer.route(&tree, &unlabeled).unwrap_err();
        assert!(
            matches!(err, EvalError::MissingField(ref m) if m.contains("example.outputs.answer"))
        );
    }

    #[test]
    fn test_custom_router() {
        let router = FieldRouter::custom("question_echo", |_run, example| {
            Ok(EvaluatorInput::new(example.inputs.question.clone()))
        });
        let input = router.route(&run(None, None), &example()).unwrap();

        assert_eq!(input.prediction, QUESTION);
        assert_eq!(router.name(), "question_echo");
        assert!(format!("{:?}", router).contains("question_echo"));
    }
}
