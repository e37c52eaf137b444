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

//! Reference-answer correctness using LLM-as-judge
//!
//! The judge sees the question, the reference answer and the pipeline's
//! answer, and must close its reply with `GRADE: CORRECT` or
//! `GRADE: INCORRECT`. The chain-of-thought variant asks for step by step
//! reasoning first, which is kept on the judgment.

use super::prepare_input;
use crate::llm_client::{JudgeRequest, LLMClient};
use crate::router::FieldRouter;
use crate::{EvalError, Evaluator, EvaluatorMetadata};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use ragcheck_core::{Example, Judgment, Requirements, RunTree};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

static GRADE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)grade:\s*(correct|incorrect)\b").unwrap());
static BARE_GRADE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\W*(correct|incorrect)\b").unwrap());
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(question|reference|prediction)\}").unwrap());

const QA_PROMPT: &str = r#"You are a teacher grading a quiz.
You are given a question, the student's answer, and the true answer, and are asked to score the student answer as either CORRECT or INCORRECT.

Example Format:
QUESTION: question here
STUDENT ANSWER: student's answer here
TRUE ANSWER: true answer here
GRADE: CORRECT or INCORRECT here

Grade the student answers based ONLY on their factual accuracy. Ignore differences in punctuation and phrasing between the student answer and true answer. It is OK if the student answer contains more information than the true answer, as long as it does not contain any conflicting statements.

QUESTION: {question}
STUDENT ANSWER: {prediction}
TRUE ANSWER: {reference}
GRADE:"#;

const COT_QA_PROMPT: &str = r#"You are a teacher grading a quiz.
You are given a question, the true answer, and the student's answer, and are asked to score the student answer as either CORRECT or INCORRECT.
Write out in a step by step manner your reasoning to be sure that your conclusion is correct. Avoid simply stating the correct answer at the outset.

Example Format:
QUESTION: question here
TRUE ANSWER: true answer here
STUDENT ANSWER: student's answer here
EXPLANATION: step by step reasoning here
GRADE: CORRECT or INCORRECT here

Grade the student answers based ONLY on their factual accuracy. Ignore differences in punctuation and phrasing between the student answer and true answer. It is OK if the student answer contains more information than the true answer, as long as it does not contain any conflicting statements.

QUESTION: {question}
TRUE ANSWER: {reference}
STUDENT ANSWER: {prediction}
EXPLANATION:"#;

/// Which judging template to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaVariant {
    /// Direct verdict
    Qa,
    /// Reasoning before the verdict
    #[default]
    CotQa,
}

/// Correctness of the answer against the example's reference answer
pub struct QaEvaluator {
    judge: Arc<dyn LLMClient>,
    variant: QaVariant,
    router: FieldRouter,
    key: String,
}

impl QaEvaluator {
    pub fn new(judge: Arc<dyn LLMClient>, variant: QaVariant) -> Self {
        Self {
            judge,
            variant,
            router: FieldRouter::ReferenceAnswer,
            key: "correctness".to_string(),
        }
    }

    pub fn with_router(mut self, router: FieldRouter) -> Self {
        self.router = router;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn variant(&self) -> QaVariant {
        self.variant
    }

    fn build_prompt(&self, question: &str, reference: &str, prediction: &str) -> String {
        let template = match self.variant {
            QaVariant::Qa => QA_PROMPT,
            QaVariant::CotQa => COT_QA_PROMPT,
        };
        // One pass, so braces inside the filled-in values are left alone
        PLACEHOLDER
            .replace_all(template, |caps: &regex::Captures<'_>| match &caps[1] {
                "question" => question,
                "reference" => reference,
                _ => prediction,
            })
            .into_owned()
    }
}

/// Parsed `GRADE:` verdict
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Grade {
    pub correct: bool,
    pub reasoning: String,
}

/// Extract the final grade from a judge reply.
///
/// The last `GRADE:` line wins. For the direct variant a reply that starts
/// with a bare verdict is accepted too, since its template ends on `GRADE:`.
pub(crate) fn parse_grade(text: &str, variant: QaVariant) -> Result<Grade, EvalError> {
    if let Some(captures) = GRADE_LINE.captures_iter(text).last() {
        let (Some(whole), Some(verdict)) = (captures.get(0), captures.get(1)) else {
            return Err(EvalError::ScoreParse(text.to_string()));
        };
        return Ok(Grade {
            correct: verdict.as_str().eq_ignore_ascii_case("correct"),
            reasoning: text[..whole.start()].trim().to_string(),
        });
    }

    let bare = match variant {
        QaVariant::Qa => BARE_GRADE.captures(text).and_then(|c| c.get(1)),
        QaVariant::CotQa => None,
    };
    if let Some(verdict) = bare {
        return Ok(Grade {
            correct: verdict.as_str().eq_ignore_ascii_case("correct"),
            reasoning: text[verdict.end()..].trim().to_string(),
        });
    }

    Err(EvalError::ScoreParse(format!(
        "no CORRECT/INCORRECT grade in judge reply: {:?}",
        text
    )))
}

#[async_trait]
impl Evaluator for QaEvaluator {
    fn key(&self) -> &str {
        &self.key
    }

    async fn evaluate(&self, run: &RunTree, example: &Example) -> Result<Judgment, EvalError> {
        let input = prepare_input(&self.router, Requirements::LABELED, run, example)?;

        let prompt = self.build_prompt(
            input.input_or_empty(),
            input.reference_or_empty(),
            &input.prediction,
        );
        let response = self.judge.complete(JudgeRequest::text(prompt)).await?;

        let text = response.output.as_text().ok_or_else(|| {
            EvalError::ScoreParse(format!(
                "expected a free text verdict, got a {} reply",
                response.output.arm()
            ))
        })?;
        let grade = parse_grade(text, self.variant)?;

        let score = if grade.correct { 1.0 } else { 0.0 };
        let judgment = Judgment::new(&self.key, score).with_raw_score(score);
        Ok(match self.variant {
            QaVariant::CotQa => judgment.with_reasoning(grade.reasoning),
            QaVariant::Qa => judgment,
        })
    }

    fn metadata(&self) -> EvaluatorMetadata {
        let name = match self.variant {
            QaVariant::Qa => "Reference QA",
            QaVariant::CotQa => "Chain-of-Thought Reference QA",
        };
        EvaluatorMetadata {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: "Grades the answer CORRECT or INCORRECT against the reference answer."
                .to_string(),
            requires_reference: true,
            tags: vec![
                "correctness".to_string(),
                "llm-as-judge".to_string(),
                "reference".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLLMClient;
    use ragcheck_core::{ExampleInputs, ExampleOutputs, RunInputs, RunOutputs};

    fn fixture() -> (RunTree, Example) {
        let question = "How can I make the output of my chain a string?";
        let mut run = RunTree::new("get_answer", RunInputs::question(question));
        let root = run.root_id();
        run.set_outputs(
            root,
            RunOutputs {
                answer: Some("Use an output parser.".to_string()),
                contexts: None,
            },
        );
        let example = Example::new(
            ExampleInputs::new(question),
            ExampleOutputs::new("Use an output parser."),
        );
        (run, example)
    }

    #[test]
    fn test_parse_grade_variants() {
        use QaVariant::{CotQa, Qa};
        assert!(parse_grade("GRADE: CORRECT", Qa).unwrap().correct);
        assert!(!parse_grade("grade: incorrect", CotQa).unwrap().correct);
        assert!(parse_grade(" CORRECT", Qa).unwrap().correct);
        assert!(!parse_grade("INCORRECT, the answer conflicts", Qa).unwrap().correct);

        let cot = parse_grade("The student names the parser.\nGRADE: CORRECT", CotQa).unwrap();
        assert!(cot.correct);
        assert_eq!(cot.reasoning, "The student names the parser.");

        assert!(matches!(
            parse_grade("Looks fine to me", Qa),
            Err(EvalError::ScoreParse(_))
        ));
    }

    #[test]
    fn test_bare_verdict_only_for_direct_variant() {
        let reply = "CORRECT. Both name an output parser.";
        assert!(parse_grade(reply, QaVariant::Qa).unwrap().correct);
        assert!(matches!(
            parse_grade(reply, QaVariant::CotQa),
            Err(EvalError::ScoreParse(_))
        ));
    }

    #[test]
    fn test_last_grade_wins() {
        let text = "Format is GRADE: CORRECT or INCORRECT.\nGRADE: INCORRECT";
        assert!(!parse_grade(text, QaVariant::CotQa).unwrap().correct);
    }

    #[test]
    fn test_prompt_placeholders_filled_once() {
        let evaluator = QaEvaluator::new(Arc::new(ScriptedLLMClient::new()), QaVariant::Qa);
        let prompt = evaluator.build_prompt(
            "What does {reference} expand to?",
            "Nothing, {prediction} stays literal.",
            "A {question} placeholder.",
        );
        assert!(prompt.contains("QUESTION: What does {reference} expand to?"));
        assert!(prompt.contains("TRUE ANSWER: Nothing, {prediction} stays literal."));
        assert!(prompt.contains("STUDENT ANSWER: A {question} placeholder."));
    }

    #[tokio::test]
    async fn test_correct_answer_scores_one() {
        let judge = Arc::new(
            ScriptedLLMClient::new().with_text("Both mention an output parser.\nGRADE: CORRECT"),
        );
        let evaluator = QaEvaluator::new(judge.clone(), QaVariant::CotQa);
        let (run, example) = fixture();

        let judgment = evaluator.evaluate(&run, &example).await.unwrap();
        assert_eq!(judgment.key, "correctness");
        assert_eq!(judgment.score, 1.0);
        assert_eq!(
            judgment.reasoning.as_deref(),
            Some("Both mention an output parser.")
        );

        let prompt = &judge.requests()[0].prompt;
        assert!(prompt.contains("TRUE ANSWER: Use an output parser."));
        assert!(prompt.contains("EXPLANATION:"));
    }

    #[tokio::test]
    async fn test_structured_reply_is_parse_error() {
        let judge = Arc::new(
            ScriptedLLMClient::new().with_structured(serde_json::json!({ "grade": "CORRECT" })),
        );
        let evaluator = QaEvaluator::new(judge, QaVariant::Qa);
        let (run, example) = fixture();

        let err = evaluator.evaluate(&run, &example).await.unwrap_err();
        assert!(matches!(err, EvalError::ScoreParse(_)));
    }

    #[tokio::test]
    async fn test_missing_reference_skips_judge() {
        let judge = Arc::new(ScriptedLLMClient::new().with_text("GRADE: CORRECT"));
        let evaluator = QaEvaluator::new(judge.clone(), QaVariant::Qa);
        let (run, _) = fixture();
        let unlabeled = Example::new(ExampleInputs::new("q"), ExampleOutputs::default());

        let err = evaluator.evaluate(&run, &unlabeled).await.unwrap_err();
        assert!(matches!(err, EvalError::MissingField(_)));
        assert_eq!(judge.call_count(), 0);
    }
}
