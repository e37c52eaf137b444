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

//! Graded rubric scoring on a 1-10 scale
//!
//! The judge explains itself and then rates inside a `[[n]]` marker. The
//! labeled form also shows the judge a ground truth (for RAG, the retrieved
//! context); the unlabeled form anchors the rubric on the question alone.
//!
//! Verdicts are ordinal. The only enforced rule is that `n` is an integer in
//! `[1, 10]`; with `normalize_by = N` the score is exactly `n / N`.

use super::prepare_input;
use crate::llm_client::{JudgeRequest, LLMClient};
use crate::router::FieldRouter;
use crate::{EvalError, Evaluator, EvaluatorMetadata};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use ragcheck_core::{EvaluatorInput, Example, Judgment, Requirements, RunTree};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

static RATING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[\s*(\d+)\s*\]\]").unwrap());

pub const MIN_RATING: u32 = 1;
pub const MAX_RATING: u32 = 10;

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Named rubric the judge rates against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    pub rubric: String,
}

impl Criterion {
    pub fn new(name: impl Into<String>, rubric: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rubric: rubric.into(),
        }
    }

    /// Is the answer grounded in the ground truth documents
    pub fn accuracy() -> Self {
        Self::new(
            "accuracy",
            "Is the Assistant's Answer grounded in the Ground Truth documentation? \
A score of [[1]] means the answer is not at all based upon the Ground Truth documentation. \
A score of [[3]] or [[4]] means most of the answer is unsupported. \
A score of [[5]] to [[7]] means the answer contains some information (e.g., a hallucination) \
that is not captured in the Ground Truth documentation. \
A score of [[7]] to [[9]] means the answer is mostly grounded with minor unsupported details. \
A score of [[10]] means the answer is fully based upon the Ground Truth documentation.",
        )
    }

    /// Are the retrieved documents relevant to the question
    pub fn document_relevance() -> Self {
        Self::new(
            "document_relevance",
            "The response is a set of documents retrieved from a vectorstore. \
The input is a question used for retrieval. You will score whether the \
Assistant's retrieval is relevant to the Ground Truth question. \
A score of [[1]] means that none of the Assistant's response documents contain information useful in answering or addressing the user's input. \
A score of [[5]] means that the Assistant answer contains some relevant documents that can at least partially answer the user's question or input. \
A score of [[10]] means that the user input can be fully answered using the content in the first retrieved doc.",
        )
    }

    /// Does the answer help the user with the question
    pub fn helpfulness() -> Self {
        Self::new(
            "helpfulness",
            "Is the Assistant's Answer a helpful response to the user's question? \
A score of [[1]] means the answer does not address the question at all. \
A score of [[5]] means the answer partially addresses the question or leaves important parts out. \
A score of [[10]] means the answer fully and directly addresses the question.",
        )
    }
}

/// Rubric evaluator with a `[[n]]` verdict
pub struct ScoreStringEvaluator {
    judge: Arc<dyn LLMClient>,
    key: String,
    criterion: Criterion,
    router: FieldRouter,
    requirements: Requirements,
    normalize_by: Option<f64>,
}

impl ScoreStringEvaluator {
    /// Answer vs retrieved context, keyed `hallucination`
    pub fn labeled(judge: Arc<dyn LLMClient>) -> Self {
        Self {
            judge,
            key: "hallucination".to_string(),
            criterion: Criterion::accuracy(),
            router: FieldRouter::AnswerVsContext,
            requirements: Requirements::LABELED_NO_INPUT,
            normalize_by: None,
        }
    }

    /// Retrieved context vs question, keyed `document_relevance`
    pub fn unlabeled(judge: Arc<dyn LLMClient>) -> Self {
        Self {
            judge,
            key: "document_relevance".to_string(),
            criterion: Criterion::document_relevance(),
            router: FieldRouter::ContextVsQuestion,
            requirements: Requirements::UNLABELED,
            normalize_by: None,
        }
    }

    /// Answer vs question, keyed `answer_helpfulness`
    pub fn helpfulness(judge: Arc<dyn LLMClient>) -> Self {
        Self {
            key: "answer_helpfulness".to_string(),
            criterion: Criterion::helpfulness(),
            router: FieldRouter::AnswerVsQuestion,
            ..Self::unlabeled(judge)
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_router(mut self, router: FieldRouter) -> Self {
        self.router = router;
        self
    }

    /// Divide verdicts by `divisor` (10 maps the scale onto (0, 1])
    pub fn with_normalize_by(mut self, divisor: f64) -> Self {
        self.normalize_by = Some(divisor);
        self
    }

    pub fn is_labeled(&self) -> bool {
        self.requirements.reference
    }

    fn build_prompt(&self, input: &EvaluatorInput) -> String {
        let mut prompt = format!(
            "[Instruction]\nPlease act as an impartial judge and evaluate the quality of the \
response provided by an AI assistant to the user question displayed below. \
For this evaluation, you should primarily consider the following criteria:\n{}: {}\n\
Begin your evaluation by providing a short explanation. Be as objective as possible. \
After providing your explanation, you must rate the response on a scale of {} to {} \
by strictly following this format: \"[[rating]]\", for example: \"Rating: [[5]]\".\n\n",
            self.criterion.name, self.criterion.rubric, MIN_RATING, MAX_RATING
        );

        if let Some(reference) = input.reference.as_deref().filter(|r| self.is_labeled() && !r.is_empty()) {
            prompt.push_str(&format!("[Ground truth]\n{}\n\n", reference));
        }
        prompt.push_str(&format!(
            "[Question]\n{}\n\n[The Start of Assistant's Answer]\n{}\n[The End of Assistant's Answer]",
            input.input_or_empty(),
            input.prediction
        ));
        prompt
    }
}

/// Parsed `[[n]]` verdict
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Rating {
    pub value: u32,
    pub reasoning: String,
}

/// Extract the final `[[n]]` marker from a judge reply
pub(crate) fn parse_rating(text: &str) -> Result<Rating, EvalError> {
    let captures = RATING.captures_iter(text).last().ok_or_else(|| {
        EvalError::ScoreParse(format!("no [[rating]] marker in judge reply: {:?}", text))
    })?;
    let (Some(whole), Some(digits)) = (captures.get(0), captures.get(1)) else {
        return Err(EvalError::ScoreParse(text.to_string()));
    };

    let value: u32 = digits
        .as_str()
        .parse()
        .map_err(|_| EvalError::ScoreParse(format!("rating {} is not a small integer", digits.as_str())))?;
    if !(MIN_RATING..=MAX_RATING).contains(&value) {
        return Err(EvalError::ScoreParse(format!(
            "rating {} outside [{}, {}]",
            value, MIN_RATING, MAX_RATING
        )));
    }

    let reasoning = text[..whole.start()]
        .trim_end()
        .trim_end_matches("Rating:")
        .trim()
        .to_string();
    Ok(Rating { value, reasoning })
}

/// Map a verdict onto the reported scale
pub(crate) fn normalize(value: u32, normalize_by: Option<f64>) -> f64 {
    match normalize_by {
        Some(divisor) => f64::from(value) / divisor,
        None => f64::from(value),
    }
}

#[async_trait]
impl Evaluator for ScoreStringEvaluator {
    fn key(&self) -> &str {
        &self.key
    }

    async fn evaluate(&self, run: &RunTree, example: &Example) -> Result<Judgment, EvalError> {
        if let Some(divisor) = self.normalize_by {
            if !(divisor.is_finite() && divisor > 0.0) {
                return Err(EvalError::InvalidInput(format!(
                    "normalize_by must be a positive number, got {}",
                    divisor
                )));
            }
        }

        let input = prepare_input(&self.router, self.requirements, run, example)?;
        let request = JudgeRequest::text(self.build_prompt(&input)).with_system(SYSTEM_PROMPT);
        let response = self.judge.complete(request).await?;

        let text = response.output.as_text().ok_or_else(|| {
            EvalError::ScoreParse(format!(
                "expected a free text verdict, got a {} reply",
                response.output.arm()
            ))
        })?;
        let rating = parse_rating(text)?;

        Ok(
            Judgment::new(&self.key, normalize(rating.value, self.normalize_by))
                .with_raw_score(f64::from(rating.value))
                .with_reasoning(rating.reasoning),
        )
    }

    fn metadata(&self) -> EvaluatorMetadata {
        let (name, form) = if self.is_labeled() {
            ("Labeled Score String", "against a ground truth")
        } else {
            ("Score String", "against the question")
        };
        EvaluatorMetadata {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: format!(
                "Rates the response {} on the '{}' rubric, {}-{} scale.",
                form, self.criterion.name, MIN_RATING, MAX_RATING
            ),
            requires_reference: self.is_labeled(),
            tags: vec![
                self.criterion.name.clone(),
                "llm-as-judge".to_string(),
                "graded".to_string(),
            ],
        }
    }
}
