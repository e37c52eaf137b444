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

//! Built-in evaluators for the four RAG axes

pub mod qa;
pub mod score_string;
pub mod trace_graders;

pub use qa::{QaEvaluator, QaVariant};
pub use score_string::{Criterion, ScoreStringEvaluator};
pub use trace_graders::{DocumentRelevanceGrader, HallucinationGrader};

use crate::router::FieldRouter;
use crate::EvalError;
use ragcheck_core::{EvaluatorInput, Example, Requirements, RunTree};

/// Route and validate the triple for a string evaluator
pub(crate) fn prepare_input(
    router: &FieldRouter,
    requirements: Requirements,
    run: &RunTree,
    example: &Example,
) -> Result<EvaluatorInput, EvalError> {
    let input = router.route(run, example)?;
    input
        .check(requirements)
        .map_err(|field| EvalError::missing(field, &format!("router {}", router.name())))?;
    Ok(input)
}
