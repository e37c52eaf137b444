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

//! Ragcheck Core
//!
//! Data model shared by the evaluation harness: labeled datasets, recorded
//! pipeline runs, evaluator inputs and judgments.

pub mod config;
pub mod dataset;
pub mod error;
pub mod eval_input;
pub mod judgment;
pub mod run;

pub use config::{ExecutionConfig, HarnessConfig, JudgeConfig, PipelineConfig};
pub use dataset::{Dataset, Example, ExampleInputs, ExampleOutputs};
pub use error::{RagcheckError, Result};
pub use eval_input::{EvaluatorInput, InputField, Requirements};
pub use judgment::Judgment;
pub use run::{
    Document, RunId, RunInputs, RunNode, RunOutputs, RunRecord, RunTree, TraceLookupError,
    GET_ANSWER_RUN, RETRIEVE_DOCS_RUN,
};
