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

//! Ragcheck CLI
//!
//! Builds labeled datasets and evaluates recorded pipeline runs against them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ragcheck_core::{Dataset, ExampleInputs, ExampleOutputs, HarnessConfig};
use ragcheck_evals::llm_client::OpenAIClient;
use ragcheck_evals::pipeline::RecordedRun;
use ragcheck_evals::{EvalBuilder, EvalPreset, ExampleStatus, RecordedPipeline};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "ragcheck")]
#[command(about = "Ragcheck - evaluation harness for RAG pipelines", long_about = None)]
struct Cli {
    /// Verbose mode
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dataset commands
    Dataset {
        #[command(subcommand)]
        command: DatasetCommands,
    },

    /// Evaluate recorded runs against a dataset
    Evaluate {
        /// Harness configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dataset file produced by `dataset build`
        #[arg(short, long)]
        dataset: PathBuf,

        /// Recorded runs: a JSON list of {example_id, run}
        #[arg(short, long)]
        runs: PathBuf,

        /// Evaluator preset (reference, graded, trace, full)
        #[arg(short, long, default_value = "full")]
        preset: String,

        /// Override the maximum number of in-flight judge calls
        #[arg(long)]
        rate_limit: Option<usize>,

        /// Write the full report here as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Exit with an error when any example has no judgment
        #[arg(long)]
        fail_on_errors: bool,
    },
}

#[derive(Subcommand)]
enum DatasetCommands {
    /// Pair a questions file with an answers file, one entry per line
    Build {
        /// Questions, one per line
        #[arg(long)]
        questions: PathBuf,

        /// Reference answers, one per line, same order as the questions
        #[arg(long)]
        answers: PathBuf,

        /// Dataset name
        #[arg(short, long)]
        name: String,

        /// Optional description
        #[arg(long)]
        description: Option<String>,

        /// Output path for the dataset JSON
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Dataset {
            command:
                DatasetCommands::Build {
                    questions,
                    answers,
                    name,
                    description,
                    output,
                },
        } => {
            let dataset = build_dataset(&questions, &answers, &name, description)?;
            write_file(&output, &serde_json::to_string_pretty(&dataset)?)?;
            info!(dataset = %dataset.name, examples = dataset.len(), "dataset written");
            println!(
                "✓ Built dataset '{}' with {} examples at {}",
                dataset.name,
                dataset.len(),
                output.display()
            );
        }

        Commands::Evaluate {
            config,
            dataset,
            runs,
            preset,
            rate_limit,
            output,
            fail_on_errors,
        } => {
            let mut config = HarnessConfig::load(config).context("Failed to load configuration")?;
            if let Some(limit) = rate_limit {
                config.execution.rate_limit = limit;
                config.validate()?;
            }
            let preset: EvalPreset = preset.parse()?;

            let dataset: Dataset = read_json(&dataset).context("Failed to read dataset")?;
            let runs: Vec<RecordedRun> = read_json(&runs).context("Failed to read recorded runs")?;
            let pipeline = RecordedPipeline::from_runs(runs);
            if pipeline.len() < dataset.len() {
                warn!(
                    recorded = pipeline.len(),
                    examples = dataset.len(),
                    "some examples have no recorded run"
                );
            }

            if config.judge.api_key.is_none() {
                warn!(endpoint = %config.judge.endpoint, "no judge API key configured");
            }
            let judge = Arc::new(OpenAIClient::from_config(&config.judge));

            let runner = EvalBuilder::new()
                .with_preset(preset, judge)
                .with_execution(&config.execution)
                .build()?;
            info!(preset = %preset, model = %config.judge.model, "evaluating");

            let report = runner.run(&pipeline, &dataset).await;

            if let Some(path) = &output {
                write_file(path, &report.to_json()?)?;
                println!("✓ Report written to {}", path.display());
            }
            print!("{}", report.summary());

            let errored = report.count_status(ExampleStatus::Errored);
            if fail_on_errors && errored > 0 {
                anyhow::bail!("{} of {} examples errored", errored, report.records.len());
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

/// Trimmed lines of a file, trailing blank lines dropped.
///
/// Interior blank lines are kept so that line N of the questions file stays
/// paired with line N of the answers file.
fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut lines: Vec<String> = content.lines().map(|l| l.trim().to_string()).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    Ok(lines)
}

fn build_dataset(
    questions: &Path,
    answers: &Path,
    name: &str,
    description: Option<String>,
) -> Result<Dataset> {
    let questions = read_lines(questions)?;
    if let Some(line) = questions.iter().position(|q| q.is_empty()) {
        anyhow::bail!("blank question on line {}", line + 1);
    }
    let inputs = questions.into_iter().map(ExampleInputs::new).collect();

    // A blank answer line is an unlabeled example
    let outputs = read_lines(answers)?
        .into_iter()
        .map(|answer| {
            if answer.is_empty() {
                ExampleOutputs::default()
            } else {
                ExampleOutputs::new(answer)
            }
        })
        .collect();

    let dataset = Dataset::from_pairs(name, inputs, outputs)?;
    Ok(match description {
        Some(description) => dataset.with_description(description),
        None => dataset,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_dataset_pairs_lines() {
        let mut questions = tempfile::NamedTempFile::new().unwrap();
        writeln!(questions, "What is LCEL?\nHow do I stream?\n\n").unwrap();
        let mut answers = tempfile::NamedTempFile::new().unwrap();
        writeln!(answers, "  A composition syntax.\nUse .stream().").unwrap();

        let dataset =
            build_dataset(questions.path(), answers.path(), "docs-qa", Some("smoke".into()))
                .unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.description, "smoke");
        assert_eq!(
            dataset.examples()[0].outputs.answer.as_deref(),
            Some("A composition syntax.")
        );
    }

    #[test]
    fn test_build_dataset_length_mismatch() {
        let mut questions = tempfile::NamedTempFile::new().unwrap();
        writeln!(questions, "one\ntwo").unwrap();
        let mut answers = tempfile::NamedTempFile::new().unwrap();
        writeln!(answers, "only one").unwrap();

        assert!(build_dataset(questions.path(), answers.path(), "bad", None).is_err());
    }

    #[test]
    fn test_blank_answer_keeps_pairing() {
        let mut questions = tempfile::NamedTempFile::new().unwrap();
        writeln!(questions, "Q1\nQ2\nQ3").unwrap();
        let mut answers = tempfile::NamedTempFile::new().unwrap();
        writeln!(answers, "A1\n\nA3\n").unwrap();

        let dataset = build_dataset(questions.path(), answers.path(), "gaps", None).unwrap();
        let pairs: Vec<_> = dataset
            .iter()
            .map(|e| (e.inputs.question.as_str(), e.outputs.answer.as_deref()))
            .collect();
        assert_eq!(
            pairs,
            vec![("Q1", Some("A1")), ("Q2", None), ("Q3", Some("A3"))]
        );
    }

    #[test]
    fn test_blank_question_is_rejected() {
        let mut questions = tempfile::NamedTempFile::new().unwrap();
        writeln!(questions, "Q1\n\nQ3").unwrap();
        let mut answers = tempfile::NamedTempFile::new().unwrap();
        writeln!(answers, "A1\nA2\n").unwrap();

        let err = build_dataset(questions.path(), answers.path(), "gaps", None).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
