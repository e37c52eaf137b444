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

//! Harness configuration
//!
//! Endpoint, credentials and execution limits are carried explicitly in a
//! [`HarnessConfig`] that is handed to the runner and the clients. Only the
//! loader functions here look at the process environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RagcheckError, Result};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub judge: JudgeConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JudgeConfig {
    /// Base URL of an OpenAI-compatible API (e.g., "https://api.openai.com/v1")
    #[serde(default = "default_judge_endpoint")]
    pub endpoint: String,

    /// Judge model name
    #[serde(default = "default_judge_model")]
    pub model: String,

    /// API key; falls back to RAGCHECK_JUDGE_API_KEY / OPENAI_API_KEY when loading
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Maximum number of in-flight external calls (pipeline and judge)
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,

    /// Timeout per external call in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Cache judge responses for identical requests
    #[serde(default = "default_enable_cache")]
    pub enable_cache: bool,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Number of documents to retrieve per question
    #[serde(default = "default_k")]
    pub k: usize,

    /// Whether `get_answer` exposes retrieved documents in its outputs
    #[serde(default = "default_return_contexts")]
    pub return_contexts: bool,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_judge_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_judge_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_rate_limit() -> usize {
    8
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_enable_cache() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_k() -> usize {
    4
}

fn default_return_contexts() -> bool {
    true
}

fn default_system_prompt() -> String {
    "You are a helpful assistant answering questions about the provided documentation. \
     Use only the retrieved context to answer. If you don't know the answer, say that you don't know."
        .to_string()
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_judge_endpoint(),
            model: default_judge_model(),
            api_key: None,
            temperature: 0.0,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            rate_limit: default_rate_limit(),
            timeout_secs: default_timeout_secs(),
            enable_cache: default_enable_cache(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            return_contexts: default_return_contexts(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment overrides on top of `self`
    ///
    /// Supported environment variables:
    /// - RAGCHECK_JUDGE_ENDPOINT: judge base URL
    /// - RAGCHECK_JUDGE_MODEL: judge model name
    /// - RAGCHECK_JUDGE_API_KEY, then OPENAI_API_KEY: judge API key (only if unset)
    /// - RAGCHECK_RATE_LIMIT: max in-flight external calls
    /// - RAGCHECK_TIMEOUT_SECS: per-call timeout
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`; unparsable numbers are rejected
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("RAGCHECK_JUDGE_ENDPOINT") {
            self.judge.endpoint = endpoint;
        }

        if let Some(model) = lookup("RAGCHECK_JUDGE_MODEL") {
            self.judge.model = model;
        }

        if self.judge.api_key.is_none() {
            self.judge.api_key =
                lookup("RAGCHECK_JUDGE_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(limit) = lookup("RAGCHECK_RATE_LIMIT") {
            self.execution.rate_limit = parse_override("RAGCHECK_RATE_LIMIT", &limit)?;
        }

        if let Some(timeout) = lookup("RAGCHECK_TIMEOUT_SECS") {
            self.execution.timeout_secs = parse_override("RAGCHECK_TIMEOUT_SECS", &timeout)?;
        }

        Ok(self)
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.judge.endpoint.trim().is_empty() {
            return Err(RagcheckError::InvalidConfig("judge.endpoint is empty".into()));
        }
        if self.judge.model.trim().is_empty() {
            return Err(RagcheckError::InvalidConfig("judge.model is empty".into()));
        }
        if self.execution.rate_limit == 0 {
            return Err(RagcheckError::InvalidConfig(
                "execution.rate_limit must be at least 1".into(),
            ));
        }
        if self.execution.timeout_secs == 0 {
            return Err(RagcheckError::InvalidConfig(
                "execution.timeout_secs must be at least 1".into(),
            ));
        }
        if self.pipeline.k == 0 {
            return Err(RagcheckError::InvalidConfig("pipeline.k must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RagcheckError::InvalidConfig(format!("{} is not a number: '{}'", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert_eq!(config.judge.model, "gpt-4o-mini");
        assert_eq!(config.execution.rate_limit, 8);
        assert_eq!(config.execution.timeout(), Duration::from_secs(60));
        assert!(config.pipeline.return_contexts);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[judge]
endpoint = "http://localhost:11434/v1"
model = "llama3"

[execution]
rate_limit = 2
"#
        )
        .unwrap();

        let config = HarnessConfig::from_file(file.path()).unwrap();
        assert_eq!(config.judge.endpoint, "http://localhost:11434/v1");
        assert_eq!(config.judge.model, "llama3");
        assert_eq!(config.execution.rate_limit, 2);
        assert_eq!(config.execution.timeout_secs, 60);
        assert_eq!(config.pipeline.k, 4);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = HarnessConfig::default();
        config.execution.rate_limit = 0;
        assert!(matches!(
            config.validate(),
            Err(RagcheckError::InvalidConfig(_))
        ));

        let mut config = HarnessConfig::default();
        config.execution.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = HarnessConfig::default();
        config.judge.api_key = Some("sk-secret".to_string());
        let toml = toml::to_string(&config).unwrap();
        assert!(!toml.contains("sk-secret"));
    }

    #[test]
    fn test_overrides_take_priority_over_file() {
        let mut config = HarnessConfig::default();
        config.judge.model = "from-file".to_string();
        config.judge.api_key = Some("file-key".to_string());

        let config = config
            .with_overrides_from(|name| match name {
                "RAGCHECK_JUDGE_MODEL" => Some("from-env".to_string()),
                "OPENAI_API_KEY" => Some("env-key".to_string()),
                "RAGCHECK_RATE_LIMIT" => Some(" 3 ".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.judge.model, "from-env");
        assert_eq!(config.judge.api_key.as_deref(), Some("file-key"));
        assert_eq!(config.execution.rate_limit, 3);
        assert_eq!(config.execution.timeout_secs, 60);
    }

    #[test]
    fn test_unparsable_override_is_rejected() {
        let err = HarnessConfig::default()
            .with_overrides_from(|name| {
                (name == "RAGCHECK_TIMEOUT_SECS").then(|| "soon".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, RagcheckError::InvalidConfig(ref m) if m.contains("RAGCHECK_TIMEOUT_SECS")));
    }
}
