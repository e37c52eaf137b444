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

//! Caching layer for judge responses

use crate::llm_client::{JudgeRequest, LLMClient, LLMError, LLMResponse, ResponseFormat};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Judge client that memoizes responses for identical requests
///
/// Re-running an experiment over an unchanged dataset then only pays for
/// judge calls whose prompt actually changed. Errors are never cached.
pub struct CachedLLMClient {
    inner: Arc<dyn LLMClient>,
    cache: Cache<CacheKey, LLMResponse>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedLLMClient {
    /// Wrap a client with a cache of the given TTL in seconds
    pub fn new(inner: Arc<dyn LLMClient>, ttl_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            inner,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Clear entire cache
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entry_count: self.cache.entry_count(),
        }
    }
}

#[async_trait]
impl LLMClient for CachedLLMClient {
    async fn complete(&self, request: JudgeRequest) -> Result<LLMResponse, LLMError> {
        let key = CacheKey::new(self.inner.model_name(), &request);

        if let Some(cached) = self.cache.get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let response = self.inner.complete(request).await?;
        self.cache.insert(key, response.clone()).await;
        Ok(response)
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Cache key based on model and request content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn new(model: &str, request: &JudgeRequest) -> Self {
        let mut hasher = DefaultHasher::new();

        model.hash(&mut hasher);
        request.system.hash(&mut hasher);
        request.prompt.hash(&mut hasher);

        match &request.format {
            ResponseFormat::Text => "text".hash(&mut hasher),
            ResponseFormat::Structured { name, schema } => {
                name.hash(&mut hasher);
                schema.to_string().hash(&mut hasher);
            }
        }

        Self(hasher.finish())
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entry_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLLMClient;

    #[tokio::test]
    async fn test_repeated_request_hits_cache() {
        let inner = Arc::new(ScriptedLLMClient::new().with_text("GRADE: CORRECT"));
        let client = CachedLLMClient::new(inner.clone(), 3600);

        let first = client.complete(JudgeRequest::text("same prompt")).await.unwrap();
        let second = client.complete(JudgeRequest::text("same prompt")).await.unwrap();

        assert_eq!(first.output, second.output);
        assert_eq!(inner.call_count(), 1);

        let stats = client.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn test_key_distinguishes_format() {
        let text = JudgeRequest::text("p");
        let structured = JudgeRequest::structured("p", "grade", serde_json::json!({}));
        assert_ne!(CacheKey::new("m", &text), CacheKey::new("m", &structured));
        assert_ne!(CacheKey::new("m", &text), CacheKey::new("other", &text));
        assert_eq!(CacheKey::new("m", &text), CacheKey::new("m", &JudgeRequest::text("p")));
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let inner = Arc::new(ScriptedLLMClient::new().with_failure("boom").with_text("ok"));
        let client = CachedLLMClient::new(inner.clone(), 3600);

        assert!(client.complete(JudgeRequest::text("p")).await.is_err());
        let retry = client.complete(JudgeRequest::text("p")).await.unwrap();
        assert_eq!(retry.output.as_text(), Some("ok"));
        assert_eq!(inner.call_count(), 2);
    }
}
