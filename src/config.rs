//! Configuration for the retrieval pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of passages returned to the caller.
    pub top_k: usize,
    /// Candidate count fetched before reranking narrows to `top_k`.
    pub initial_k: usize,
    /// Minimum similarity score for search results (no filtering when `None`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f32>,
    /// Weight of the semantic score in hybrid retrieval.
    pub semantic_weight: f32,
    /// Weight of the keyword-overlap score in hybrid retrieval.
    pub keyword_weight: f32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
            initial_k: 20,
            score_threshold: None,
            semantic_weight: 0.7,
            keyword_weight: 0.3,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of passages returned to the caller.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the candidate count fetched ahead of reranking.
    pub fn initial_k(mut self, k: usize) -> Self {
        self.config.initial_k = k;
        self
    }

    /// Set the minimum similarity threshold for search results.
    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.config.score_threshold = Some(threshold);
        self
    }

    /// Set the hybrid retrieval blend weights.
    ///
    /// The weights are applied additively without renormalization, so
    /// weights that do not sum to 1 inflate or deflate combined scores.
    pub fn hybrid_weights(mut self, semantic: f32, keyword: f32) -> Self {
        self.config.semantic_weight = semantic;
        self.config.keyword_weight = keyword;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `initial_k < top_k`
    /// - either hybrid weight is negative
    pub fn build(self) -> Result<RagConfig> {
        if self.config.chunk_overlap >= self.config.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.config.chunk_overlap, self.config.chunk_size
            )));
        }
        if self.config.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.config.initial_k < self.config.top_k {
            return Err(RagError::ConfigError(format!(
                "initial_k ({}) must be at least top_k ({})",
                self.config.initial_k, self.config.top_k
            )));
        }
        if self.config.semantic_weight < 0.0 || self.config.keyword_weight < 0.0 {
            return Err(RagError::ConfigError("hybrid weights must be non-negative".to_string()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RagConfig::default();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.initial_k, 20);
        assert!(config.score_threshold.is_none());
    }

    #[test]
    fn builder_rejects_overlap_at_least_chunk_size() {
        let result = RagConfig::builder().chunk_size(100).chunk_overlap(100).build();
        assert!(matches!(result, Err(RagError::ConfigError(_))));
    }

    #[test]
    fn builder_rejects_zero_top_k() {
        let result = RagConfig::builder().top_k(0).build();
        assert!(matches!(result, Err(RagError::ConfigError(_))));
    }

    #[test]
    fn builder_rejects_initial_k_below_top_k() {
        let result = RagConfig::builder().top_k(10).initial_k(5).build();
        assert!(matches!(result, Err(RagError::ConfigError(_))));
    }

    #[test]
    fn builder_accepts_custom_weights() {
        let config = RagConfig::builder().hybrid_weights(0.5, 0.5).build().unwrap();
        assert_eq!(config.semantic_weight, 0.5);
        assert_eq!(config.keyword_weight, 0.5);
    }
}
