//! LLM provider trait used by LLM-based reranking and compression.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that completes a prompt into text.
///
/// This is the only capability the retrieval pipeline needs from a language
/// model: the LLM reranker prompts for a relevance number per passage, and
/// the LLM compressor prompts for an extract of the relevant content.
/// Implementations are long-lived singletons shared across requests.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete `prompt` and return the model's text output.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
