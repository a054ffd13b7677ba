use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{ChatRequest, EmbeddingTask};
use crate::core::errors::ApiError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "gemini")
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError>;

    /// chat completion (streaming). The receiver yields text fragments in the
    /// provider's emission order; it is finite and not restartable.
    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError>;

    /// generate one embedding per input, in input order
    async fn embed(
        &self,
        inputs: &[String],
        task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, ApiError>;
}
