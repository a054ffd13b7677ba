//! Test doubles shared across unit tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::errors::ApiError;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{ChatRequest, EmbeddingTask};

/// Deterministic in-process stand-in for the hosted model.
///
/// Embeddings are normalized bag-of-words vectors (hashed word buckets), so
/// texts sharing vocabulary really are close in cosine space. Chat streams
/// echo the final message back in two fragments, which lets end-to-end tests
/// assert that the grounding context reached the model.
pub struct FakeLlm {
    dim: usize,
}

impl FakeLlm {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dim;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut vector {
                *x /= norm;
            }
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl LlmProvider for FakeLlm {
    fn name(&self) -> &str {
        "fake"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        Ok(request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default())
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let content = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let mid = content
                .char_indices()
                .nth(content.chars().count() / 2)
                .map(|(i, _)| i)
                .unwrap_or(0);
            let (head, tail) = content.split_at(mid);
            for fragment in [head, tail] {
                if fragment.is_empty() {
                    continue;
                }
                if tx.send(Ok(fragment.to_string())).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }

    async fn embed(
        &self,
        inputs: &[String],
        _task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, ApiError> {
        Ok(inputs.iter().map(|text| self.embed_text(text)).collect())
    }
}
