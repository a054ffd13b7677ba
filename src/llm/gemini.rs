use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use async_trait::async_trait;

use super::provider::LlmProvider;
use super::types::{ChatRequest, EmbeddingTask};
use crate::core::config::AppConfig;
use crate::core::errors::ApiError;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini client covering both generation and embeddings.
#[derive(Clone)]
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    chat_model: String,
    embed_model: String,
    client: Client,
}

impl GeminiProvider {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            base_url: GEMINI_API_URL.to_string(),
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
            embed_model: config.embed_model.clone(),
            client: Client::new(),
        }
    }

    fn request_body(request: &ChatRequest) -> Value {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": api_role(&m.role),
                    "parts": [{"text": m.content}],
                })
            })
            .collect();

        let mut body = json!({ "contents": contents });
        let mut generation = serde_json::Map::new();
        if let Some(t) = request.temperature {
            generation.insert("temperature".to_string(), json!(t));
        }
        if let Some(t) = request.max_tokens {
            generation.insert("maxOutputTokens".to_string(), json!(t));
        }
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }
        body
    }
}

/// Gemini only understands "user" and "model" turn roles.
fn api_role(role: &str) -> &str {
    match role {
        "assistant" | "model" => "model",
        _ => "user",
    }
}

/// Pull the concatenated part texts out of one streamed response event.
fn fragment_from_event(event: &Value) -> Option<String> {
    let parts = event["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn embed_task_type(task: EmbeddingTask) -> &'static str {
    match task {
        EmbeddingTask::Document => "RETRIEVAL_DOCUMENT",
        EmbeddingTask::Query => "RETRIEVAL_QUERY",
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.chat_model, self.api_key
        );

        let res = self
            .client
            .post(&url)
            .json(&Self::request_body(&request))
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!("Gemini chat error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        Ok(fragment_from_event(&payload).unwrap_or_default())
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, self.chat_model, self.api_key
        );

        let res = self
            .client
            .post(&url)
            .json(&Self::request_body(&request))
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!("Gemini stream error: {}", text)));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            // SSE events can be split across byte chunks; assemble lines first.
            let mut buffer = String::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = buffer.find('\n') {
                            let line: String = buffer.drain(..=pos).collect();
                            let line = line.trim();
                            let Some(data) = line.strip_prefix("data: ") else {
                                continue;
                            };
                            if data == "[DONE]" {
                                return;
                            }
                            if let Ok(event) = serde_json::from_str::<Value>(data) {
                                if let Some(text) = fragment_from_event(&event) {
                                    if tx.send(Ok(text)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::internal(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn embed(
        &self,
        inputs: &[String],
        task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/models/{}:batchEmbedContents?key={}",
            self.base_url, self.embed_model, self.api_key
        );

        let requests: Vec<Value> = inputs
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", self.embed_model),
                    "content": {"parts": [{"text": text}]},
                    "taskType": embed_task_type(task),
                })
            })
            .collect();

        let res = self
            .client
            .post(&url)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!("Gemini embed error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        let mut embeddings = Vec::new();
        if let Some(data) = payload["embeddings"].as_array() {
            for item in data {
                if let Some(vals) = item["values"].as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(ApiError::Internal(format!(
                "Gemini embed returned {} vectors for {} inputs",
                embeddings.len(),
                inputs.len()
            )));
        }

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    #[test]
    fn assistant_turns_map_to_model_role() {
        assert_eq!(api_role("assistant"), "model");
        assert_eq!(api_role("user"), "user");
        assert_eq!(api_role("system"), "user");
    }

    #[test]
    fn fragment_concatenates_candidate_parts() {
        let event = json!({
            "candidates": [{
                "content": {"parts": [{"text": "Hel"}, {"text": "lo"}]}
            }]
        });
        assert_eq!(fragment_from_event(&event).as_deref(), Some("Hello"));
    }

    #[test]
    fn fragment_skips_events_without_text() {
        let event = json!({"candidates": [{"finishReason": "STOP"}]});
        assert!(fragment_from_event(&event).is_none());
    }

    #[test]
    fn request_body_includes_generation_config_only_when_set() {
        let bare = GeminiProvider::request_body(&ChatRequest::new(vec![ChatMessage::user("hi")]));
        assert!(bare.get("generationConfig").is_none());
        assert_eq!(bare["contents"][0]["role"], "user");

        let mut request = ChatRequest::new(vec![ChatMessage::user("hi")]);
        request.temperature = Some(0.2);
        let tuned = GeminiProvider::request_body(&request);
        assert_eq!(tuned["generationConfig"]["temperature"], 0.2);
    }
}
