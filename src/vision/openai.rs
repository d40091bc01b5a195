//! OpenAI-compatible chat-completions vision client.
//!
//! Works against any provider exposing `POST {base}/chat/completions`
//! with `image_url` content parts (OpenAI, Azure-style proxies, local
//! gateways).

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{ImageInput, VisionError, VisionModel};

/// Chat-completions client.
#[derive(Debug, Clone)]
pub struct OpenAiVision {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<Value>,
}

impl OpenAiVision {
    /// Creates a client. `base_url` is e.g. `https://api.openai.com/v1`.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            max_tokens,
        }
    }

    fn request_body(&self, prompt: &str, image: &ImageInput) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": 0,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": prompt},
                    {"type": "image_url", "image_url": {"url": image.to_data_uri(), "detail": "high"}}
                ]
            }]
        })
    }
}

/// Pulls the reply text out of a completion. Content may be a string or
/// an array of text parts.
fn reply_text(response: CompletionResponse) -> Result<String, VisionError> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(VisionError::Malformed("no choices in response".to_string()));
    };
    let text = match choice.message.content {
        Some(Value::String(text)) => text,
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    };
    if text.trim().is_empty() {
        return Err(VisionError::EmptyReply);
    }
    Ok(text)
}

#[async_trait]
impl VisionModel for OpenAiVision {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn extract(&self, prompt: &str, image: &ImageInput) -> Result<String, VisionError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, image_bytes = image.len(), "calling vision model");

        let mut request = self.client.post(&url).json(&self.request_body(prompt, image));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let resp = request.send().await?;
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(VisionError::RateLimited { retry_after_secs });
        }
        if status == StatusCode::GATEWAY_TIMEOUT || status == StatusCode::REQUEST_TIMEOUT {
            return Err(VisionError::Timeout);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VisionError::Http {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let completion: CompletionResponse = resp.json().await?;
        reply_text(completion)
    }
}
