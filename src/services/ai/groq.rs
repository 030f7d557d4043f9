use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{chat_messages, LlmProvider, Message};

const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Groq's OpenAI-compatible endpoint in JSON-object mode.
pub struct GroqProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GroqProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, system_prompt: &str, messages: &[Message]) -> Value {
        json!({
            "model": self.model,
            "messages": chat_messages(system_prompt, messages),
            "temperature": 0,
            "response_format": { "type": "json_object" },
        })
    }
}

fn completion_text(data: &Value) -> Option<&str> {
    data.pointer("/choices/0/message/content")?.as_str()
}

#[async_trait]
impl LlmProvider for GroqProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        let data: Value = self
            .client
            .post(GROQ_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(system_prompt, messages))
            .send()
            .await
            .context("failed to call Groq API")?
            .error_for_status()
            .context("Groq API returned error")?
            .json()
            .await
            .context("failed to parse Groq response")?;

        completion_text(&data)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("missing content in Groq response"))
    }
}
