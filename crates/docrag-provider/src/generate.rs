//! Text generation backends.

use async_trait::async_trait;
use serde_json::{json, Value};

use docrag_core::config::{HttpSettings, LocalBackendSettings, ManagedBackendSettings};
use docrag_core::error::{Error, Result};
use docrag_core::traits::Generator;

use crate::embed::managed_credentials;
use crate::http::HttpBackend;

/// OpenAI-compatible `/chat/completions`.
pub struct OpenAiGenerator {
    http: HttpBackend,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiGenerator {
    pub fn new(local: &LocalBackendSettings, http: &HttpSettings) -> Result<Self> {
        if local.chat_model.trim().is_empty() {
            return Err(Error::InvalidConfig("local.chat_model must not be empty".into()));
        }
        Ok(Self {
            http: HttpBackend::new("openai-chat", http)?,
            url: format!("{}/chat/completions", local.base_url.trim_end_matches('/')),
            api_key: local.api_key.clone().filter(|k| !k.is_empty()),
            model: local.chat_model.clone(),
            temperature: local.temperature,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn name(&self) -> &str {
        self.http.name()
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "stream": false,
        });
        let payload: Value = self.http.post_json(&self.url, self.api_key.as_deref(), &body).await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::backend(self.http.name(), "response contained no message content", false))
    }
}

/// Vertex AI Gemini `:generateContent`.
pub struct VertexGenerator {
    http: HttpBackend,
    url: String,
    access_token: String,
    temperature: f32,
}

impl VertexGenerator {
    pub fn new(managed: &ManagedBackendSettings, http: &HttpSettings) -> Result<Self> {
        let (project, token) = managed_credentials(managed)?;
        Ok(Self {
            http: HttpBackend::new("vertex-chat", http)?,
            url: format!(
                "{}/projects/{project}/locations/{}/publishers/google/models/{}:generateContent",
                managed.base_url(),
                managed.location,
                managed.chat_model
            ),
            access_token: token,
            temperature: managed.temperature,
        })
    }
}

#[async_trait]
impl Generator for VertexGenerator {
    fn name(&self) -> &str {
        self.http.name()
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });
        let payload: Value = self.http.post_json(&self.url, Some(&self.access_token), &body).await?;
        let parts = payload["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| Error::backend(self.http.name(), "response contained no candidates", false))?;
        let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
        if text.trim().is_empty() {
            return Err(Error::backend(self.http.name(), "response contained no text", false));
        }
        Ok(text)
    }
}
