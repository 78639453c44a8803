use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{ChatMessage, ChatProvider};

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Cliente del endpoint `chat/completions` de Groq (compatible con OpenAI).
pub struct GroqProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl GroqProvider {
    pub fn new(client: reqwest::Client, api_url: String, api_key: String, model: String) -> Self {
        Self {
            client,
            api_url,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ChatProvider for GroqProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        debug!("🤖 Enviando {} mensajes a {}", messages.len(), self.model);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(20))
            .json(&CompletionRequest {
                model: &self.model,
                messages,
                temperature: 0.6,
                max_tokens: 300,
            })
            .send()
            .await
            .context("Error al contactar la API de chat")?
            .error_for_status()
            .context("La API de chat devolvió error")?;

        let body: CompletionResponse = response
            .json()
            .await
            .context("Respuesta de chat inválida")?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .context("La API de chat no devolvió contenido")
    }
}
