//! Conversational assistant backed by an OpenAI-compatible chat API.

pub mod groq;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

pub use groq::GroqProvider;
pub use memory::ConversationStore;

pub const APOLOGY: &str = "❌ Tuve un problema pensando… inténtalo otra vez 💜";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Asistente con memoria corta por contexto (un canal, normalmente).
pub struct Assistant {
    provider: Arc<dyn ChatProvider>,
    history: ConversationStore,
    system_prompt: String,
}

impl Assistant {
    pub fn new(provider: Arc<dyn ChatProvider>, history_len: usize, system_prompt: String) -> Self {
        Self {
            provider,
            history: ConversationStore::new(history_len),
            system_prompt,
        }
    }

    pub fn context_key(channel_id: u64) -> String {
        format!("chan_{channel_id}")
    }

    /// Responde a `prompt` dentro del contexto. Nunca falla: ante cualquier
    /// error devuelve la disculpa y no guarda turno del asistente.
    pub async fn reply(&self, context_key: &str, prompt: &str) -> String {
        self.history.push(context_key, ChatMessage::new(Role::User, prompt));

        let mut messages = vec![ChatMessage::new(Role::System, self.system_prompt.as_str())];
        messages.extend(self.history.messages(context_key));

        match self.provider.complete(&messages).await {
            Ok(answer) => {
                let answer = answer.trim().to_string();
                debug!("🤖 Respuesta en {}: {} caracteres", context_key, answer.chars().count());
                self.history
                    .push(context_key, ChatMessage::new(Role::Assistant, answer.as_str()));
                answer
            }
            Err(e) => {
                error!("❌ Error de IA en {}: {:?}", context_key, e);
                APOLOGY.to_string()
            }
        }
    }

    pub fn clear(&self, context_key: &str) -> bool {
        self.history.remove(context_key)
    }

    /// Resume `text` en un contexto desechable que se borra al terminar.
    pub async fn summarize(&self, scratch_key: &str, text: &str) -> String {
        let prompt = format!("Resume el siguiente texto de forma clara y corta:\n\n{text}");
        let summary = self.reply(scratch_key, &prompt).await;
        self.history.remove(scratch_key);
        summary
    }
}
