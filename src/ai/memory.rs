use dashmap::DashMap;

use super::ChatMessage;

/// Historial en memoria por clave de contexto, recortado a los últimos `max_len` mensajes.
pub struct ConversationStore {
    conversations: DashMap<String, Vec<ChatMessage>>,
    max_len: usize,
}

impl ConversationStore {
    pub fn new(max_len: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            max_len,
        }
    }

    pub fn push(&self, key: &str, message: ChatMessage) {
        let mut history = self.conversations.entry(key.to_string()).or_default();
        history.push(message);
        if history.len() > self.max_len {
            let excess = history.len() - self.max_len;
            history.drain(..excess);
        }
    }

    pub fn messages(&self, key: &str) -> Vec<ChatMessage> {
        self.conversations
            .get(key)
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn remove(&self, key: &str) -> bool {
        self.conversations.remove(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Role;

    #[test]
    fn keeps_only_latest_messages() {
        let store = ConversationStore::new(2);
        for i in 0..4 {
            store.push("k", ChatMessage::new(Role::User, format!("m{i}")));
        }
        let contents: Vec<String> = store.messages("k").into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["m2", "m3"]);
        assert!(store.messages("otro").is_empty());
        assert!(store.remove("k"));
        assert!(!store.remove("k"));
    }
}
