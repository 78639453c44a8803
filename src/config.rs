use anyhow::{Context, Result};
use std::time::Duration;

use crate::audio::CoordinatorSettings;

pub const DEFAULT_SYSTEM_PROMPT: &str = "Eres Kaivoxx, una asistente virtual estilo VTuber. \
Eres amigable, expresiva, un poco sarcástica pero respetuosa. Hablas en español latino, \
usas emojis con moderación 💜✨. Respondes de forma clara y no demasiado larga. \
Si te piden algo peligroso o ilegal, te niegas amablemente.";

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub prefix: String,

    // Música
    pub max_queue_length: usize,
    pub max_playlist_entries: usize,
    pub queue_page_size: usize,
    pub max_consecutive_failures: u32,

    // Voz
    pub max_tts_chars: usize,
    pub tts_language: String,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: String,
    pub speech_poll_interval: Duration,
    pub speech_timeout: Duration,

    // IA
    pub groq_api_key: Option<String>,
    pub groq_api_url: String,
    pub groq_model: String,
    pub chat_history_len: usize,
    pub system_prompt: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración leyendo cada variable con `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let secret = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: secret("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            prefix: var("BOT_PREFIX", defaults.prefix.as_str()),

            // Música
            max_queue_length: var("MAX_QUEUE_LENGTH", "500")
                .parse()
                .context("MAX_QUEUE_LENGTH inválido")?,
            max_playlist_entries: var("MAX_PLAYLIST_ENTRIES", "200")
                .parse()
                .context("MAX_PLAYLIST_ENTRIES inválido")?,
            queue_page_size: var("QUEUE_PAGE_SIZE", "50")
                .parse()
                .context("QUEUE_PAGE_SIZE inválido")?,
            max_consecutive_failures: var("MAX_CONSECUTIVE_FAILURES", "10")
                .parse()
                .context("MAX_CONSECUTIVE_FAILURES inválido")?,

            // Voz
            max_tts_chars: var("MAX_TTS_CHARS", "180")
                .parse()
                .context("MAX_TTS_CHARS inválido")?,
            tts_language: var("TTS_LANGUAGE", defaults.tts_language.as_str()),
            elevenlabs_api_key: secret("ELEVENLABS_API_KEY"),
            elevenlabs_voice_id: var("ELEVENLABS_VOICE_ID", defaults.elevenlabs_voice_id.as_str()),
            speech_poll_interval: humantime::parse_duration(&var("SPEECH_POLL_INTERVAL", "100ms"))
                .context("SPEECH_POLL_INTERVAL inválido")?,
            speech_timeout: humantime::parse_duration(&var("SPEECH_TIMEOUT", "2m"))
                .context("SPEECH_TIMEOUT inválido")?,

            // IA
            groq_api_key: secret("GROQ_API_KEY"),
            groq_api_url: var("GROQ_API_URL", defaults.groq_api_url.as_str()),
            groq_model: var("GROQ_MODEL", defaults.groq_model.as_str()),
            chat_history_len: var("CHAT_HISTORY_LEN", "10")
                .parse()
                .context("CHAT_HISTORY_LEN inválido")?,
            system_prompt: var("SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.prefix.trim().is_empty() {
            anyhow::bail!("Bot prefix cannot be empty");
        }

        if self.max_queue_length == 0 {
            anyhow::bail!("Max queue length must be greater than 0");
        }

        if self.max_playlist_entries == 0 {
            anyhow::bail!("Max playlist entries must be greater than 0");
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        if self.max_tts_chars == 0 {
            anyhow::bail!("Max TTS chars must be greater than 0");
        }

        if self.speech_poll_interval.is_zero() {
            anyhow::bail!("Speech poll interval must be greater than 0");
        }

        if self.speech_timeout < self.speech_poll_interval {
            anyhow::bail!(
                "Speech timeout ({:?}) must not be shorter than the poll interval ({:?})",
                self.speech_timeout,
                self.speech_poll_interval
            );
        }

        Ok(())
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            max_queue: self.max_queue_length,
            max_playlist: self.max_playlist_entries,
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }

    /// Resumen apto para logs: nunca incluye tokens ni claves.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Prefix: {}\n  \
            Queue: {} max, {} per playlist, {} per page, {} consecutive failures\n  \
            Speech: {} chars, lang {}, ElevenLabs={}, poll {}, timeout {}\n  \
            Chat: model {}, {} messages of history, enabled={}",
            self.prefix,
            self.max_queue_length,
            self.max_playlist_entries,
            self.queue_page_size,
            self.max_consecutive_failures,
            self.max_tts_chars,
            self.tts_language,
            self.elevenlabs_api_key.is_some(),
            humantime::format_duration(self.speech_poll_interval),
            humantime::format_duration(self.speech_timeout),
            self.groq_model,
            self.chat_history_len,
            self.groq_api_key.is_some(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            prefix: "#".to_string(),

            max_queue_length: 500,
            max_playlist_entries: 200,
            queue_page_size: 50,
            max_consecutive_failures: 10,

            max_tts_chars: 180,
            tts_language: "es".to_string(),
            elevenlabs_api_key: None,
            elevenlabs_voice_id: "oPFCKhGno0A00KewVkZw".to_string(),
            speech_poll_interval: Duration::from_millis(100),
            speech_timeout: Duration::from_secs(120),

            groq_api_key: None,
            groq_api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            groq_model: "llama-3.1-8b-instant".to_string(),
            chat_history_len: 10,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}
