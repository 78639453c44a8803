//! Speech synthesis providers.

pub mod elevenlabs;
pub mod google;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub use elevenlabs::ElevenLabsSynthesizer;
pub use google::GoogleTts;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("texto vacío")]
    Empty,
    #[error("texto demasiado largo ({len}/{max} caracteres)")]
    TooLong { len: usize, max: usize },
    #[error("no estoy conectado a un canal de voz")]
    NotConnected,
    #[error("error HTTP de {provider}: {message}")]
    Http { provider: &'static str, message: String },
    #[error("{provider} respondió {status}")]
    Status { provider: &'static str, status: u16 },
    #[error("todos los proveedores de voz fallaron")]
    AllProvidersFailed,
    #[error("error de archivo temporal: {0}")]
    Io(#[from] std::io::Error),
    #[error("error reproduciendo la locución: {0}")]
    Playback(String),
    #[error("la conexión de voz se perdió durante la locución")]
    Disconnected,
    #[error("la locución superó el tiempo máximo")]
    Timeout,
    #[error("reproductor no disponible: {0}")]
    Coordinator(String),
}

impl From<crate::audio::coordinator::CoordinatorError> for SpeechError {
    fn from(e: crate::audio::coordinator::CoordinatorError) -> Self {
        SpeechError::Coordinator(e.to_string())
    }
}

/// Convierte texto en audio (MP3).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &'static str;
    async fn synthesize(&self, text: &str) -> Result<Bytes, SpeechError>;
}

/// Quita el marcado de Discord que los sintetizadores leerían en voz alta.
pub fn clean_text(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '`'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Intenta el proveedor principal una vez y, si falla, el secundario una vez.
pub struct FallbackSynthesizer {
    primary: Option<Arc<dyn SpeechSynthesizer>>,
    secondary: Arc<dyn SpeechSynthesizer>,
}

impl FallbackSynthesizer {
    pub fn new(primary: Option<Arc<dyn SpeechSynthesizer>>, secondary: Arc<dyn SpeechSynthesizer>) -> Self {
        match &primary {
            Some(p) => info!("🗣️ Voz: {} con respaldo {}", p.name(), secondary.name()),
            None => info!("🗣️ Voz: {} (sin proveedor principal)", secondary.name()),
        }
        Self { primary, secondary }
    }
}

#[async_trait]
impl SpeechSynthesizer for FallbackSynthesizer {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn synthesize(&self, text: &str) -> Result<Bytes, SpeechError> {
        if let Some(primary) = &self.primary {
            match primary.synthesize(text).await {
                Ok(audio) => return Ok(audio),
                Err(e) => warn!("⚠️ {} falló, usando {}: {}", primary.name(), self.secondary.name(), e),
            }
        }

        self.secondary.synthesize(text).await.map_err(|e| {
            warn!("❌ {} también falló: {}", self.secondary.name(), e);
            SpeechError::AllProvidersFailed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mock(name: &'static str) -> MockSpeechSynthesizer {
        let mut mock = MockSpeechSynthesizer::new();
        mock.expect_name().return_const(name);
        mock
    }

    #[test]
    fn clean_text_strips_markdown() {
        assert_eq!(clean_text("  **hola** _mundo_ `x` "), "hola mundo x");
    }

    #[tokio::test]
    async fn primary_success_skips_secondary() {
        let mut primary = mock("primary");
        primary
            .expect_synthesize()
            .times(1)
            .returning(|_| Ok(Bytes::from_static(b"mp3")));
        let mut secondary = mock("secondary");
        secondary.expect_synthesize().never();

        let synth = FallbackSynthesizer::new(Some(Arc::new(primary)), Arc::new(secondary));

        assert_eq!(synth.synthesize("hola").await.unwrap(), Bytes::from_static(b"mp3"));
    }

    #[tokio::test]
    async fn secondary_is_tried_exactly_once_after_primary_failure() {
        let mut primary = mock("primary");
        primary
            .expect_synthesize()
            .times(1)
            .returning(|_| Err(SpeechError::Status { provider: "primary", status: 401 }));
        let mut secondary = mock("secondary");
        secondary
            .expect_synthesize()
            .withf(|text| text == "hola")
            .times(1)
            .returning(|_| Ok(Bytes::from_static(b"gtts")));

        let synth = FallbackSynthesizer::new(Some(Arc::new(primary)), Arc::new(secondary));

        assert_eq!(synth.synthesize("hola").await.unwrap(), Bytes::from_static(b"gtts"));
    }

    #[tokio::test]
    async fn both_failing_reports_all_providers_failed() {
        let mut primary = mock("primary");
        primary
            .expect_synthesize()
            .times(1)
            .returning(|_| Err(SpeechError::Status { provider: "primary", status: 500 }));
        let mut secondary = mock("secondary");
        secondary
            .expect_synthesize()
            .times(1)
            .returning(|_| Err(SpeechError::Status { provider: "secondary", status: 503 }));

        let synth = FallbackSynthesizer::new(Some(Arc::new(primary)), Arc::new(secondary));

        assert!(matches!(
            synth.synthesize("hola").await,
            Err(SpeechError::AllProvidersFailed)
        ));
    }

    #[tokio::test]
    async fn without_primary_only_secondary_is_used() {
        let mut secondary = mock("secondary");
        secondary
            .expect_synthesize()
            .times(1)
            .returning(|_| Ok(Bytes::from_static(b"gtts")));

        let synth = FallbackSynthesizer::new(None, Arc::new(secondary));

        assert!(synth.synthesize("hola").await.is_ok());
    }
}
