use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

use super::{SpeechError, SpeechSynthesizer};

const PROVIDER: &str = "Google TTS";

/// Voz de respaldo: el endpoint público de Google Translate.
pub struct GoogleTts {
    client: reqwest::Client,
    language: String,
}

impl GoogleTts {
    pub fn new(client: reqwest::Client, language: String) -> Self {
        Self { client, language }
    }

    fn request_url(&self, text: &str) -> String {
        format!(
            "https://translate.google.com/translate_tts?ie=UTF-8&client=tw-ob&tl={}&q={}",
            urlencoding::encode(&self.language),
            urlencoding::encode(text)
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn synthesize(&self, text: &str) -> Result<Bytes, SpeechError> {
        let http = |e: reqwest::Error| SpeechError::Http {
            provider: PROVIDER,
            message: e.to_string(),
        };

        let response = self
            .client
            .get(self.request_url(text))
            .header("User-Agent", "Mozilla/5.0")
            .timeout(Duration::from_secs(15))
            .send()
            .await
            .map_err(http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
            });
        }

        let audio = response.bytes().await.map_err(http)?;
        if audio.is_empty() {
            return Err(SpeechError::Http {
                provider: PROVIDER,
                message: "respuesta vacía".into(),
            });
        }
        debug!("🗣️ Google TTS devolvió {} bytes", audio.len());
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_encodes_text_and_language() {
        let tts = GoogleTts::new(reqwest::Client::new(), "es".into());
        let url = tts.request_url("¿qué tal?");
        assert!(url.contains("tl=es"));
        assert!(url.contains("q=%C2%BFqu%C3%A9%20tal%3F"));
        assert!(url.contains("client=tw-ob"));
    }
}
