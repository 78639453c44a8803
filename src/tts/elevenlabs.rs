use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::{SpeechError, SpeechSynthesizer};

const API_BASE: &str = "https://api.elevenlabs.io/v1/text-to-speech";
const MODEL_ID: &str = "eleven_multilingual_v2";
const PROVIDER: &str = "ElevenLabs";

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// Proveedor principal de voz.
pub struct ElevenLabsSynthesizer {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
}

impl ElevenLabsSynthesizer {
    pub fn new(client: reqwest::Client, api_key: String, voice_id: String) -> Self {
        Self {
            client,
            api_key,
            voice_id,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
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
            .post(format!("{}/{}", API_BASE, self.voice_id))
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .timeout(Duration::from_secs(30))
            .json(&SynthesisRequest {
                text,
                model_id: MODEL_ID,
                voice_settings: VoiceSettings {
                    stability: 0.5,
                    similarity_boost: 0.5,
                },
            })
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
        debug!("🗣️ ElevenLabs devolvió {} bytes", audio.len());
        Ok(audio)
    }
}
