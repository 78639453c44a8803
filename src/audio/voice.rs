//! Voice connection capability used by the playback core.
//!
//! The coordinator only sees [`VoiceSession`]. [`SongbirdSession`] is the real
//! implementation over a songbird `Call`; tests use an in-memory fake.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{File as FileInput, HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("no hay conexión de voz")]
    NotConnected,
    #[error("no se pudo unir al canal de voz: {0}")]
    Join(String),
    #[error("error controlando la reproducción: {0}")]
    Control(String),
}

/// Algo que el sink de voz sabe reproducir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Stream HTTP directo, con las cabeceras que pidió el extractor.
    Http {
        url: String,
        headers: Vec<(String, String)>,
    },
    /// Archivo local (audio sintetizado).
    File(PathBuf),
}

impl AudioSource {
    pub fn describe(&self) -> String {
        match self {
            AudioSource::Http { url, .. } => {
                let host = url::Url::parse(url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_else(|| "desconocido".to_string());
                format!("http({host})")
            }
            AudioSource::File(path) => format!("file({})", path.display()),
        }
    }
}

/// Cómo terminó una reproducción.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// Fin natural o `stop()`.
    Finished,
    /// El stream falló a mitad de camino.
    Failed(String),
}

pub type OnComplete = Box<dyn FnOnce(PlaybackEnd) + Send + 'static>;

/// Envoltorio que garantiza que el callback de fin se ejecuta una sola vez,
/// aunque el sink reporte varios eventos (fin + error) para la misma pista.
#[derive(Clone)]
pub struct CompletionHook(Arc<Mutex<Option<OnComplete>>>);

impl CompletionHook {
    pub fn new(on_complete: OnComplete) -> Self {
        Self(Arc::new(Mutex::new(Some(on_complete))))
    }

    /// Devuelve `false` si ya se había disparado.
    pub fn fire(&self, end: PlaybackEnd) -> bool {
        let callback = self.0.lock().take();
        match callback {
            Some(callback) => {
                callback(end);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_same(&self, other: &CompletionHook) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[async_trait]
pub trait VoiceSession: Send + Sync {
    async fn connect(&self, channel: ChannelId) -> Result<(), VoiceError>;
    async fn is_connected(&self) -> bool;
    /// Reproduce la pista de música. `on_complete` se llama exactamente una vez.
    async fn play(&self, source: AudioSource, on_complete: OnComplete) -> Result<(), VoiceError>;
    async fn is_playing(&self) -> bool;
    async fn is_paused(&self) -> bool;
    async fn pause(&self) -> Result<(), VoiceError>;
    async fn resume(&self) -> Result<(), VoiceError>;
    /// Detiene la música; el callback de `play` se dispara como fin normal.
    async fn stop(&self) -> Result<(), VoiceError>;
    async fn disconnect(&self) -> Result<(), VoiceError>;
    /// Pista transitoria (voz sintetizada) que no reemplaza a la música.
    async fn play_overlay(&self, source: AudioSource, on_complete: OnComplete) -> Result<(), VoiceError>;
    /// Corta la pista transitoria si sigue sonando.
    async fn stop_overlay(&self) -> Result<(), VoiceError>;
}

/// Sesión de voz real sobre songbird.
pub struct SongbirdSession {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    http: reqwest::Client,
    music: Mutex<Option<TrackHandle>>,
    overlay: Mutex<Option<TrackHandle>>,
}

impl SongbirdSession {
    pub fn new(manager: Arc<Songbird>, guild_id: GuildId, http: reqwest::Client) -> Self {
        Self {
            manager,
            guild_id,
            http,
            music: Mutex::new(None),
            overlay: Mutex::new(None),
        }
    }

    fn input_for(&self, source: AudioSource) -> Input {
        match source {
            AudioSource::Http { url, headers } => {
                let mut map = HeaderMap::new();
                for (name, value) in headers {
                    match (
                        HeaderName::from_bytes(name.as_bytes()),
                        HeaderValue::from_str(&value),
                    ) {
                        (Ok(name), Ok(value)) => {
                            map.insert(name, value);
                        }
                        _ => debug!("Cabecera ignorada: {}", name),
                    }
                }
                HttpRequest::new_with_headers(self.http.clone(), url, map).into()
            }
            AudioSource::File(path) => FileInput::new(path).into(),
        }
    }

    async fn start(&self, source: AudioSource, on_complete: OnComplete) -> Result<TrackHandle, VoiceError> {
        let call = self.manager.get(self.guild_id).ok_or(VoiceError::NotConnected)?;
        let description = source.describe();
        let input = self.input_for(source);

        let handle = {
            let mut call = call.lock().await;
            if call.current_channel().is_none() {
                return Err(VoiceError::NotConnected);
            }
            call.play_input(input)
        };

        let hook = CompletionHook::new(on_complete);
        for event in [TrackEvent::End, TrackEvent::Error] {
            let notifier = TrackEndNotifier {
                guild_id: self.guild_id,
                hook: hook.clone(),
            };
            if let Err(e) = handle.add_event(Event::Track(event), notifier) {
                // La pista ya terminó antes de registrar el evento
                warn!("⚠️ No se pudo registrar evento de pista en guild {}: {:?}", self.guild_id, e);
                hook.fire(PlaybackEnd::Failed(format!("{e:?}")));
                break;
            }
        }

        debug!("🔊 Pista iniciada en guild {}: {}", self.guild_id, description);
        Ok(handle)
    }

    async fn handle_mode(handle: Option<TrackHandle>) -> Option<PlayMode> {
        let handle = handle?;
        handle.get_info().await.ok().map(|state| state.playing)
    }
}

#[async_trait]
impl VoiceSession for SongbirdSession {
    async fn connect(&self, channel: ChannelId) -> Result<(), VoiceError> {
        match self.manager.join(self.guild_id, channel).await {
            Ok(_) => {
                info!("🔊 Conectado a canal de voz {} en guild {}", channel, self.guild_id);
                Ok(())
            }
            Err(e) => {
                error!("❌ Error al unirse al canal de voz: {:?}", e);
                Err(VoiceError::Join(e.to_string()))
            }
        }
    }

    async fn is_connected(&self) -> bool {
        match self.manager.get(self.guild_id) {
            Some(call) => call.lock().await.current_channel().is_some(),
            None => false,
        }
    }

    async fn play(&self, source: AudioSource, on_complete: OnComplete) -> Result<(), VoiceError> {
        let handle = self.start(source, on_complete).await?;
        let previous = self.music.lock().replace(handle);
        if let Some(previous) = previous {
            // Las pistas terminadas dejan su handle; sólo una viva indica doble play
            if still_sounding(Self::handle_mode(Some(previous.clone())).await) {
                warn!("⚠️ Reemplazando pista activa en guild {}", self.guild_id);
                let _ = previous.stop();
            }
        }
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        let handle = self.music.lock().clone();
        matches!(Self::handle_mode(handle).await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        let handle = self.music.lock().clone();
        matches!(Self::handle_mode(handle).await, Some(PlayMode::Pause))
    }

    async fn pause(&self) -> Result<(), VoiceError> {
        let handle = self.music.lock().clone().ok_or(VoiceError::NotConnected)?;
        handle.pause().map_err(|e| VoiceError::Control(e.to_string()))
    }

    async fn resume(&self) -> Result<(), VoiceError> {
        if !self.is_connected().await {
            return Err(VoiceError::NotConnected);
        }
        let handle = self.music.lock().clone().ok_or(VoiceError::NotConnected)?;
        handle.play().map_err(|e| VoiceError::Control(e.to_string()))
    }

    async fn stop(&self) -> Result<(), VoiceError> {
        let handle = self.music.lock().take();
        match handle {
            Some(handle) => handle.stop().map_err(|e| VoiceError::Control(e.to_string())),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> Result<(), VoiceError> {
        let music = self.music.lock().take();
        let overlay = self.overlay.lock().take();
        for handle in [music, overlay].into_iter().flatten() {
            let _ = handle.stop();
        }

        if self.manager.get(self.guild_id).is_none() {
            return Ok(());
        }
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| VoiceError::Control(e.to_string()))?;
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }

    async fn play_overlay(&self, source: AudioSource, on_complete: OnComplete) -> Result<(), VoiceError> {
        let handle = self.start(source, on_complete).await?;
        if let Some(previous) = self.overlay.lock().replace(handle) {
            let _ = previous.stop();
        }
        Ok(())
    }

    async fn stop_overlay(&self) -> Result<(), VoiceError> {
        let handle = self.overlay.lock().take();
        match handle {
            Some(handle) => match handle.stop() {
                Ok(()) => Ok(()),
                // Ya había terminado
                Err(songbird::error::ControlError::Finished) => Ok(()),
                Err(e) => Err(VoiceError::Control(e.to_string())),
            },
            None => Ok(()),
        }
    }
}

fn still_sounding(mode: Option<PlayMode>) -> bool {
    matches!(mode, Some(PlayMode::Play | PlayMode::Pause))
}

/// Reenvía el fin (o error) de una pista de songbird al callback de la sesión.
struct TrackEndNotifier {
    guild_id: GuildId,
    hook: CompletionHook,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in *tracks {
                let end = match &state.playing {
                    PlayMode::Errored(e) => {
                        error!("❌ Error en pista para guild {}: {:?}", self.guild_id, e);
                        PlaybackEnd::Failed(format!("{e:?}"))
                    }
                    _ => PlaybackEnd::Finished,
                };
                self.hook.fire(end);
            }
        }

        Some(Event::Cancel)
    }
}
