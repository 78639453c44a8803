//! In-memory collaborators for the playback tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::ChannelId;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use super::{
    notify::{AddedNotice, NowPlayingMessage, Notifier},
    queue::Track,
    voice::{AudioSource, CompletionHook, OnComplete, PlaybackEnd, VoiceError, VoiceSession},
};
use crate::sources::{ResolveError, Resolved, SourceOpener, TrackDescriptor, TrackResolver};

/// Espera (máximo 2 s) a que se cumpla la condición.
pub async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timeout esperando: {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[derive(Default)]
struct VoiceState {
    plays: Vec<AudioSource>,
    music: Option<CompletionHook>,
    music_paused: bool,
    overlays: Vec<AudioSource>,
    overlay: Option<CompletionHook>,
    active_overlays: usize,
    max_concurrent_overlays: usize,
}

pub struct FakeVoice {
    connected: AtomicBool,
    refuse_connect: bool,
    /// Si está definido, cada locución termina sola tras este tiempo.
    overlay_duration: Option<Duration>,
    state: Arc<Mutex<VoiceState>>,
}

impl FakeVoice {
    fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            refuse_connect: false,
            overlay_duration: None,
            state: Arc::new(Mutex::new(VoiceState::default())),
        }
    }

    pub fn connected() -> Self {
        Self::new(true)
    }

    pub fn disconnected() -> Self {
        Self::new(false)
    }

    pub fn refusing_connect() -> Self {
        Self {
            refuse_connect: true,
            ..Self::new(false)
        }
    }

    pub fn with_overlay_duration(mut self, duration: Duration) -> Self {
        self.overlay_duration = Some(duration);
        self
    }

    /// Simula el fin de la pista de música actual.
    pub fn finish_music(&self, end: PlaybackEnd) {
        let hook = self.state.lock().music.take();
        if let Some(hook) = hook {
            hook.fire(end);
        }
    }

    pub fn finish_overlay(&self) {
        let hook = {
            let mut state = self.state.lock();
            let hook = state.overlay.take();
            if hook.is_some() {
                state.active_overlays = state.active_overlays.saturating_sub(1);
            }
            hook
        };
        if let Some(hook) = hook {
            hook.fire(PlaybackEnd::Finished);
        }
    }

    /// Corta la conexión sin avisar a nadie (kick, caída de red).
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected_now(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn play_count(&self) -> usize {
        self.state.lock().plays.len()
    }

    pub fn played_urls(&self) -> Vec<String> {
        self.state
            .lock()
            .plays
            .iter()
            .map(|source| match source {
                AudioSource::Http { url, .. } => url.clone(),
                AudioSource::File(path) => path.display().to_string(),
            })
            .collect()
    }

    pub fn music_paused(&self) -> bool {
        self.state.lock().music_paused
    }

    pub fn overlay_count(&self) -> usize {
        self.state.lock().overlays.len()
    }

    pub fn overlay_sources(&self) -> Vec<AudioSource> {
        self.state.lock().overlays.clone()
    }

    pub fn max_concurrent_overlays(&self) -> usize {
        self.state.lock().max_concurrent_overlays
    }
}

#[async_trait]
impl VoiceSession for FakeVoice {
    async fn connect(&self, channel: ChannelId) -> Result<(), VoiceError> {
        if self.refuse_connect {
            return Err(VoiceError::Join(format!("canal {channel} sin permisos")));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.is_connected_now()
    }

    async fn play(&self, source: AudioSource, on_complete: OnComplete) -> Result<(), VoiceError> {
        if !self.is_connected_now() {
            return Err(VoiceError::NotConnected);
        }
        let mut state = self.state.lock();
        assert!(state.music.is_none(), "play con otra pista activa");
        state.plays.push(source);
        state.music = Some(CompletionHook::new(on_complete));
        state.music_paused = false;
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        let state = self.state.lock();
        state.music.is_some() && !state.music_paused
    }

    async fn is_paused(&self) -> bool {
        let state = self.state.lock();
        state.music.is_some() && state.music_paused
    }

    async fn pause(&self) -> Result<(), VoiceError> {
        let mut state = self.state.lock();
        if state.music.is_none() {
            return Err(VoiceError::Control("nada que pausar".into()));
        }
        state.music_paused = true;
        Ok(())
    }

    async fn resume(&self) -> Result<(), VoiceError> {
        if !self.is_connected_now() {
            return Err(VoiceError::NotConnected);
        }
        let mut state = self.state.lock();
        if state.music.is_none() {
            return Err(VoiceError::Control("nada que reanudar".into()));
        }
        state.music_paused = false;
        Ok(())
    }

    async fn stop(&self) -> Result<(), VoiceError> {
        self.finish_music(PlaybackEnd::Finished);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), VoiceError> {
        self.connected.store(false, Ordering::SeqCst);
        self.finish_music(PlaybackEnd::Finished);
        self.finish_overlay();
        Ok(())
    }

    async fn play_overlay(&self, source: AudioSource, on_complete: OnComplete) -> Result<(), VoiceError> {
        if !self.is_connected_now() {
            return Err(VoiceError::NotConnected);
        }
        let hook = CompletionHook::new(on_complete);
        {
            let mut state = self.state.lock();
            state.overlays.push(source);
            state.active_overlays += 1;
            state.max_concurrent_overlays = state.max_concurrent_overlays.max(state.active_overlays);
            state.overlay = Some(hook.clone());
        }

        if let Some(duration) = self.overlay_duration {
            let state = self.state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                let finished = {
                    let mut state = state.lock();
                    let current = state.overlay.as_ref().is_some_and(|c| c.is_same(&hook));
                    if current {
                        state.overlay = None;
                        state.active_overlays = state.active_overlays.saturating_sub(1);
                    }
                    current
                };
                if finished {
                    hook.fire(PlaybackEnd::Finished);
                }
            });
        }
        Ok(())
    }

    async fn stop_overlay(&self) -> Result<(), VoiceError> {
        self.finish_overlay();
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeResolver {
    results: HashMap<String, Resolved>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeResolver {
    /// Cada título se resuelve a `https://youtu.be/<título>`.
    pub fn with_titles(titles: &[&str]) -> Self {
        titles.iter().fold(Self::default(), |resolver, title| {
            resolver.with(
                title,
                Resolved::Single(TrackDescriptor::new(format!("https://youtu.be/{title}"), *title)),
            )
        })
    }

    pub fn with(mut self, query: &str, resolved: Resolved) -> Self {
        self.results.insert(query.to_string(), resolved);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, query: &str) -> Result<Resolved, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.results
            .get(query)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(query.to_string()))
    }
}

#[derive(Default)]
pub struct FakeOpener {
    failing: HashSet<String>,
    fail_all: bool,
}

impl FakeOpener {
    pub fn failing(references: &[&str]) -> Self {
        Self {
            failing: references.iter().map(|r| r.to_string()).collect(),
            fail_all: false,
        }
    }

    pub fn failing_all() -> Self {
        Self {
            failing: HashSet::new(),
            fail_all: true,
        }
    }
}

#[async_trait]
impl SourceOpener for FakeOpener {
    async fn open(&self, reference: &str) -> Result<AudioSource, ResolveError> {
        if self.fail_all || self.failing.contains(reference) {
            return Err(ResolveError::NoStream);
        }
        Ok(AudioSource::Http {
            url: reference.to_string(),
            headers: vec![],
        })
    }
}

/// Guarda cada notificación como texto corto: `added:<título>:<n>`,
/// `now:<título>`, `failed:<título>`.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn tracks_added(&self, _channel: ChannelId, notice: &AddedNotice) {
        self.events
            .lock()
            .push(format!("added:{}:{}", notice.first_title, notice.added));
    }

    async fn now_playing(&self, track: &Track) -> Option<NowPlayingMessage> {
        self.events.lock().push(format!("now:{}", track.display_title));
        None
    }

    async fn elapsed(&self, _message: &NowPlayingMessage, _track: &Track, _elapsed: Duration) -> bool {
        true
    }

    async fn playback_failed(&self, track: &Track, _reason: &str) {
        self.events.lock().push(format!("failed:{}", track.display_title));
    }
}
