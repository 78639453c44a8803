use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::info;

use super::{
    coordinator::{
        CoordinatorDeps, CoordinatorError, CoordinatorSettings, EnqueueOutcome, PauseOutcome,
        PlaybackCoordinator, SkipOutcome, Snapshot,
    },
    notify::Notifier,
    queue::{QueuePage, Track},
    speech::SpeechBridge,
    voice::VoiceSession,
};
use crate::sources::{SourceOpener, TrackResolver};

/// Crea la sesión de voz de un servidor.
pub type VoiceFactory = Arc<dyn Fn(GuildId) -> Arc<dyn VoiceSession> + Send + Sync>;

/// Mapa de servidor a coordinador, creado a demanda.
///
/// Los coordinadores viven lo que vive el proceso. Al quitar una entrada del
/// mapa se suelta el último handle y el actor termina solo.
pub struct GuildRegistry {
    coordinators: DashMap<GuildId, PlaybackCoordinator>,
    resolver: Arc<dyn TrackResolver>,
    opener: Arc<dyn SourceOpener>,
    notifier: Arc<dyn Notifier>,
    voice_factory: VoiceFactory,
    settings: CoordinatorSettings,
    speech: Arc<SpeechBridge>,
}

impl GuildRegistry {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        opener: Arc<dyn SourceOpener>,
        notifier: Arc<dyn Notifier>,
        voice_factory: VoiceFactory,
        settings: CoordinatorSettings,
        speech: Arc<SpeechBridge>,
    ) -> Self {
        Self {
            coordinators: DashMap::new(),
            resolver,
            opener,
            notifier,
            voice_factory,
            settings,
            speech,
        }
    }

    /// Obtiene o crea el coordinador del servidor. Bajo carrera, todos reciben el mismo.
    pub fn get_or_create(&self, guild_id: GuildId) -> PlaybackCoordinator {
        self.coordinators
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🎛️ Nuevo coordinador para guild {}", guild_id);
                PlaybackCoordinator::spawn(
                    guild_id,
                    CoordinatorDeps {
                        resolver: self.resolver.clone(),
                        opener: self.opener.clone(),
                        voice: (self.voice_factory)(guild_id),
                        notifier: self.notifier.clone(),
                    },
                    self.settings,
                )
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<PlaybackCoordinator> {
        self.coordinators.get(&guild_id).map(|entry| entry.clone())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.coordinators.len()
    }

    pub fn speech(&self) -> &SpeechBridge {
        &self.speech
    }

    pub async fn enqueue_search(
        &self,
        guild_id: GuildId,
        query: &str,
        requested_by: &str,
        reply_channel: ChannelId,
    ) -> Result<EnqueueOutcome, CoordinatorError> {
        self.get_or_create(guild_id)
            .enqueue_search(query, requested_by, reply_channel)
            .await
    }

    pub async fn skip(&self, guild_id: GuildId) -> Result<SkipOutcome, CoordinatorError> {
        match self.get(guild_id) {
            Some(coordinator) => coordinator.skip().await,
            None => Ok(SkipOutcome {
                was_playing: false,
                skipped: None,
            }),
        }
    }

    pub async fn stop(&self, guild_id: GuildId) -> Result<bool, CoordinatorError> {
        match self.get(guild_id) {
            Some(coordinator) => coordinator.stop().await,
            None => Ok(false),
        }
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<Track> {
        self.get(guild_id).and_then(|c| c.now_playing())
    }

    pub fn list_queue(&self, guild_id: GuildId, page: usize, page_size: usize) -> QueuePage {
        match self.get(guild_id) {
            Some(coordinator) => coordinator.list_queue(page, page_size),
            None => QueuePage::from_titles(&[], page, page_size),
        }
    }

    pub fn snapshot(&self, guild_id: GuildId) -> Option<Snapshot> {
        self.get(guild_id).map(|c| c.snapshot())
    }

    pub async fn speak(&self, guild_id: GuildId, text: &str) -> bool {
        let coordinator = self.get_or_create(guild_id);
        self.speech.speak(&coordinator, text).await
    }

    pub async fn join(&self, guild_id: GuildId, channel: ChannelId) -> Result<(), CoordinatorError> {
        self.get_or_create(guild_id).join(channel).await
    }

    pub async fn leave(&self, guild_id: GuildId) -> Result<bool, CoordinatorError> {
        match self.get(guild_id) {
            Some(coordinator) => coordinator.leave().await,
            None => Ok(false),
        }
    }

    pub async fn toggle_pause(&self, guild_id: GuildId) -> Result<PauseOutcome, CoordinatorError> {
        match self.get(guild_id) {
            Some(coordinator) => coordinator.toggle_pause().await,
            None => Ok(PauseOutcome::NothingPlaying),
        }
    }
}
