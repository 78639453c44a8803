//! Per-guild playback coordinator.
//!
//! Each guild gets one actor task that owns the queue, the "now playing" slot
//! and the playback state machine. Callers talk to it through
//! [`PlaybackCoordinator`], a cheap cloneable handle that sends commands into
//! the actor's mailbox. Voice completion callbacks arrive the same way, so no
//! state is ever touched from the audio thread.
//!
//! Every armed playback carries a generation number. `stop` bumps it, so any
//! completion or source that was in flight before the stop is recognised as
//! stale and dropped.

use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    notify::{spawn_notice_pump, AddedNotice, Notice, Notifier},
    queue::{MusicQueue, QueuePage, SourceLabel, Track},
    voice::{AudioSource, OnComplete, PlaybackEnd, VoiceError, VoiceSession},
};
use crate::sources::{is_url, ResolveError, Resolved, SourceOpener, TrackResolver};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Voice(#[from] VoiceError),
    #[error("el reproductor de este servidor ya no está activo")]
    Closed,
}

/// Razones independientes por las que la música está en pausa.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PauseReasons {
    pub user: bool,
    pub speech: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused(PauseReasons),
    /// Transitorio: se limpió todo y se vuelve a Idle dentro del mismo comando.
    Stopped,
}

impl PlaybackState {
    pub fn label(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused(_) => "paused",
            PlaybackState::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    pub max_queue: usize,
    pub max_playlist: usize,
    pub max_consecutive_failures: u32,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            max_queue: 500,
            max_playlist: 200,
            max_consecutive_failures: 10,
        }
    }
}

/// Colaboradores externos de un coordinador.
#[derive(Clone)]
pub struct CoordinatorDeps {
    pub resolver: Arc<dyn TrackResolver>,
    pub opener: Arc<dyn SourceOpener>,
    pub voice: Arc<dyn VoiceSession>,
    pub notifier: Arc<dyn Notifier>,
}

/// Copia consistente del estado, publicada tras cada comando.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: PlaybackState,
    pub now_playing: Option<Track>,
    pub queued: Vec<String>,
    pub capacity: usize,
    pub generation: u64,
    /// Generación de la pista en el slot "now playing".
    pub playing_generation: Option<u64>,
    pub stale_completions: u64,
    pub consecutive_failures: u32,
    pub speech_active: bool,
    pub loading: bool,
}

impl Snapshot {
    fn empty(capacity: usize) -> Self {
        Self {
            state: PlaybackState::Idle,
            now_playing: None,
            queued: Vec::new(),
            capacity,
            generation: 0,
            playing_generation: None,
            stale_completions: 0,
            consecutive_failures: 0,
            speech_active: false,
            loading: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub added: usize,
    /// Rechazadas por cola llena.
    pub rejected: usize,
    /// Entradas de playlist sin referencia reproducible.
    pub skipped_unplayable: usize,
    pub queue_len: usize,
    pub capacity: usize,
    pub first_title: Option<String>,
    pub playlist: bool,
    /// Un `stop` llegó mientras se resolvía la búsqueda.
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipOutcome {
    pub was_playing: bool,
    pub skipped: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    Paused,
    Resumed,
    NothingPlaying,
}

enum Command {
    CurrentToken(oneshot::Sender<CancellationToken>),
    Enqueue {
        tracks: Vec<Track>,
        skipped_unplayable: usize,
        playlist: bool,
        requested_by: String,
        channel: ChannelId,
        token: CancellationToken,
        reply: oneshot::Sender<EnqueueOutcome>,
    },
    SourceOpened {
        generation: u64,
        track: Track,
        result: Result<AudioSource, ResolveError>,
    },
    TrackEnded {
        generation: u64,
        end: PlaybackEnd,
    },
    Skip(oneshot::Sender<SkipOutcome>),
    Stop(oneshot::Sender<bool>),
    Join {
        channel: ChannelId,
        reply: oneshot::Sender<Result<(), VoiceError>>,
    },
    Leave(oneshot::Sender<bool>),
    TogglePause(oneshot::Sender<Result<PauseOutcome, VoiceError>>),
    SpeechBegin(oneshot::Sender<bool>),
    PlaySpeech {
        source: AudioSource,
        on_complete: OnComplete,
        reply: oneshot::Sender<Result<(), VoiceError>>,
    },
    SpeechEnd(oneshot::Sender<()>),
}

/// Handle to one guild's playback actor.
#[derive(Clone)]
pub struct PlaybackCoordinator {
    guild_id: GuildId,
    mailbox: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    speech_gate: Arc<Mutex<()>>,
    resolver: Arc<dyn TrackResolver>,
    voice: Arc<dyn VoiceSession>,
    settings: CoordinatorSettings,
}

impl PlaybackCoordinator {
    /// Lanza el actor del servidor. Termina solo cuando se sueltan todos los handles.
    pub fn spawn(guild_id: GuildId, deps: CoordinatorDeps, settings: CoordinatorSettings) -> Self {
        let (mailbox, commands) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(Snapshot::empty(settings.max_queue));
        let (notices, notice_rx) = mpsc::unbounded_channel();

        spawn_notice_pump(deps.notifier.clone(), notice_rx, snapshot.clone());

        let actor = CoordinatorActor {
            guild_id,
            settings,
            opener: deps.opener,
            voice: deps.voice.clone(),
            mailbox: mailbox.downgrade(),
            notices,
            snapshot: snapshot_tx,
            queue: MusicQueue::new(settings.max_queue),
            now_playing: None,
            state: PlaybackState::Idle,
            generation: 0,
            loading: None,
            deferred: None,
            speech_active: false,
            consecutive_failures: 0,
            resolve_token: CancellationToken::new(),
            stale_completions: 0,
        };
        tokio::spawn(actor.run(commands));

        Self {
            guild_id,
            mailbox,
            snapshot,
            speech_gate: Arc::new(Mutex::new(())),
            resolver: deps.resolver,
            voice: deps.voice,
            settings,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// `true` si ambos handles hablan con el mismo actor.
    #[cfg(test)]
    pub(crate) fn same_instance(&self, other: &PlaybackCoordinator) -> bool {
        self.mailbox.same_channel(&other.mailbox)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CoordinatorError> {
        let (reply, response) = oneshot::channel();
        self.mailbox
            .send(build(reply))
            .map_err(|_| CoordinatorError::Closed)?;
        response.await.map_err(|_| CoordinatorError::Closed)
    }

    /// Resuelve `query` y encola el resultado.
    ///
    /// La resolución corre fuera del actor: el servidor sigue respondiendo a
    /// `skip`/`stop` mientras tanto. Un `stop` durante la resolución cancela el
    /// resultado y no se encola nada.
    pub async fn enqueue_search(
        &self,
        query: &str,
        requested_by: &str,
        reply_channel: ChannelId,
    ) -> Result<EnqueueOutcome, CoordinatorError> {
        let token = self.request(Command::CurrentToken).await?;
        let label = if is_url(query.trim()) {
            SourceLabel::Direct
        } else {
            SourceLabel::ResolvedSearch
        };

        info!("🔍 Resolviendo '{}' para guild {}", query, self.guild_id);
        let resolved = tokio::select! {
            _ = token.cancelled() => {
                info!("🚫 Resolución cancelada por stop en guild {}", self.guild_id);
                return Ok(EnqueueOutcome { cancelled: true, ..Default::default() });
            }
            resolved = self.resolver.resolve(query) => resolved?,
        };

        let (descriptors, playlist) = match resolved {
            Resolved::Single(descriptor) => (vec![descriptor], false),
            Resolved::Playlist(mut entries) => {
                if entries.len() > self.settings.max_playlist {
                    debug!(
                        "✂️ Playlist truncada de {} a {} entradas",
                        entries.len(),
                        self.settings.max_playlist
                    );
                    entries.truncate(self.settings.max_playlist);
                }
                (entries, true)
            }
        };

        let mut skipped_unplayable = 0;
        let tracks: Vec<Track> = descriptors
            .into_iter()
            .filter_map(|descriptor| match descriptor.reference {
                Some(reference) if !reference.trim().is_empty() => Some(Track {
                    source_url: reference,
                    display_title: descriptor.title,
                    requested_by: requested_by.to_string(),
                    origin_channel: reply_channel,
                    source_label: label,
                }),
                _ => {
                    skipped_unplayable += 1;
                    None
                }
            })
            .collect();

        if tracks.is_empty() && !playlist {
            return Err(ResolveError::Unusable(query.to_string()).into());
        }

        self.request(|reply| Command::Enqueue {
            tracks,
            skipped_unplayable,
            playlist,
            requested_by: requested_by.to_string(),
            channel: reply_channel,
            token,
            reply,
        })
        .await
    }

    pub async fn skip(&self) -> Result<SkipOutcome, CoordinatorError> {
        self.request(Command::Skip).await
    }

    /// Devuelve si había algo activo (sonando, cargando o en cola).
    pub async fn stop(&self) -> Result<bool, CoordinatorError> {
        self.request(Command::Stop).await
    }

    pub async fn join(&self, channel: ChannelId) -> Result<(), CoordinatorError> {
        self.request(|reply| Command::Join { channel, reply })
            .await?
            .map_err(CoordinatorError::from)
    }

    /// Devuelve si había conexión de voz.
    pub async fn leave(&self) -> Result<bool, CoordinatorError> {
        self.request(Command::Leave).await
    }

    pub async fn toggle_pause(&self) -> Result<PauseOutcome, CoordinatorError> {
        self.request(Command::TogglePause)
            .await?
            .map_err(CoordinatorError::from)
    }

    pub fn now_playing(&self) -> Option<Track> {
        self.snapshot.borrow().now_playing.clone()
    }

    pub fn list_queue(&self, page: usize, page_size: usize) -> QueuePage {
        QueuePage::from_titles(&self.snapshot.borrow().queued, page, page_size)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub async fn voice_connected(&self) -> bool {
        self.voice.is_connected().await
    }

    /// Turno de locución del servidor: una sola a la vez, en orden de llegada.
    pub(crate) fn speech_gate(&self) -> Arc<Mutex<()>> {
        self.speech_gate.clone()
    }

    /// Pausa la música (si suena) y bloquea el avance hasta `end_speech`.
    pub(crate) async fn begin_speech(&self) -> Result<bool, CoordinatorError> {
        self.request(Command::SpeechBegin).await
    }

    pub(crate) async fn play_speech(
        &self,
        source: AudioSource,
        on_complete: OnComplete,
    ) -> Result<(), CoordinatorError> {
        self.request(|reply| Command::PlaySpeech {
            source,
            on_complete,
            reply,
        })
        .await?
        .map_err(CoordinatorError::from)
    }

    pub(crate) async fn end_speech(&self) -> Result<(), CoordinatorError> {
        self.request(Command::SpeechEnd).await
    }

    #[cfg(test)]
    pub(crate) fn inject_completion(&self, generation: u64, end: PlaybackEnd) {
        let _ = self.mailbox.send(Command::TrackEnded { generation, end });
    }
}

struct NowPlaying {
    track: Track,
    generation: u64,
}

/// Fuente ya abierta que espera a que termine una locución.
struct Deferred {
    generation: u64,
    track: Track,
    source: AudioSource,
}

struct CoordinatorActor {
    guild_id: GuildId,
    settings: CoordinatorSettings,
    opener: Arc<dyn SourceOpener>,
    voice: Arc<dyn VoiceSession>,
    mailbox: mpsc::WeakUnboundedSender<Command>,
    notices: mpsc::UnboundedSender<Notice>,
    snapshot: watch::Sender<Snapshot>,
    queue: MusicQueue,
    now_playing: Option<NowPlaying>,
    state: PlaybackState,
    generation: u64,
    /// Generación de la fuente que se está abriendo.
    loading: Option<u64>,
    deferred: Option<Deferred>,
    speech_active: bool,
    consecutive_failures: u32,
    resolve_token: CancellationToken,
    stale_completions: u64,
}

impl CoordinatorActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!("🎛️ Coordinador iniciado para guild {}", self.guild_id);

        while let Some(command) = commands.recv().await {
            self.handle(command).await;
            self.publish();
        }

        self.resolve_token.cancel();
        debug!("🎛️ Coordinador terminado para guild {}", self.guild_id);
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::CurrentToken(reply) => {
                let _ = reply.send(self.resolve_token.clone());
            }
            Command::Enqueue {
                tracks,
                skipped_unplayable,
                playlist,
                requested_by,
                channel,
                token,
                reply,
            } => {
                let outcome = self
                    .enqueue(tracks, skipped_unplayable, playlist, requested_by, channel, token)
                    .await;
                self.reply(reply, outcome);
            }
            Command::SourceOpened {
                generation,
                track,
                result,
            } => self.source_opened(generation, track, result).await,
            Command::TrackEnded { generation, end } => self.track_ended(generation, end).await,
            Command::Skip(reply) => {
                let outcome = self.skip().await;
                self.reply(reply, outcome);
            }
            Command::Stop(reply) => {
                let was_active = self.stop_all("stop").await;
                self.reply(reply, was_active);
            }
            Command::Join { channel, reply } => match self.voice.connect(channel).await {
                Ok(()) => {
                    self.consecutive_failures = 0;
                    self.start_if_idle().await;
                    self.reply(reply, Ok(()));
                }
                Err(e) => {
                    warn!("❌ No se pudo conectar a voz en guild {}: {}", self.guild_id, e);
                    self.reply(reply, Err(e));
                }
            },
            Command::Leave(reply) => {
                let was_connected = self.voice.is_connected().await;
                self.stop_all("leave").await;
                if let Err(e) = self.voice.disconnect().await {
                    warn!("⚠️ Error al desconectar en guild {}: {}", self.guild_id, e);
                }
                self.reply(reply, was_connected);
            }
            Command::TogglePause(reply) => {
                let outcome = self.toggle_pause().await;
                self.reply(reply, outcome);
            }
            Command::SpeechBegin(reply) => {
                let paused = self.begin_speech().await;
                self.reply(reply, paused);
            }
            Command::PlaySpeech {
                source,
                on_complete,
                reply,
            } => {
                let result = self.voice.play_overlay(source, on_complete).await;
                self.reply(reply, result);
            }
            Command::SpeechEnd(reply) => {
                self.end_speech().await;
                self.reply(reply, ());
            }
        }
    }

    /// Publica el estado antes de contestar, para que quien espera la respuesta
    /// ya vea el snapshot nuevo.
    fn reply<T>(&self, reply: oneshot::Sender<T>, value: T) {
        self.publish();
        let _ = reply.send(value);
    }

    fn publish(&self) {
        self.snapshot.send_replace(Snapshot {
            state: self.state,
            now_playing: self.now_playing.as_ref().map(|np| np.track.clone()),
            queued: self.queue.peek_titles(),
            capacity: self.queue.capacity(),
            generation: self.generation,
            playing_generation: self.now_playing.as_ref().map(|np| np.generation),
            stale_completions: self.stale_completions,
            consecutive_failures: self.consecutive_failures,
            speech_active: self.speech_active,
            loading: self.loading.is_some(),
        });
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    async fn enqueue(
        &mut self,
        tracks: Vec<Track>,
        skipped_unplayable: usize,
        playlist: bool,
        requested_by: String,
        channel: ChannelId,
        token: CancellationToken,
    ) -> EnqueueOutcome {
        if token.is_cancelled() {
            info!("🚫 Resultado descartado tras stop en guild {}", self.guild_id);
            return EnqueueOutcome {
                cancelled: true,
                ..Default::default()
            };
        }

        let position = self.queue.len() + 1;
        let mut outcome = EnqueueOutcome {
            skipped_unplayable,
            playlist,
            capacity: self.queue.capacity(),
            ..Default::default()
        };

        for track in tracks {
            let title = track.display_title.clone();
            if self.queue.enqueue(track) {
                outcome.added += 1;
                outcome.first_title.get_or_insert(title);
            } else {
                outcome.rejected += 1;
            }
        }
        outcome.queue_len = self.queue.len();

        if outcome.rejected > 0 {
            warn!(
                "🚫 Cola llena en guild {}: {} canciones rechazadas",
                self.guild_id, outcome.rejected
            );
        }

        if let Some(first_title) = outcome.first_title.clone() {
            info!(
                "➕ {} canciones añadidas en guild {} (cola: {}/{})",
                outcome.added,
                self.guild_id,
                outcome.queue_len,
                outcome.capacity
            );
            self.consecutive_failures = 0;
            self.notify(Notice::Added {
                channel,
                notice: AddedNotice {
                    first_title,
                    added: outcome.added,
                    playlist,
                    position,
                    queue_len: outcome.queue_len,
                    capacity: outcome.capacity,
                    requested_by,
                },
            });
        }

        self.start_if_idle().await;
        outcome
    }

    /// Arranca la siguiente canción si no hay nada sonando ni cargando.
    async fn start_if_idle(&mut self) {
        if self.loading.is_some() || self.now_playing.is_some() || self.speech_active {
            return;
        }
        if self.queue.is_empty() {
            return;
        }
        if self.consecutive_failures >= self.settings.max_consecutive_failures {
            warn!(
                "🛑 {} fallos seguidos en guild {}, la cola queda en espera",
                self.consecutive_failures, self.guild_id
            );
            return;
        }
        if !self.voice.is_connected().await {
            debug!("🔇 Sin conexión de voz en guild {}, la cola espera", self.guild_id);
            return;
        }
        if self.voice.is_playing().await {
            warn!("⚠️ La sesión de voz ya está reproduciendo en guild {}", self.guild_id);
            return;
        }

        let Some(track) = self.queue.dequeue() else {
            return;
        };

        self.generation += 1;
        let generation = self.generation;
        self.loading = Some(generation);
        debug!(
            "📥 Abriendo fuente para '{}' (generación {})",
            track.display_title, generation
        );

        let opener = self.opener.clone();
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let result = opener.open(&track.source_url).await;
            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox.send(Command::SourceOpened {
                    generation,
                    track,
                    result,
                });
            }
        });
    }

    async fn source_opened(
        &mut self,
        generation: u64,
        track: Track,
        result: Result<AudioSource, ResolveError>,
    ) {
        if self.loading != Some(generation) {
            debug!(
                "🗑️ Fuente obsoleta descartada para '{}' (generación {})",
                track.display_title, generation
            );
            return;
        }

        match result {
            Err(e) => {
                self.loading = None;
                self.record_failure(track, e.to_string());
                self.start_if_idle().await;
            }
            Ok(source) if self.speech_active => {
                debug!("⏳ '{}' espera a que termine la locución", track.display_title);
                self.deferred = Some(Deferred {
                    generation,
                    track,
                    source,
                });
            }
            Ok(source) => {
                self.loading = None;
                self.begin_playback(generation, track, source).await;
            }
        }
    }

    async fn begin_playback(&mut self, generation: u64, track: Track, source: AudioSource) {
        let mailbox = self.mailbox.clone();
        let on_complete: OnComplete = Box::new(move |end| {
            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox.send(Command::TrackEnded { generation, end });
            }
        });

        match self.voice.play(source, on_complete).await {
            Ok(()) => {
                info!(
                    "🎵 Reproduciendo: {} ({}) en guild {}",
                    track.display_title,
                    track.source_label.as_str(),
                    self.guild_id
                );
                self.consecutive_failures = 0;
                self.state = PlaybackState::Playing;
                self.now_playing = Some(NowPlaying {
                    track: track.clone(),
                    generation,
                });
                self.notify(Notice::NowPlaying { track, generation });
            }
            Err(e) => {
                self.record_failure(track, e.to_string());
                self.start_if_idle().await;
            }
        }
    }

    fn record_failure(&mut self, track: Track, reason: String) {
        self.consecutive_failures += 1;
        error!(
            "❌ No se pudo reproducir '{}' en guild {}: {} ({} seguidos)",
            track.display_title, self.guild_id, reason, self.consecutive_failures
        );
        self.notify(Notice::Failed { track, reason });
    }

    async fn track_ended(&mut self, generation: u64, end: PlaybackEnd) {
        let current = self.now_playing.as_ref().map(|np| np.generation);
        if current != Some(generation) {
            self.stale_completions += 1;
            debug!(
                "🗑️ Callback de fin obsoleto en guild {} (generación {}, actual {:?})",
                self.guild_id, generation, current
            );
            return;
        }

        let Some(finished) = self.now_playing.take() else {
            return;
        };
        self.state = PlaybackState::Idle;

        match end {
            PlaybackEnd::Finished => {
                debug!("⏹️ Terminó: {}", finished.track.display_title);
            }
            PlaybackEnd::Failed(reason) => {
                error!(
                    "❌ Error durante la reproducción de '{}': {}",
                    finished.track.display_title, reason
                );
                self.notify(Notice::Failed {
                    track: finished.track,
                    reason,
                });
            }
        }

        self.start_if_idle().await;
    }

    async fn skip(&mut self) -> SkipOutcome {
        let Some(current) = self.now_playing.as_ref() else {
            debug!("⏭️ Skip sin nada sonando en guild {}", self.guild_id);
            return SkipOutcome {
                was_playing: false,
                skipped: None,
            };
        };
        let skipped = current.track.display_title.clone();
        self.consecutive_failures = 0;

        // El callback de fin hace avanzar la cola
        if let Err(e) = self.voice.stop().await {
            warn!("⚠️ Error al saltar en guild {}: {}", self.guild_id, e);
            self.now_playing = None;
            self.state = PlaybackState::Idle;
            self.start_if_idle().await;
        }

        info!("⏭️ Saltada: {} en guild {}", skipped, self.guild_id);
        SkipOutcome {
            was_playing: true,
            skipped: Some(skipped),
        }
    }

    /// Vacía todo y vuelve a Idle. Idempotente.
    async fn stop_all(&mut self, reason: &str) -> bool {
        let was_active =
            self.now_playing.is_some() || self.loading.is_some() || !self.queue.is_empty();

        self.generation += 1;
        self.resolve_token.cancel();
        self.resolve_token = CancellationToken::new();
        self.queue.clear();
        self.loading = None;
        self.deferred = None;
        self.consecutive_failures = 0;

        let playing = self.now_playing.take();
        self.state = PlaybackState::Stopped;
        if playing.is_some() {
            if let Err(e) = self.voice.stop().await {
                warn!("⚠️ Error al detener en guild {}: {}", self.guild_id, e);
            }
        }
        self.state = PlaybackState::Idle;

        if was_active {
            info!("⏹️ Reproducción detenida ({}) en guild {}", reason, self.guild_id);
        }
        was_active
    }

    async fn toggle_pause(&mut self) -> Result<PauseOutcome, VoiceError> {
        match self.state {
            PlaybackState::Playing => {
                self.voice.pause().await?;
                self.state = PlaybackState::Paused(PauseReasons {
                    user: true,
                    speech: false,
                });
                info!("⏸️ Pausado por usuario en guild {}", self.guild_id);
                Ok(PauseOutcome::Paused)
            }
            PlaybackState::Paused(mut reasons) if reasons.user => {
                reasons.user = false;
                if !reasons.speech {
                    self.voice.resume().await?;
                    self.state = PlaybackState::Playing;
                    info!("▶️ Reanudado por usuario en guild {}", self.guild_id);
                } else {
                    self.state = PlaybackState::Paused(reasons);
                }
                Ok(PauseOutcome::Resumed)
            }
            PlaybackState::Paused(mut reasons) => {
                // Ya en pausa por una locución: sigue pausado al terminar
                reasons.user = true;
                self.state = PlaybackState::Paused(reasons);
                Ok(PauseOutcome::Paused)
            }
            PlaybackState::Idle | PlaybackState::Stopped => Ok(PauseOutcome::NothingPlaying),
        }
    }

    async fn begin_speech(&mut self) -> bool {
        self.speech_active = true;

        match self.state {
            PlaybackState::Playing => match self.voice.pause().await {
                Ok(()) => {
                    self.state = PlaybackState::Paused(PauseReasons {
                        user: false,
                        speech: true,
                    });
                    debug!("⏸️ Música pausada para locución en guild {}", self.guild_id);
                    true
                }
                Err(e) => {
                    warn!("⚠️ No se pudo pausar para la locución: {}", e);
                    false
                }
            },
            PlaybackState::Paused(mut reasons) => {
                reasons.speech = true;
                self.state = PlaybackState::Paused(reasons);
                false
            }
            PlaybackState::Idle | PlaybackState::Stopped => false,
        }
    }

    async fn end_speech(&mut self) {
        self.speech_active = false;
        if let Err(e) = self.voice.stop_overlay().await {
            debug!("Error al cortar la locución: {}", e);
        }

        if !self.voice.is_connected().await {
            if self.now_playing.is_some() || self.deferred.is_some() {
                warn!(
                    "🔌 Voz desconectada durante la locución en guild {}, no se reanuda",
                    self.guild_id
                );
            }
            self.generation += 1;
            self.now_playing = None;
            self.deferred = None;
            self.loading = None;
            self.state = PlaybackState::Idle;
            return;
        }

        if let PlaybackState::Paused(mut reasons) = self.state {
            reasons.speech = false;
            if reasons.user {
                self.state = PlaybackState::Paused(reasons);
            } else {
                match self.voice.resume().await {
                    Ok(()) => {
                        debug!("▶️ Música reanudada tras locución en guild {}", self.guild_id);
                        self.state = PlaybackState::Playing;
                    }
                    Err(e) => {
                        error!("❌ No se pudo reanudar en guild {}: {}", self.guild_id, e);
                        self.generation += 1;
                        self.now_playing = None;
                        self.state = PlaybackState::Idle;
                    }
                }
            }
        }

        if let Some(deferred) = self.deferred.take() {
            if self.loading == Some(deferred.generation) {
                self.loading = None;
                self.begin_playback(deferred.generation, deferred.track, deferred.source)
                    .await;
                return;
            }
        }

        self.start_if_idle().await;
    }
}
