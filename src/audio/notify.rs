use async_trait::async_trait;
use serenity::model::id::{ChannelId, MessageId};
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::{
    coordinator::{PlaybackState, Snapshot},
    queue::Track,
};

/// Cada cuánto se actualiza el tiempo transcurrido del mensaje "now playing".
pub const ELAPSED_TICK: Duration = Duration::from_secs(1);

/// Resumen de lo que se acaba de añadir a la cola.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedNotice {
    pub first_title: String,
    pub added: usize,
    pub playlist: bool,
    /// Posición (1-based) de la primera canción añadida.
    pub position: usize,
    pub queue_len: usize,
    pub capacity: usize,
    pub requested_by: String,
}

/// Mensaje de "now playing" ya enviado, para poder editarlo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NowPlayingMessage {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// Salida de notificaciones del coordinador hacia el chat.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn tracks_added(&self, channel: ChannelId, notice: &AddedNotice);

    /// Devuelve el mensaje enviado si se pudo enviar.
    async fn now_playing(&self, track: &Track) -> Option<NowPlayingMessage>;

    /// `false` si el mensaje ya no se puede editar; el contador se detiene sin ruido.
    async fn elapsed(&self, message: &NowPlayingMessage, track: &Track, elapsed: Duration) -> bool;

    async fn playback_failed(&self, track: &Track, reason: &str);
}

pub(crate) enum Notice {
    Added { channel: ChannelId, notice: AddedNotice },
    NowPlaying { track: Track, generation: u64 },
    Failed { track: Track, reason: String },
}

/// Entrega las notificaciones en orden, fuera del actor, para que una llamada
/// lenta a Discord no frene la reproducción.
pub(crate) fn spawn_notice_pump(
    notifier: Arc<dyn Notifier>,
    mut notices: mpsc::UnboundedReceiver<Notice>,
    snapshot: watch::Receiver<Snapshot>,
) {
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            match notice {
                Notice::Added { channel, notice } => notifier.tracks_added(channel, &notice).await,
                Notice::NowPlaying { track, generation } => {
                    if let Some(message) = notifier.now_playing(&track).await {
                        tokio::spawn(track_elapsed(
                            notifier.clone(),
                            message,
                            track,
                            generation,
                            snapshot.clone(),
                        ));
                    }
                }
                Notice::Failed { track, reason } => notifier.playback_failed(&track, &reason).await,
            }
        }
    });
}

/// Edita el mensaje cada segundo mientras la misma pista siga sonando.
/// En pausa el contador no avanza.
async fn track_elapsed(
    notifier: Arc<dyn Notifier>,
    message: NowPlayingMessage,
    track: Track,
    generation: u64,
    snapshot: watch::Receiver<Snapshot>,
) {
    let mut ticker = tokio::time::interval(ELAPSED_TICK);
    ticker.tick().await;
    let mut elapsed = Duration::ZERO;

    loop {
        ticker.tick().await;

        if snapshot.has_changed().is_err() {
            break;
        }
        let (current, state) = {
            let snap = snapshot.borrow();
            (snap.playing_generation, snap.state)
        };
        if current != Some(generation) {
            break;
        }
        if state != PlaybackState::Playing {
            continue;
        }

        elapsed += ELAPSED_TICK;
        if !notifier.elapsed(&message, &track, elapsed).await {
            break;
        }
    }

    debug!("⏱️ Contador detenido para: {}", track.display_title);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        coordinator::{CoordinatorDeps, CoordinatorSettings, PlaybackCoordinator},
        testing::{wait_for, FakeOpener, FakeResolver, FakeVoice},
    };
    use parking_lot::Mutex;
    use serenity::model::id::GuildId;

    #[derive(Default)]
    struct TickCounter {
        ticks: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Notifier for TickCounter {
        async fn tracks_added(&self, _channel: ChannelId, _notice: &AddedNotice) {}

        async fn now_playing(&self, track: &Track) -> Option<NowPlayingMessage> {
            Some(NowPlayingMessage {
                channel_id: track.origin_channel,
                message_id: MessageId::new(1),
            })
        }

        async fn elapsed(&self, _message: &NowPlayingMessage, _track: &Track, elapsed: Duration) -> bool {
            self.ticks.lock().push(elapsed);
            true
        }

        async fn playback_failed(&self, _track: &Track, _reason: &str) {}
    }

    #[tokio::test]
    async fn elapsed_updates_stop_when_playback_stops() {
        let notifier = Arc::new(TickCounter::default());
        let coordinator = PlaybackCoordinator::spawn(
            GuildId::new(1),
            CoordinatorDeps {
                resolver: Arc::new(FakeResolver::with_titles(&["A"])),
                opener: Arc::new(FakeOpener::default()),
                voice: Arc::new(FakeVoice::connected()),
                notifier: notifier.clone(),
            },
            CoordinatorSettings::default(),
        );
        coordinator
            .enqueue_search("A", "ana", ChannelId::new(3))
            .await
            .unwrap();

        wait_for("primer tick", || !notifier.ticks.lock().is_empty()).await;
        assert_eq!(notifier.ticks.lock()[0], ELAPSED_TICK);

        coordinator.stop().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_stop = notifier.ticks.lock().len();
        tokio::time::sleep(ELAPSED_TICK * 2).await;
        assert_eq!(notifier.ticks.lock().len(), after_stop);
    }
}
