use std::{io::Write, path::Path, sync::Arc, time::Duration};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{
    coordinator::PlaybackCoordinator,
    voice::{AudioSource, PlaybackEnd},
};
use crate::tts::{clean_text, SpeechError, SpeechSynthesizer};

/// Interrumpe la música con una locución sintetizada y la reanuda después.
///
/// Una sola locución por servidor: las demás esperan su turno en orden.
pub struct SpeechBridge {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    max_chars: usize,
    poll_interval: Duration,
    timeout: Duration,
}

impl SpeechBridge {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        max_chars: usize,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            synthesizer,
            max_chars,
            poll_interval,
            timeout,
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Devuelve `true` si la locución se reprodujo completa.
    pub async fn speak(&self, coordinator: &PlaybackCoordinator, text: &str) -> bool {
        match self.try_speak(coordinator, text).await {
            Ok(()) => true,
            Err(e) => {
                warn!("🗣️ Locución fallida en guild {}: {}", coordinator.guild_id(), e);
                false
            }
        }
    }

    pub async fn try_speak(&self, coordinator: &PlaybackCoordinator, text: &str) -> Result<(), SpeechError> {
        let len = text.chars().count();
        if len > self.max_chars {
            return Err(SpeechError::TooLong {
                len,
                max: self.max_chars,
            });
        }
        let text = clean_text(text);
        if text.is_empty() {
            return Err(SpeechError::Empty);
        }

        let gate = coordinator.speech_gate();
        let _turn = gate.lock().await;

        if !coordinator.voice_connected().await {
            return Err(SpeechError::NotConnected);
        }

        let paused_music = coordinator.begin_speech().await?;
        if paused_music {
            debug!("⏸️ Música en pausa para hablar en guild {}", coordinator.guild_id());
        }

        let outcome = self.synthesize_and_play(coordinator, &text).await;

        // Siempre se cierra la locución, haya ido bien o no
        if let Err(e) = coordinator.end_speech().await {
            warn!("⚠️ No se pudo cerrar la locución: {}", e);
        }

        if outcome.is_ok() {
            info!("🗣️ Locución completada en guild {}", coordinator.guild_id());
        }
        outcome
    }

    async fn synthesize_and_play(&self, coordinator: &PlaybackCoordinator, text: &str) -> Result<(), SpeechError> {
        let audio = self.synthesizer.synthesize(text).await?;

        let mut file = tempfile::Builder::new()
            .prefix("kaivoxx-tts-")
            .suffix(".mp3")
            .tempfile()?;
        file.write_all(&audio)?;
        file.flush()?;
        let path = file.into_temp_path();

        let outcome = self.play_and_wait(coordinator, &path).await;

        if let Err(e) = path.close() {
            warn!("⚠️ No se pudo borrar el audio temporal: {}", e);
        }
        outcome
    }

    /// Espera el fin de la locución revisando la conexión cada `poll_interval`.
    async fn play_and_wait(&self, coordinator: &PlaybackCoordinator, path: &Path) -> Result<(), SpeechError> {
        let (done_tx, mut done) = oneshot::channel();
        coordinator
            .play_speech(
                AudioSource::File(path.to_path_buf()),
                Box::new(move |end| {
                    let _ = done_tx.send(end);
                }),
            )
            .await?;

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        let mut poll = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                end = &mut done => {
                    return match end {
                        // Un leave también corta la locución como si hubiera terminado
                        Ok(PlaybackEnd::Finished) if !coordinator.voice_connected().await => {
                            Err(SpeechError::Disconnected)
                        }
                        Ok(PlaybackEnd::Finished) => Ok(()),
                        Ok(PlaybackEnd::Failed(reason)) => Err(SpeechError::Playback(reason)),
                        Err(_) => Err(SpeechError::Playback("la pista se soltó sin terminar".into())),
                    };
                }
                _ = poll.tick() => {
                    if !coordinator.voice_connected().await {
                        return Err(SpeechError::Disconnected);
                    }
                }
                _ = &mut deadline => return Err(SpeechError::Timeout),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        coordinator::{CoordinatorDeps, CoordinatorSettings, PauseOutcome, PauseReasons, PlaybackState},
        testing::{wait_for, FakeOpener, FakeResolver, FakeVoice, RecordingNotifier},
    };
    use crate::tts::MockSpeechSynthesizer;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, GuildId};

    const CHANNEL: ChannelId = ChannelId::new(42);

    fn synth_ok() -> MockSpeechSynthesizer {
        let mut synth = MockSpeechSynthesizer::new();
        synth.expect_name().return_const("mock");
        synth
            .expect_synthesize()
            .returning(|_| Ok(Bytes::from_static(b"ID3fake")));
        synth
    }

    fn bridge(synth: MockSpeechSynthesizer) -> Arc<SpeechBridge> {
        Arc::new(SpeechBridge::new(
            Arc::new(synth),
            180,
            Duration::from_millis(10),
            Duration::from_secs(2),
        ))
    }

    fn coordinator(voice: Arc<FakeVoice>) -> PlaybackCoordinator {
        PlaybackCoordinator::spawn(
            GuildId::new(9),
            CoordinatorDeps {
                resolver: Arc::new(FakeResolver::with_titles(&["A", "B"])),
                opener: Arc::new(FakeOpener::default()),
                voice,
                notifier: Arc::new(RecordingNotifier::default()),
            },
            CoordinatorSettings::default(),
        )
    }

    async fn playing(coordinator: &PlaybackCoordinator, title: &str) {
        coordinator.enqueue_search(title, "ana", CHANNEL).await.unwrap();
        wait_for("suena", || {
            coordinator.now_playing().map(|t| t.display_title).as_deref() == Some(title)
        })
        .await;
    }

    #[tokio::test]
    async fn speech_pauses_and_resumes_the_same_track() {
        let voice = Arc::new(FakeVoice::connected());
        let coordinator = coordinator(voice.clone());
        playing(&coordinator, "B").await;
        let bridge = bridge(synth_ok());

        let task = {
            let (bridge, coordinator) = (bridge.clone(), coordinator.clone());
            tokio::spawn(async move { bridge.speak(&coordinator, "hola").await })
        };

        wait_for("locución en curso", || voice.overlay_count() == 1).await;
        assert!(voice.music_paused());
        assert_eq!(
            coordinator.snapshot().state,
            PlaybackState::Paused(PauseReasons {
                user: false,
                speech: true
            })
        );
        assert_eq!(coordinator.now_playing().unwrap().display_title, "B");

        voice.finish_overlay();
        assert!(task.await.unwrap());

        assert!(!voice.music_paused());
        assert_eq!(coordinator.snapshot().state, PlaybackState::Playing);
        assert_eq!(coordinator.now_playing().unwrap().display_title, "B");
        // Reanudada, no reiniciada
        assert_eq!(voice.play_count(), 1);
    }

    #[tokio::test]
    async fn temp_audio_is_removed_after_speaking() {
        let voice = Arc::new(FakeVoice::connected().with_overlay_duration(Duration::from_millis(20)));
        let coordinator = coordinator(voice.clone());

        assert!(bridge(synth_ok()).speak(&coordinator, "hola").await);

        match voice.overlay_sources().as_slice() {
            [AudioSource::File(path)] => assert!(!path.exists()),
            other => panic!("fuente inesperada: {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_speech_never_overlaps() {
        let voice = Arc::new(FakeVoice::connected().with_overlay_duration(Duration::from_millis(40)));
        let coordinator = coordinator(voice.clone());
        playing(&coordinator, "A").await;
        let bridge = bridge(synth_ok());

        let tasks: Vec<_> = ["uno", "dos"]
            .into_iter()
            .map(|text| {
                let (bridge, coordinator) = (bridge.clone(), coordinator.clone());
                tokio::spawn(async move { bridge.speak(&coordinator, text).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }

        assert_eq!(voice.overlay_count(), 2);
        assert_eq!(voice.max_concurrent_overlays(), 1);
        assert_eq!(coordinator.snapshot().state, PlaybackState::Playing);
        assert!(!voice.music_paused());
    }

    #[tokio::test]
    async fn too_long_text_is_rejected_before_touching_music() {
        let voice = Arc::new(FakeVoice::connected());
        let coordinator = coordinator(voice.clone());
        playing(&coordinator, "A").await;
        let mut synth = MockSpeechSynthesizer::new();
        synth.expect_synthesize().never();

        let long = "a".repeat(181);
        let result = bridge(synth).try_speak(&coordinator, &long).await;

        assert!(matches!(result, Err(SpeechError::TooLong { len: 181, max: 180 })));
        assert_eq!(coordinator.snapshot().state, PlaybackState::Playing);
        assert_eq!(voice.overlay_count(), 0);
    }

    #[tokio::test]
    async fn synthesis_failure_leaves_music_playing() {
        let voice = Arc::new(FakeVoice::connected());
        let coordinator = coordinator(voice.clone());
        playing(&coordinator, "A").await;
        let mut synth = MockSpeechSynthesizer::new();
        synth
            .expect_synthesize()
            .times(1)
            .returning(|_| Err(SpeechError::AllProvidersFailed));

        assert!(!bridge(synth).speak(&coordinator, "hola").await);

        assert_eq!(coordinator.snapshot().state, PlaybackState::Playing);
        assert!(!voice.music_paused());
        assert_eq!(voice.overlay_count(), 0);
        assert!(!coordinator.snapshot().speech_active);
    }

    #[tokio::test]
    async fn disconnect_mid_speech_leaves_idle() {
        let voice = Arc::new(FakeVoice::connected());
        let coordinator = coordinator(voice.clone());
        playing(&coordinator, "A").await;
        let bridge = bridge(synth_ok());

        let task = {
            let (bridge, coordinator) = (bridge.clone(), coordinator.clone());
            tokio::spawn(async move { bridge.try_speak(&coordinator, "hola").await })
        };
        wait_for("locución en curso", || voice.overlay_count() == 1).await;

        voice.drop_connection();
        let result = task.await.unwrap();

        assert!(matches!(result, Err(SpeechError::Disconnected)));
        let snap = coordinator.snapshot();
        assert_eq!(snap.state, PlaybackState::Idle);
        assert!(snap.now_playing.is_none());
    }

    #[tokio::test]
    async fn leave_mid_speech_reports_the_cut() {
        let voice = Arc::new(FakeVoice::connected());
        let coordinator = coordinator(voice.clone());
        playing(&coordinator, "A").await;
        let bridge = bridge(synth_ok());

        let task = {
            let (bridge, coordinator) = (bridge.clone(), coordinator.clone());
            tokio::spawn(async move { bridge.try_speak(&coordinator, "hola").await })
        };
        wait_for("locución en curso", || voice.overlay_count() == 1).await;

        assert!(coordinator.leave().await.unwrap());
        let result = task.await.unwrap();

        assert!(matches!(result, Err(SpeechError::Disconnected)));
        let snap = coordinator.snapshot();
        assert_eq!(snap.state, PlaybackState::Idle);
        assert!(snap.now_playing.is_none());
        assert!(!snap.speech_active);
    }

    #[tokio::test]
    async fn skip_during_speech_waits_before_the_next_track() {
        let voice = Arc::new(FakeVoice::connected());
        let coordinator = coordinator(voice.clone());
        playing(&coordinator, "A").await;
        coordinator.enqueue_search("B", "ana", CHANNEL).await.unwrap();
        let bridge = bridge(synth_ok());

        let task = {
            let (bridge, coordinator) = (bridge.clone(), coordinator.clone());
            tokio::spawn(async move { bridge.speak(&coordinator, "hola").await })
        };
        wait_for("locución en curso", || voice.overlay_count() == 1).await;

        let outcome = coordinator.skip().await.unwrap();
        assert!(outcome.was_playing);
        assert_eq!(outcome.skipped.as_deref(), Some("A"));
        wait_for("A liberada", || coordinator.now_playing().is_none()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(voice.play_count(), 1);
        assert_eq!(coordinator.snapshot().queued, vec!["B".to_string()]);

        voice.finish_overlay();
        assert!(task.await.unwrap());
        wait_for("B suena", || voice.play_count() == 2).await;
        assert_eq!(coordinator.now_playing().unwrap().display_title, "B");
        assert_eq!(coordinator.snapshot().state, PlaybackState::Playing);
    }

    #[tokio::test]
    async fn skip_while_user_paused_plays_the_next_track() {
        let voice = Arc::new(FakeVoice::connected());
        let coordinator = coordinator(voice.clone());
        playing(&coordinator, "A").await;
        coordinator.enqueue_search("B", "ana", CHANNEL).await.unwrap();

        assert_eq!(coordinator.toggle_pause().await.unwrap(), PauseOutcome::Paused);
        assert!(voice.music_paused());

        let outcome = coordinator.skip().await.unwrap();
        assert!(outcome.was_playing);
        wait_for("B suena", || {
            coordinator.now_playing().map(|t| t.display_title).as_deref() == Some("B")
        })
        .await;
        assert_eq!(voice.play_count(), 2);
        assert!(!voice.music_paused());
        assert_eq!(coordinator.snapshot().state, PlaybackState::Playing);
    }

    #[tokio::test]
    async fn user_pause_during_speech_survives_the_interrupt() {
        let voice = Arc::new(FakeVoice::connected());
        let coordinator = coordinator(voice.clone());
        playing(&coordinator, "A").await;
        let bridge = bridge(synth_ok());

        let task = {
            let (bridge, coordinator) = (bridge.clone(), coordinator.clone());
            tokio::spawn(async move { bridge.speak(&coordinator, "hola").await })
        };
        wait_for("locución en curso", || voice.overlay_count() == 1).await;

        coordinator.toggle_pause().await.unwrap();
        voice.finish_overlay();
        assert!(task.await.unwrap());

        assert!(voice.music_paused());
        assert_eq!(
            coordinator.snapshot().state,
            PlaybackState::Paused(PauseReasons {
                user: true,
                speech: false
            })
        );
    }

    #[tokio::test]
    async fn next_track_waits_for_speech_to_finish() {
        let voice = Arc::new(FakeVoice::connected());
        let coordinator = coordinator(voice.clone());
        let bridge = bridge(synth_ok());

        let task = {
            let (bridge, coordinator) = (bridge.clone(), coordinator.clone());
            tokio::spawn(async move { bridge.speak(&coordinator, "hola").await })
        };
        wait_for("locución en curso", || voice.overlay_count() == 1).await;

        coordinator.enqueue_search("A", "ana", CHANNEL).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(voice.play_count(), 0);

        voice.finish_overlay();
        assert!(task.await.unwrap());
        wait_for("A suena", || voice.play_count() == 1).await;
        assert_eq!(coordinator.now_playing().unwrap().display_title, "A");
    }
}
