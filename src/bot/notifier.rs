use async_trait::async_trait;
use serenity::{
    builder::{CreateMessage, EditMessage},
    http::Http,
    model::id::ChannelId,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::{
    audio::{
        notify::{AddedNotice, NowPlayingMessage, Notifier},
        queue::Track,
    },
    ui::{buttons, embeds},
};

const FAILURE_TEXT: &str = "❌ Error al preparar el audio. Saltando...";

/// Publica los avisos del coordinador en el canal de texto de origen.
pub struct DiscordNotifier {
    http: Arc<Http>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn tracks_added(&self, channel: ChannelId, notice: &AddedNotice) {
        let message = CreateMessage::new().embed(embeds::tracks_added(notice));
        if let Err(e) = channel.send_message(&*self.http, message).await {
            warn!("⚠️ No se pudo avisar canciones añadidas en {}: {:?}", channel, e);
        }
    }

    async fn now_playing(&self, track: &Track) -> Option<NowPlayingMessage> {
        let message = CreateMessage::new()
            .embed(embeds::now_playing(track, Duration::ZERO))
            .components(buttons::now_playing_buttons());

        match track.origin_channel.send_message(&*self.http, message).await {
            Ok(sent) => Some(NowPlayingMessage {
                channel_id: sent.channel_id,
                message_id: sent.id,
            }),
            Err(e) => {
                warn!("⚠️ No se pudo enviar now playing: {:?}", e);
                None
            }
        }
    }

    async fn elapsed(&self, message: &NowPlayingMessage, track: &Track, elapsed: Duration) -> bool {
        let edit = EditMessage::new().embed(embeds::now_playing(track, elapsed));
        match message
            .channel_id
            .edit_message(&*self.http, message.message_id, edit)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!("⏱️ Deja de actualizarse el tiempo de '{}': {:?}", track.display_title, e);
                false
            }
        }
    }

    async fn playback_failed(&self, track: &Track, reason: &str) {
        debug!("❌ '{}' falló: {}", track.display_title, reason);
        if let Err(e) = track.origin_channel.say(&self.http, FAILURE_TEXT).await {
            warn!("⚠️ No se pudo avisar el fallo de reproducción: {:?}", e);
        }
    }
}
