//! # Bot Module
//!
//! Discord event handling for Kaivoxx.
//!
//! [`KaivoxxBot`] implements Serenity's [`EventHandler`] and routes:
//!
//! - prefixed text commands (`#play`, `#ia`, ...) to [`handlers::handle_command`]
//! - mentions (`@Kaivoxx ...`) to the assistant
//! - button presses to [`handlers::handle_component`]
//! - the bot's own voice disconnections to the guild's playback coordinator
//!
//! Playback state lives in the [`GuildRegistry`]; the handler only owns
//! shared references to it, the configuration and the optional assistant.

use serenity::{
    all::{ActivityData, Context, EventHandler, Interaction, Message, OnlineStatus, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod assistant;
pub mod commands;
pub mod handlers;
pub mod notifier;

pub use notifier::DiscordNotifier;

use crate::{ai::Assistant, audio::GuildRegistry, config::Config};
use assistant::{route_mention, MentionRequest};
use commands::Command;

/// Main Discord event handler.
///
/// ## Fields
///
/// - `config`: prefix, page size and persona shown by `personalidad`
/// - `registry`: per-guild playback coordinators and the speech bridge
/// - `assistant`: chat assistant, absent when no chat API key is configured
pub struct KaivoxxBot {
    pub(crate) config: Arc<Config>,
    pub(crate) registry: Arc<GuildRegistry>,
    pub(crate) assistant: Option<Arc<Assistant>>,
}

impl KaivoxxBot {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<GuildRegistry>,
        assistant: Option<Arc<Assistant>>,
    ) -> Self {
        Self {
            config,
            registry,
            assistant,
        }
    }

    async fn route_message(&self, ctx: &Context, msg: &Message) -> anyhow::Result<()> {
        let bot_id = ctx.cache.current_user().id;

        if let Some(request) = route_mention(bot_id, &msg.content) {
            return match request {
                MentionRequest::Ia(prompt) => {
                    handlers::handle_command(ctx, msg, Command::Ia(prompt), self).await
                }
                MentionRequest::Habla(prompt) => {
                    handlers::handle_command(ctx, msg, Command::Habla(prompt), self).await
                }
                MentionRequest::Chat(prompt) => handlers::handle_chat(ctx, msg, &prompt, self).await,
            };
        }

        match Command::parse(&self.config.prefix, &msg.content) {
            Some(command) => handlers::handle_command(ctx, msg, command, self).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EventHandler for KaivoxxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectada a {} servidores", ready.guilds.len());

        ctx.set_presence(
            Some(ActivityData::listening(format!(
                "{}help 🎵 | 💜 Tu asistente musical y de IA favorita",
                self.config.prefix
            ))),
            OnlineStatus::Online,
        );
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        if let Err(e) = self.route_message(&ctx, &msg).await {
            error!("Error manejando mensaje: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Component(component) = interaction {
            if let Err(e) = handlers::handle_component(&ctx, component, self).await {
                error!("Error manejando componente: {:?}", e);
            }
        }
    }

    /// Si el bot sale del canal de voz por fuera de sus comandos, se detiene la reproducción.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        match self.registry.snapshot(guild_id) {
            Some(snapshot) => info!(
                "🔌 Bot desconectado en guild {} (estado: {}, {} en cola)",
                guild_id,
                snapshot.state.label(),
                snapshot.queued.len()
            ),
            None => info!("🔌 Bot desconectado en guild {}", guild_id),
        }
        if let Err(e) = self.registry.stop(guild_id).await {
            warn!("⚠️ Error al detener reproducción tras desconexión: {:?}", e);
        }
    }
}
