use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage,
    },
    model::{
        application::ComponentInteraction,
        channel::Message,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    ai::Assistant,
    audio::{coordinator::CoordinatorError, PauseOutcome},
    bot::{assistant::detect_music_request, commands::Command, KaivoxxBot},
    sources::ResolveError,
    ui::{
        buttons::{self, ButtonAction},
        embeds,
    },
};

/// Límite de Discord para el contenido de un mensaje.
const MESSAGE_LIMIT: usize = 2000;

/// Maneja un comando de texto ya interpretado.
pub async fn handle_command(
    ctx: &Context,
    msg: &Message,
    command: Command,
    bot: &KaivoxxBot,
) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    info!(
        "📝 Comando {}{} usado por {} en guild {}",
        bot.config.prefix,
        command.name(),
        msg.author.name,
        guild_id
    );

    if command.is_music() && !voice_guard(ctx, msg, guild_id, &command, bot).await? {
        return Ok(());
    }

    match command {
        Command::Join => handle_join(ctx, msg, guild_id, bot).await?,
        Command::Leave => handle_leave(ctx, msg, guild_id, bot).await?,
        Command::Play(query) => play_music(ctx, msg, guild_id, &query, bot).await?,
        Command::Skip => handle_skip(ctx, msg, guild_id, bot).await?,
        Command::Stop => handle_stop(ctx, msg, guild_id, bot).await?,
        Command::Queue(page) => handle_queue(ctx, msg, guild_id, page, bot).await?,
        Command::Now => handle_now(ctx, msg, guild_id, bot).await?,
        Command::Pause => handle_pause(ctx, msg, guild_id, bot).await?,
        Command::Ia(prompt) => handle_ia(ctx, msg, guild_id, &prompt, bot).await?,
        Command::Habla(prompt) => handle_habla(ctx, msg, guild_id, &prompt, bot).await?,
        Command::LimpiarIa => handle_clear_ia(ctx, msg, bot).await?,
        Command::Personalidad => {
            send_embed(
                ctx,
                msg.channel_id,
                embeds::info("¿Quién es Kaivoxx?", &bot.config.system_prompt),
            )
            .await?
        }
        Command::Resumen(text) => handle_summary(ctx, msg, &text, bot).await?,
        Command::Help => {
            send_embed(ctx, msg.channel_id, embeds::help(&bot.config.prefix)).await?
        }
    }

    Ok(())
}

/// Mención directa sin subcomando: sólo conversación.
pub async fn handle_chat(ctx: &Context, msg: &Message, prompt: &str, bot: &KaivoxxBot) -> Result<()> {
    if let Some(reply) = assistant_reply(ctx, msg, prompt, bot).await? {
        send_text(ctx, msg.channel_id, &reply).await?;
    }
    Ok(())
}

/// Maneja los botones del mensaje "now playing" y de la cola.
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &KaivoxxBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(action) = ButtonAction::parse(&component.data.custom_id) else {
        return respond_ephemeral(ctx, &component, "❌ Acción no reconocida").await;
    };

    if let ButtonAction::QueuePage(page) = action {
        let page = bot
            .registry
            .list_queue(guild_id, page, bot.config.queue_page_size);
        let message = if page.total_items == 0 {
            CreateInteractionResponseMessage::new()
                .embed(empty_queue())
                .components(Vec::new())
        } else {
            CreateInteractionResponseMessage::new()
                .embed(embeds::queue_page(&page))
                .components(buttons::queue_navigation(&page))
        };
        component
            .create_response(&ctx.http, CreateInteractionResponse::UpdateMessage(message))
            .await?;
        return Ok(());
    }

    let Some(bot_channel) = bot_voice_channel(ctx, guild_id) else {
        return respond_ephemeral(ctx, &component, "❌ No estoy en un canal de voz.").await;
    };
    if user_voice_channel(ctx, guild_id, component.user.id) != Some(bot_channel) {
        return respond_ephemeral(
            ctx,
            &component,
            "⚠️ Debes estar en el mismo canal de voz que yo para usar este botón.",
        )
        .await;
    }

    let text = match action {
        ButtonAction::PauseResume => match bot.registry.toggle_pause(guild_id).await? {
            PauseOutcome::Paused => "⏸️ Pausado",
            PauseOutcome::Resumed => "▶️ Reanudado",
            PauseOutcome::NothingPlaying => "ℹ️ Nada reproduciéndose",
        },
        ButtonAction::Skip => {
            if bot.registry.skip(guild_id).await?.was_playing {
                "⏭️ Saltado"
            } else {
                "ℹ️ Nada reproduciéndose"
            }
        }
        ButtonAction::Stop => {
            bot.registry.stop(guild_id).await?;
            "🛑 Cola eliminada y música detenida."
        }
        ButtonAction::QueuePage(_) => return Ok(()),
    };

    respond_ephemeral(ctx, &component, text).await
}

// Reglas de canal de voz

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id);
    channel_id
}

fn bot_voice_channel(ctx: &Context, guild_id: GuildId) -> Option<ChannelId> {
    user_voice_channel(ctx, guild_id, ctx.cache.current_user().id)
}

/// Sin conexión sólo pasan `play` y `join`; con conexión hay que estar en el mismo canal.
async fn voice_guard(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    command: &Command,
    bot: &KaivoxxBot,
) -> Result<bool> {
    let Some(bot_channel) = bot_voice_channel(ctx, guild_id) else {
        if command.connects_on_demand() {
            return Ok(true);
        }
        send_embed(
            ctx,
            msg.channel_id,
            embeds::warning(
                "No estoy conectada",
                &format!(
                    "Primero debo unirme a un canal con {}join o usando play",
                    bot.config.prefix
                ),
            ),
        )
        .await?;
        return Ok(false);
    };

    if user_voice_channel(ctx, guild_id, msg.author.id) == Some(bot_channel) {
        return Ok(true);
    }

    send_embed(
        ctx,
        msg.channel_id,
        embeds::warning(
            "Canal incorrecto",
            "Debes estar en el mismo canal de voz que yo para usar este comando.",
        ),
    )
    .await?;
    Ok(false)
}

// Música

async fn handle_join(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &KaivoxxBot) -> Result<()> {
    let Some(channel) = user_voice_channel(ctx, guild_id, msg.author.id) else {
        return send_embed(
            ctx,
            msg.channel_id,
            embeds::warning("No estás en un canal", "Debes unirte primero a un canal de voz."),
        )
        .await;
    };

    if bot_voice_channel(ctx, guild_id) == Some(channel) {
        return send_embed(
            ctx,
            msg.channel_id,
            embeds::info("Ya estoy aquí", &format!("Ya estoy conectada en <#{}> ✨", channel)),
        )
        .await;
    }

    let embed = match bot.registry.join(guild_id, channel).await {
        Ok(()) => embeds::success("Conectada al canal", &format!("Me uní a <#{}> 🎧", channel)),
        Err(e) => {
            warn!("⚠️ No se pudo unir al canal {} en guild {}: {}", channel, guild_id, e);
            embeds::warning("No pude unirme", "No tengo permisos para unirme al canal de voz.")
        }
    };
    send_embed(ctx, msg.channel_id, embed).await
}

async fn handle_leave(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &KaivoxxBot) -> Result<()> {
    let embed = if bot.registry.leave(guild_id).await? {
        embeds::success("Desconectada", "Me desconecté del canal y limpié la cola 🧹")
    } else {
        embeds::warning("No estoy conectada", "No estoy en ningún canal de voz.")
    };
    send_embed(ctx, msg.channel_id, embed).await
}

/// Encola una búsqueda, uniéndose al canal del autor si hace falta.
///
/// El aviso de canciones añadidas lo publica el coordinador; aquí sólo se
/// informan los casos en que no se añadió nada.
async fn play_music(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    query: &str,
    bot: &KaivoxxBot,
) -> Result<()> {
    let Some(user_channel) = user_voice_channel(ctx, guild_id, msg.author.id) else {
        return send_embed(
            ctx,
            msg.channel_id,
            embeds::warning(
                "No estás en un canal de voz",
                &format!(
                    "Debes unirte a un canal de voz antes de usar {}play.",
                    bot.config.prefix
                ),
            ),
        )
        .await;
    };

    if query.trim().is_empty() {
        return send_embed(
            ctx,
            msg.channel_id,
            embeds::warning("Falta el nombre", "Debes escribir el nombre de la canción o el link."),
        )
        .await;
    }

    match bot_voice_channel(ctx, guild_id) {
        Some(channel) if channel != user_channel => {
            return send_embed(ctx, msg.channel_id, already_elsewhere(bot)).await;
        }
        Some(_) => {}
        None => {
            if let Err(e) = bot.registry.join(guild_id, user_channel).await {
                warn!("⚠️ No se pudo unir para reproducir en guild {}: {}", guild_id, e);
                return send_embed(
                    ctx,
                    msg.channel_id,
                    embeds::warning("No pude unirme", "No tengo permisos para unirme al canal de voz."),
                )
                .await;
            }
        }
    }

    send_embed(
        ctx,
        msg.channel_id,
        embeds::info("Buscando en YouTube…", &format!("🔍 **{}**", query.trim())),
    )
    .await?;

    let outcome = match bot
        .registry
        .enqueue_search(guild_id, query.trim(), &msg.author.name, msg.channel_id)
        .await
    {
        Ok(outcome) => outcome,
        Err(CoordinatorError::Resolve(ResolveError::NotFound(_))) => {
            return send_embed(
                ctx,
                msg.channel_id,
                embeds::warning("Sin resultados", &format!("No encontré nada para **{}**", query.trim())),
            )
            .await;
        }
        Err(e) => {
            warn!("❌ Error al buscar '{}' en guild {}: {}", query, guild_id, e);
            return send_embed(
                ctx,
                msg.channel_id,
                embeds::error("Error al buscar", "No pude obtener esa canción. Prueba con otro link o nombre."),
            )
            .await;
        }
    };

    if outcome.cancelled {
        return send_embed(
            ctx,
            msg.channel_id,
            embeds::info("Búsqueda cancelada", "La música se detuvo mientras buscaba."),
        )
        .await;
    }

    if outcome.added == 0 {
        let reason = if outcome.rejected > 0 {
            format!("📂 La cola está llena: **{}** / {}", outcome.queue_len, outcome.capacity)
        } else if outcome.skipped_unplayable > 0 {
            format!(
                "Ninguna de las {} entradas se puede reproducir.",
                outcome.skipped_unplayable
            )
        } else {
            "No encontré canciones reproducibles en ese enlace.".to_string()
        };
        return send_embed(
            ctx,
            msg.channel_id,
            embeds::warning("No se añadieron canciones", &reason),
        )
        .await;
    }

    if outcome.rejected > 0 {
        send_embed(
            ctx,
            msg.channel_id,
            embeds::warning(
                "Cola llena",
                &format!("{} canciones no cupieron en la cola.", outcome.rejected),
            ),
        )
        .await?;
    }

    Ok(())
}

async fn handle_skip(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &KaivoxxBot) -> Result<()> {
    let embed = if bot.registry.skip(guild_id).await?.was_playing {
        embeds::success("Saltado", "⏭ Se saltó la canción actual.")
    } else {
        embeds::info("Nada reproduciéndose", "No hay ninguna canción sonando.")
    };
    send_embed(ctx, msg.channel_id, embed).await
}

async fn handle_stop(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &KaivoxxBot) -> Result<()> {
    bot.registry.stop(guild_id).await?;
    send_embed(
        ctx,
        msg.channel_id,
        embeds::error("Reproducción detenida", "🛑 Cola eliminada y música detenida."),
    )
    .await
}

async fn handle_queue(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    page: usize,
    bot: &KaivoxxBot,
) -> Result<()> {
    let page = bot
        .registry
        .list_queue(guild_id, page, bot.config.queue_page_size);
    if page.total_items == 0 {
        return send_embed(ctx, msg.channel_id, empty_queue()).await;
    }

    let message = CreateMessage::new()
        .embed(embeds::queue_page(&page))
        .components(buttons::queue_navigation(&page));
    msg.channel_id.send_message(&ctx.http, message).await?;
    Ok(())
}

async fn handle_now(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &KaivoxxBot) -> Result<()> {
    let embed = match bot.registry.now_playing(guild_id) {
        Some(track) => embeds::music(
            "Sonando ahora",
            &format!(
                "🎧 **[{}]({})**\n💜 Pedida por {}",
                track.display_title, track.source_url, track.requested_by
            ),
        ),
        None => embeds::info("Nada reproduciéndose", "No hay ninguna canción sonando."),
    };
    send_embed(ctx, msg.channel_id, embed).await
}

async fn handle_pause(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &KaivoxxBot) -> Result<()> {
    let embed = match bot.registry.toggle_pause(guild_id).await? {
        PauseOutcome::Paused => embeds::info("Pausado", "⏸️ Música en pausa."),
        PauseOutcome::Resumed => embeds::success("Reanudado", "▶️ Música reanudada."),
        PauseOutcome::NothingPlaying => {
            embeds::info("Nada reproduciéndose", "No hay ninguna canción sonando.")
        }
    };
    send_embed(ctx, msg.channel_id, embed).await
}

// Asistente

fn assistant<'a>(bot: &'a KaivoxxBot) -> Option<&'a Assistant> {
    bot.assistant.as_deref()
}

/// Respuesta del asistente para el canal del mensaje, avisando si no se puede pedir.
async fn assistant_reply(
    ctx: &Context,
    msg: &Message,
    prompt: &str,
    bot: &KaivoxxBot,
) -> Result<Option<String>> {
    let Some(assistant) = assistant(bot) else {
        send_embed(
            ctx,
            msg.channel_id,
            embeds::warning("IA no disponible", "Falta configurar GROQ_API_KEY."),
        )
        .await?;
        return Ok(None);
    };

    if prompt.trim().is_empty() {
        send_text(ctx, msg.channel_id, "💜 Dime qué quieres que responda.").await?;
        return Ok(None);
    }

    if let Err(e) = msg.channel_id.broadcast_typing(&ctx.http).await {
        warn!("⚠️ No se pudo mostrar 'escribiendo': {:?}", e);
    }

    let key = Assistant::context_key(msg.channel_id.get());
    Ok(Some(assistant.reply(&key, prompt.trim()).await))
}

async fn handle_ia(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    prompt: &str,
    bot: &KaivoxxBot,
) -> Result<()> {
    let Some(reply) = assistant_reply(ctx, msg, prompt, bot).await? else {
        return Ok(());
    };
    send_text(ctx, msg.channel_id, &reply).await?;

    if let Some(query) = detect_music_request(prompt) {
        info!("🎵 Pedido de música detectado en ia: '{}'", query);
        play_music(ctx, msg, guild_id, &query, bot).await?;
    }
    Ok(())
}

async fn handle_habla(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    prompt: &str,
    bot: &KaivoxxBot,
) -> Result<()> {
    if prompt.trim().is_empty() {
        return send_text(ctx, msg.channel_id, "💜 ¿Qué quieres que diga? 🎤").await;
    }

    let Some(reply) = assistant_reply(ctx, msg, prompt, bot).await? else {
        return Ok(());
    };
    send_text(ctx, msg.channel_id, &reply).await?;

    let max_chars = bot.registry.speech().max_chars();
    if reply.chars().count() > max_chars {
        return send_text(
            ctx,
            msg.channel_id,
            &format!(
                "⚠️ La respuesta es muy larga para leerla en voz. Acorta el mensaje o usa {}ia para solo texto.",
                bot.config.prefix
            ),
        )
        .await;
    }

    let Some(user_channel) = user_voice_channel(ctx, guild_id, msg.author.id) else {
        return send_text(
            ctx,
            msg.channel_id,
            &format!(
                "💜 Para que hable necesito que estés en un canal de voz. Únete y usa `{}habla` ahí.",
                bot.config.prefix
            ),
        )
        .await;
    };

    match bot_voice_channel(ctx, guild_id) {
        Some(channel) if channel != user_channel => {
            return send_embed(ctx, msg.channel_id, already_elsewhere(bot)).await;
        }
        Some(_) => {}
        None => match bot.registry.join(guild_id, user_channel).await {
            Ok(()) => {
                send_embed(
                    ctx,
                    msg.channel_id,
                    embeds::success(
                        "Conectada al canal",
                        &format!("Me uní a <#{}> para hablar 🎤", user_channel),
                    ),
                )
                .await?;
            }
            Err(e) => {
                warn!("⚠️ No se pudo unir para hablar en guild {}: {}", guild_id, e);
                return send_embed(
                    ctx,
                    msg.channel_id,
                    embeds::warning("No pude unirme", "No tengo permisos para unirme al canal de voz."),
                )
                .await;
            }
        },
    }

    if !bot.registry.speak(guild_id, &reply).await {
        send_text(
            ctx,
            msg.channel_id,
            "⚠️ No pude reproducir la voz. Comprueba que tenga permiso para hablar en el canal.",
        )
        .await?;
    }
    Ok(())
}

async fn handle_clear_ia(ctx: &Context, msg: &Message, bot: &KaivoxxBot) -> Result<()> {
    let cleared = assistant(bot)
        .map(|assistant| assistant.clear(&Assistant::context_key(msg.channel_id.get())))
        .unwrap_or(false);
    let text = if cleared {
        "🧠 Memoria limpiada. Empezamos de cero 💜✨"
    } else {
        "ℹ️ No había memoria previa en este canal."
    };
    send_text(ctx, msg.channel_id, text).await
}

async fn handle_summary(ctx: &Context, msg: &Message, text: &str, bot: &KaivoxxBot) -> Result<()> {
    if text.trim().is_empty() {
        return send_text(ctx, msg.channel_id, "✂️ Dame un texto para resumir.").await;
    }
    let Some(assistant) = assistant(bot) else {
        return send_embed(
            ctx,
            msg.channel_id,
            embeds::warning("IA no disponible", "Falta configurar GROQ_API_KEY."),
        )
        .await;
    };

    if let Err(e) = msg.channel_id.broadcast_typing(&ctx.http).await {
        warn!("⚠️ No se pudo mostrar 'escribiendo': {:?}", e);
    }
    let scratch = format!("temp_resumen_{}", msg.id);
    let summary = assistant.summarize(&scratch, text.trim()).await;
    send_text(ctx, msg.channel_id, &format!("📌 **Resumen:**\n{summary}")).await
}

// Respuestas

fn empty_queue() -> CreateEmbed {
    embeds::info("Cola vacía", "No hay canciones en la cola 🎵")
}

fn already_elsewhere(bot: &KaivoxxBot) -> CreateEmbed {
    embeds::warning(
        "Ya estoy en otro canal",
        &format!(
            "Estoy en otro canal de voz. Usa {}join o muéveme.",
            bot.config.prefix
        ),
    )
}

async fn send_embed(ctx: &Context, channel: ChannelId, embed: CreateEmbed) -> Result<()> {
    channel
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await?;
    Ok(())
}

async fn send_text(ctx: &Context, channel: ChannelId, text: &str) -> Result<()> {
    channel.say(&ctx.http, truncate_message(text)).await?;
    Ok(())
}

async fn respond_ephemeral(ctx: &Context, component: &ComponentInteraction, text: &str) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

fn truncate_message(text: &str) -> String {
    if text.chars().count() <= MESSAGE_LIMIT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MESSAGE_LIMIT - 1).collect();
        format!("{cut}…")
    }
}
