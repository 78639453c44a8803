use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod ai;
mod audio;
mod bot;
mod config;
mod sources;
mod tts;
mod ui;

use crate::ai::{Assistant, GroqProvider};
use crate::audio::{voice::SongbirdSession, voice::VoiceSession, GuildRegistry, SpeechBridge, VoiceFactory};
use crate::bot::{DiscordNotifier, KaivoxxBot};
use crate::config::Config;
use crate::sources::YtDlpClient;
use crate::tts::{ElevenLabsSynthesizer, FallbackSynthesizer, GoogleTts, SpeechSynthesizer};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kaivoxx=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("💜 Iniciando Kaivoxx v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // El archivo de cookies se borra al salir de main
    let cookies = sources::cookies::load_from_env()?;
    let ytdlp = Arc::new(YtDlpClient::new(
        cookies.as_ref().map(|path| path.to_path_buf()),
    ));

    let http_client = reqwest::Client::builder()
        .user_agent(concat!("kaivoxx/", env!("CARGO_PKG_VERSION")))
        .build()?;

    // Voz sintetizada: ElevenLabs si hay clave, Google TTS como respaldo
    let secondary: Arc<dyn SpeechSynthesizer> = Arc::new(GoogleTts::new(
        http_client.clone(),
        config.tts_language.clone(),
    ));
    let primary = config.elevenlabs_api_key.clone().map(|api_key| {
        Arc::new(ElevenLabsSynthesizer::new(
            http_client.clone(),
            api_key,
            config.elevenlabs_voice_id.clone(),
        )) as Arc<dyn SpeechSynthesizer>
    });
    if primary.is_none() {
        info!("🗣️ Sin ELEVENLABS_API_KEY: se usará sólo Google TTS");
    }
    let speech = Arc::new(SpeechBridge::new(
        Arc::new(FallbackSynthesizer::new(primary, secondary)),
        config.max_tts_chars,
        config.speech_poll_interval,
        config.speech_timeout,
    ));

    // Asistente de chat opcional
    let assistant = match config.groq_api_key.clone() {
        Some(api_key) => Some(Arc::new(Assistant::new(
            Arc::new(GroqProvider::new(
                http_client.clone(),
                config.groq_api_url.clone(),
                api_key,
                config.groq_model.clone(),
            )),
            config.chat_history_len,
            config.system_prompt.clone(),
        ))),
        None => {
            warn!("⚠️ GROQ_API_KEY no definido: comandos de IA desactivados");
            None
        }
    };

    let manager = Songbird::serenity();
    let voice_factory: VoiceFactory = {
        let manager = manager.clone();
        let http_client = http_client.clone();
        Arc::new(move |guild_id| {
            Arc::new(SongbirdSession::new(manager.clone(), guild_id, http_client.clone()))
                as Arc<dyn VoiceSession>
        })
    };

    let registry = Arc::new(GuildRegistry::new(
        ytdlp.clone(),
        ytdlp,
        Arc::new(DiscordNotifier::new(Arc::new(Http::new(&config.discord_token)))),
        voice_factory,
        config.coordinator_settings(),
        speech,
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = KaivoxxBot::new(config.clone(), registry, assistant);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    drop(cookies);
    Ok(())
}

async fn health_check() -> Result<()> {
    // yt-dlp es la única dependencia externa
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
