use regex::Regex;
use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::{sync::LazyLock, time::Duration};

use crate::{
    audio::{notify::AddedNotice, queue::QueuePage, queue::SourceLabel, queue::Track},
    sources::detect_platform,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::new(0x2ECC71);
    pub const INFO_PURPLE: Colour = Colour::new(0x9B59B6);
    pub const WARNING_YELLOW: Colour = Colour::new(0xF1C40F);
    pub const ERROR_RED: Colour = Colour::new(0xE74C3C);
    pub const MUSIC_PURPLE: Colour = Colour::new(0x9B59B6);
}

const MUSIC_FOOTER: &str = "💜 Disfruta tu música 💜";
const MAX_TITLE_CHARS: usize = 70;

static WATCH_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"watch\?v=([a-zA-Z0-9_-]+)").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    Success,
    Info,
    Warning,
    Error,
    Music,
}

impl EmbedKind {
    fn icon(&self) -> &'static str {
        match self {
            EmbedKind::Success => "✅ ✨",
            EmbedKind::Info => "ℹ️ 🔹",
            EmbedKind::Warning => "⚠️ ✴️",
            EmbedKind::Error => "❌ ✖️",
            EmbedKind::Music => "🎵 🎶",
        }
    }

    fn colour(&self) -> serenity::all::Colour {
        match self {
            EmbedKind::Success => colors::SUCCESS_GREEN,
            EmbedKind::Info => colors::INFO_PURPLE,
            EmbedKind::Warning => colors::WARNING_YELLOW,
            EmbedKind::Error => colors::ERROR_RED,
            EmbedKind::Music => colors::MUSIC_PURPLE,
        }
    }
}

pub fn make_embed(kind: EmbedKind, title: &str, description: &str) -> CreateEmbed {
    let embed = CreateEmbed::new()
        .title(format!("{} {}", kind.icon(), title))
        .description(description)
        .color(kind.colour());

    if kind == EmbedKind::Music {
        embed.footer(CreateEmbedFooter::new(MUSIC_FOOTER))
    } else {
        embed
    }
}

pub fn success(title: &str, description: &str) -> CreateEmbed {
    make_embed(EmbedKind::Success, title, description)
}

pub fn info(title: &str, description: &str) -> CreateEmbed {
    make_embed(EmbedKind::Info, title, description)
}

pub fn warning(title: &str, description: &str) -> CreateEmbed {
    make_embed(EmbedKind::Warning, title, description)
}

pub fn error(title: &str, description: &str) -> CreateEmbed {
    make_embed(EmbedKind::Error, title, description)
}

pub fn music(title: &str, description: &str) -> CreateEmbed {
    make_embed(EmbedKind::Music, title, description)
}

/// `MM:SS`; pasada la hora los minutos siguen contando.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Miniatura de YouTube si la URL es de la forma `watch?v=<id>`.
pub fn youtube_thumbnail(url: &str) -> Option<String> {
    let captures = WATCH_ID.as_ref()?.captures(url)?;
    Some(format!(
        "https://img.youtube.com/vi/{}/hqdefault.jpg",
        &captures[1]
    ))
}

fn short_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        title.to_string()
    } else {
        let cut: String = title.chars().take(MAX_TITLE_CHARS - 1).collect();
        format!("{cut}…")
    }
}

fn source_text(track: &Track) -> String {
    let platform = detect_platform(&track.source_url);
    match track.source_label {
        SourceLabel::Direct => format!("{} {} 🎵", platform.emoji(), platform.name()),
        SourceLabel::ResolvedSearch => format!("🔍 Búsqueda · {} 🎵", platform.name()),
    }
}

/// Embed de "Now Playing"; el campo de tiempo se reescribe cada segundo.
pub fn now_playing(track: &Track, elapsed: Duration) -> CreateEmbed {
    let mut embed = music(
        "Now Playing ✨",
        &format!("**[{}]({})**", track.display_title, track.source_url),
    )
    .field("Requested by", format!("💜 {}", track.requested_by), true)
    .field("Source", source_text(track), true)
    .field("Time Elapsed", format_elapsed(elapsed), false);

    if let Some(thumbnail) = youtube_thumbnail(&track.source_url) {
        embed = embed.thumbnail(thumbnail);
    }
    embed
}

pub fn tracks_added(notice: &AddedNotice) -> CreateEmbed {
    if notice.playlist {
        music(
            "Playlist / Mix añadido",
            &format!(
                "🎶 Se añadieron **{} canciones**.\n📂 Cola actual: **{}** / {}",
                notice.added, notice.queue_len, notice.capacity
            ),
        )
    } else {
        music(
            "Canción añadida",
            &format!(
                "🎧 Ahora en cola: **{}**\n📂 Posición: **{}**",
                notice.first_title, notice.position
            ),
        )
    }
    .timestamp(Timestamp::now())
}

pub fn queue_page(page: &QueuePage) -> CreateEmbed {
    let lines: Vec<String> = page
        .items
        .iter()
        .enumerate()
        .map(|(i, title)| format!("`{}.` {}", page.first_position + i, short_title(title)))
        .collect();

    info(
        &format!("Cola de reproducción ({} canciones)", page.total_items),
        &lines.join("\n"),
    )
    .footer(CreateEmbedFooter::new(format!(
        "Página {}/{}",
        page.page, page.total_pages
    )))
}

pub fn help(prefix: &str) -> CreateEmbed {
    info("Comandos de Kaivoxx", "Música y asistente por voz 💜")
        .field(
            "🎵 Música",
            format!(
                "`{p}join` · `{p}leave` · `{p}play <canción o link>`\n\
                 `{p}skip` · `{p}stop` · `{p}pause` · `{p}queue [página]` · `{p}now`",
                p = prefix
            ),
            false,
        )
        .field(
            "🤖 IA",
            format!(
                "`{p}ia <mensaje>` → Hablo contigo por texto usando IA\n\
                 `{p}habla <mensaje>` → Respondo con IA **y hablo por voz** 🎤\n\
                 `{p}limpiar_ia` → Borra la memoria de la conversación\n\
                 `{p}resumen <texto>` → Resume un texto largo\n\
                 `{p}personalidad` → Muestra mi personalidad",
                p = prefix
            ),
            false,
        )
        .field(
            "ℹ️ Información",
            "También puedes **mencionarme** para hablar conmigo 💬\nEjemplo: `@Kaivoxx hola`",
            false,
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn elapsed_is_minutes_and_seconds() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00");
        assert_eq!(format_elapsed(Duration::from_secs(65)), "01:05");
        assert_eq!(format_elapsed(Duration::from_secs(3725)), "62:05");
    }

    #[test]
    fn thumbnail_only_for_watch_urls() {
        assert_eq!(
            youtube_thumbnail("https://www.youtube.com/watch?v=abc123&list=x").as_deref(),
            Some("https://img.youtube.com/vi/abc123/hqdefault.jpg")
        );
        assert_eq!(youtube_thumbnail("https://youtu.be/abc123"), None);
        assert_eq!(youtube_thumbnail("https://www.youtube.com/watch?v="), None);
    }

    #[test]
    fn long_titles_are_shortened() {
        let title = "x".repeat(100);
        let short = short_title(&title);
        assert_eq!(short.chars().count(), MAX_TITLE_CHARS);
        assert!(short.ends_with('…'));
        assert_eq!(short_title("corto"), "corto");
    }
}
