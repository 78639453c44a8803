pub mod cookies;
pub mod youtube;

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::{queue::SourceLabel, voice::AudioSource};

pub use youtube::YtDlpClient;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no se encontró nada para: {0}")]
    NotFound(String),
    #[error("error del extractor: {0}")]
    Extractor(String),
    #[error("respuesta inutilizable: {0}")]
    Unusable(String),
    #[error("no stream found")]
    NoStream,
}

/// Lo mínimo que el resolvedor sabe de una canción.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    /// URL o id reproducible. `None` si la entrada de la playlist no trae nada usable.
    pub reference: Option<String>,
    pub title: String,
}

impl TrackDescriptor {
    pub fn new(reference: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Single(TrackDescriptor),
    Playlist(Vec<TrackDescriptor>),
}

/// Convierte una búsqueda o URL en una o varias canciones.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Resolved, ResolveError>;
}

/// Convierte la referencia de una canción en algo que el sink de voz puede reproducir.
#[async_trait]
pub trait SourceOpener: Send + Sync {
    async fn open(&self, reference: &str) -> Result<AudioSource, ResolveError>;
}

pub fn is_url(text: &str) -> bool {
    text.starts_with("http://") || text.starts_with("https://") || text.starts_with("spotify:")
}

/// Las URLs pasan tal cual; el texto libre se busca en YouTube.
pub fn normalize_query(input: &str) -> (String, SourceLabel) {
    let input = input.trim();
    if is_url(input) {
        (input.to_string(), SourceLabel::Direct)
    } else {
        (format!("ytsearch:{input}"), SourceLabel::ResolvedSearch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Spotify,
    SoundCloud,
    Deezer,
    YouTube,
    Search,
}

impl Platform {
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Spotify => "Spotify",
            Platform::SoundCloud => "SoundCloud",
            Platform::Deezer => "Deezer",
            Platform::YouTube => "YouTube",
            Platform::Search => "Búsqueda",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Platform::Spotify => "🟢",
            Platform::SoundCloud => "🟠",
            Platform::Deezer => "🟣",
            Platform::YouTube => "🔴",
            Platform::Search => "🔍",
        }
    }
}

pub fn detect_platform(text: &str) -> Platform {
    if text.starts_with("spotify:") {
        return Platform::Spotify;
    }

    let host = match url::Url::parse(text) {
        Ok(parsed) => parsed.host_str().unwrap_or_default().to_lowercase(),
        Err(_) => return Platform::Search,
    };

    if host.contains("spotify.com") {
        Platform::Spotify
    } else if host.contains("soundcloud.com") {
        Platform::SoundCloud
    } else if host.contains("deezer.com") {
        Platform::Deezer
    } else if host.contains("youtube.com") || host.contains("youtu.be") {
        Platform::YouTube
    } else {
        Platform::Search
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn free_text_becomes_youtube_search() {
        assert_eq!(
            normalize_query("  bad bunny  "),
            ("ytsearch:bad bunny".to_string(), SourceLabel::ResolvedSearch)
        );
        assert_eq!(
            normalize_query("https://youtu.be/abc"),
            ("https://youtu.be/abc".to_string(), SourceLabel::Direct)
        );
        assert!(is_url("spotify:track:123"));
    }

    #[test]
    fn platform_detection() {
        assert_eq!(detect_platform("spotify:track:1"), Platform::Spotify);
        assert_eq!(detect_platform("https://open.spotify.com/track/1"), Platform::Spotify);
        assert_eq!(detect_platform("https://soundcloud.com/a/b"), Platform::SoundCloud);
        assert_eq!(detect_platform("https://www.deezer.com/track/1"), Platform::Deezer);
        assert_eq!(detect_platform("https://music.youtube.com/watch?v=x"), Platform::YouTube);
        assert_eq!(detect_platform("https://youtu.be/x"), Platform::YouTube);
        assert_eq!(detect_platform("lofi beats"), Platform::Search);
    }
}
