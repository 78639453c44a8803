use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{ResolveError, Resolved, SourceOpener, TrackDescriptor, TrackResolver};
use crate::audio::voice::AudioSource;

const UNKNOWN_TITLE: &str = "Unknown title";
const AUDIO_EXTENSIONS: [&str; 5] = ["m4a", "webm", "opus", "ogg", "mp3"];

/// Documento de `yt-dlp --dump-single-json --flat-playlist`.
#[derive(Debug, Deserialize)]
struct FlatDocument {
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    entries: Option<Vec<Option<FlatEntry>>>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    ie_key: Option<String>,
}

impl FlatEntry {
    fn into_descriptor(self) -> TrackDescriptor {
        let reference = self.webpage_url.or(self.url).map(|reference| {
            // Las entradas planas de YouTube a veces traen solo el id
            if !reference.contains("://") && self.ie_key.as_deref() == Some("Youtube") {
                format!("https://www.youtube.com/watch?v={reference}")
            } else {
                reference
            }
        });

        TrackDescriptor {
            reference,
            title: self
                .title
                .or(self.id)
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        }
    }
}

/// Documento de `yt-dlp -f bestaudio/best --dump-single-json`.
#[derive(Debug, Deserialize)]
struct StreamInfo {
    url: Option<String>,
    formats: Option<Vec<StreamFormat>>,
    http_headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct StreamFormat {
    url: Option<String>,
    acodec: Option<String>,
    ext: Option<String>,
}

/// Resolvedor y abridor de fuentes basado en yt-dlp.
pub struct YtDlpClient {
    rate_limiter: Arc<Semaphore>,
    cookies: Option<PathBuf>,
}

impl YtDlpClient {
    pub fn new(cookies: Option<PathBuf>) -> Self {
        Self {
            // Limitar procesos concurrentes para evitar rate limiting
            rate_limiter: Arc::new(Semaphore::new(3)),
            cookies,
        }
    }

    async fn run(&self, args: &[&str], target: &str) -> Result<String, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Extractor(e.to_string()))?;

        let mut command = Command::new("yt-dlp");
        command.args(args).arg("--no-warnings");
        if let Some(cookies) = &self.cookies {
            command.arg("--cookies").arg(cookies);
        }
        command.arg(target).kill_on_drop(true);

        let output = command
            .output()
            .await
            .map_err(|e| ResolveError::Extractor(format!("no se pudo ejecutar yt-dlp: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() && stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.lines().last().unwrap_or("sin detalles").to_string();
            warn!("❌ yt-dlp falló para {}: {}", target, message);
            return Err(ResolveError::Extractor(message));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl TrackResolver for YtDlpClient {
    async fn resolve(&self, query: &str) -> Result<Resolved, ResolveError> {
        let (target, _) = super::normalize_query(query);
        let search = target.starts_with("ytsearch:");
        info!("🔍 Resolviendo con yt-dlp: {}", target);

        let output = self
            .run(
                &["--dump-single-json", "--flat-playlist", "--ignore-errors"],
                &target,
            )
            .await?;
        parse_resolved(&output, search, query)
    }
}

#[async_trait]
impl SourceOpener for YtDlpClient {
    async fn open(&self, reference: &str) -> Result<AudioSource, ResolveError> {
        debug!("🎵 Obteniendo URL de stream para: {}", reference);
        let output = self
            .run(
                &["-f", "bestaudio/best", "--dump-single-json", "--no-playlist"],
                reference,
            )
            .await?;
        parse_stream(&output)
    }
}

/// Una búsqueda devuelve su primer resultado; un documento con entradas es una playlist.
fn parse_resolved(json: &str, search: bool, query: &str) -> Result<Resolved, ResolveError> {
    let document: FlatDocument =
        serde_json::from_str(json.trim()).map_err(|e| ResolveError::Unusable(e.to_string()))?;

    match document.entries {
        Some(entries) if search => entries
            .into_iter()
            .flatten()
            .map(FlatEntry::into_descriptor)
            .find(|d| d.reference.is_some())
            .map(Resolved::Single)
            .ok_or_else(|| ResolveError::NotFound(query.to_string())),
        Some(entries) if !entries.is_empty() => Ok(Resolved::Playlist(
            entries
                .into_iter()
                .map(|entry| match entry {
                    Some(entry) => entry.into_descriptor(),
                    None => TrackDescriptor {
                        reference: None,
                        title: UNKNOWN_TITLE.to_string(),
                    },
                })
                .collect(),
        )),
        Some(_) => Err(ResolveError::NotFound(query.to_string())),
        None => {
            let reference = document
                .webpage_url
                .or(document.url)
                .ok_or_else(|| ResolveError::Unusable("sin URL reproducible".into()))?;
            Ok(Resolved::Single(TrackDescriptor {
                reference: Some(reference),
                title: document.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            }))
        }
    }
}

/// URL directa del mejor audio; si no viene, el último formato de audio utilizable.
fn parse_stream(json: &str) -> Result<AudioSource, ResolveError> {
    let info: StreamInfo =
        serde_json::from_str(json.trim()).map_err(|e| ResolveError::Unusable(e.to_string()))?;

    let url = info
        .url
        .filter(|u| !u.is_empty())
        .or_else(|| {
            info.formats?
                .into_iter()
                .filter(|f| f.acodec.as_deref() != Some("none"))
                .filter(|f| {
                    f.ext
                        .as_deref()
                        .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext))
                })
                .filter_map(|f| f.url)
                .next_back()
        })
        .ok_or(ResolveError::NoStream)?;

    let mut headers: Vec<(String, String)> = info.http_headers.unwrap_or_default().into_iter().collect();
    headers.sort();

    Ok(AudioSource::Http { url, headers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn search_takes_first_playable_entry() {
        let json = r#"{"_type":"playlist","entries":[
            {"id":"abc","title":"Canción","url":"https://www.youtube.com/watch?v=abc","ie_key":"Youtube"}
        ]}"#;

        assert_eq!(
            parse_resolved(json, true, "canción").unwrap(),
            Resolved::Single(TrackDescriptor::new("https://www.youtube.com/watch?v=abc", "Canción"))
        );
    }

    #[test]
    fn empty_search_is_not_found() {
        let json = r#"{"_type":"playlist","entries":[]}"#;
        assert_eq!(
            parse_resolved(json, true, "xyz"),
            Err(ResolveError::NotFound("xyz".into()))
        );
    }

    #[test]
    fn playlist_keeps_order_and_marks_broken_entries() {
        let json = r#"{"_type":"playlist","title":"Mix","entries":[
            {"id":"a","title":"Uno","url":"a","ie_key":"Youtube"},
            null,
            {"id":"c","webpage_url":"https://soundcloud.com/x/c"}
        ]}"#;

        assert_eq!(
            parse_resolved(json, false, "https://youtube.com/playlist?list=1").unwrap(),
            Resolved::Playlist(vec![
                TrackDescriptor::new("https://www.youtube.com/watch?v=a", "Uno"),
                TrackDescriptor {
                    reference: None,
                    title: UNKNOWN_TITLE.into()
                },
                TrackDescriptor::new("https://soundcloud.com/x/c", "c"),
            ])
        );
    }

    #[test]
    fn single_video_document() {
        let json = r#"{"title":"Video","webpage_url":"https://youtu.be/v","url":"https://cdn/v.m4a"}"#;
        assert_eq!(
            parse_resolved(json, false, "https://youtu.be/v").unwrap(),
            Resolved::Single(TrackDescriptor::new("https://youtu.be/v", "Video"))
        );
    }

    #[test]
    fn stream_prefers_top_level_url_and_keeps_headers() {
        let json = r#"{"url":"https://cdn/best","http_headers":{"User-Agent":"yt","Accept":"*/*"}}"#;
        assert_eq!(
            parse_stream(json).unwrap(),
            AudioSource::Http {
                url: "https://cdn/best".into(),
                headers: vec![
                    ("Accept".into(), "*/*".into()),
                    ("User-Agent".into(), "yt".into())
                ],
            }
        );
    }

    #[test]
    fn stream_falls_back_to_last_audio_format() {
        let json = r#"{"formats":[
            {"url":"https://cdn/1","acodec":"opus","ext":"webm"},
            {"url":"https://cdn/video","acodec":"none","ext":"mp4"},
            {"url":"https://cdn/2","acodec":"mp4a","ext":"m4a"},
            {"url":"https://cdn/3","acodec":"aac","ext":"mp4"}
        ]}"#;
        match parse_stream(json).unwrap() {
            AudioSource::Http { url, .. } => assert_eq!(url, "https://cdn/2"),
            other => panic!("fuente inesperada: {other:?}"),
        }
    }

    #[test]
    fn no_audio_means_no_stream() {
        let json = r#"{"formats":[{"url":"https://cdn/video","acodec":"none","ext":"mp4"}]}"#;
        assert_eq!(parse_stream(json), Err(ResolveError::NoStream));
    }
}
