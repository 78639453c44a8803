use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Write;
use tempfile::TempPath;
use tracing::info;

const NETSCAPE_HEADER: &str = "Netscape HTTP Cookie File";

/// Contenido del archivo de cookies a partir de las variables de entorno.
/// Base64 tiene prioridad sobre texto plano.
fn cookie_content(base64: Option<&str>, plain: Option<&str>) -> Result<Option<String>> {
    let content = match (base64, plain) {
        (Some(encoded), _) if !encoded.trim().is_empty() => {
            let bytes = STANDARD
                .decode(encoded.trim())
                .context("YTDLP_COOKIES_BASE64 no es base64 válido")?;
            String::from_utf8(bytes).context("las cookies no son UTF-8")?
        }
        (_, Some(plain)) if !plain.trim().is_empty() => plain.to_string(),
        _ => return Ok(None),
    };

    if !content.contains(NETSCAPE_HEADER) {
        bail!("Formato de cookies inválido: falta header '{}'", NETSCAPE_HEADER);
    }
    Ok(Some(content))
}

/// Escribe las cookies de yt-dlp en un archivo temporal. El archivo se borra
/// al soltar el `TempPath`.
pub fn load_from_env() -> Result<Option<TempPath>> {
    let base64 = std::env::var("YTDLP_COOKIES_BASE64").ok();
    let plain = std::env::var("YTDLP_COOKIES").ok();

    let Some(content) = cookie_content(base64.as_deref(), plain.as_deref())? else {
        return Ok(None);
    };

    let mut file = tempfile::Builder::new()
        .prefix("kaivoxx-cookies-")
        .suffix(".txt")
        .tempfile()?;
    file.write_all(content.as_bytes())?;
    let path = file.into_temp_path();
    info!("🍪 Cookies cargadas: {}", path.display());
    Ok(Some(path))
}
