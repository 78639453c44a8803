//! Enrutado de menciones al asistente y detección de pedidos de música.

use serenity::model::id::UserId;

/// Palabras que convierten un mensaje de `ia` en un pedido de música.
const MUSIC_KEYWORDS: &[&str] = &[
    "pon",
    "reproduce",
    "música",
    "canción",
    "playlist",
    "suena",
    "toca",
    "play",
];

/// Lo que se pide al mencionar al bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionRequest {
    /// `@bot ia <texto>`
    Ia(String),
    /// `@bot habla <texto>`
    Habla(String),
    /// `@bot <texto>`
    Chat(String),
}

/// Interpreta un mensaje que empieza mencionando al bot (`<@id>` o `<@!id>`).
pub fn route_mention(bot_id: UserId, content: &str) -> Option<MentionRequest> {
    let content = content.trim();
    let plain = format!("<@{bot_id}>");
    let nick = format!("<@!{bot_id}>");
    let after = content
        .strip_prefix(plain.as_str())
        .or_else(|| content.strip_prefix(nick.as_str()))?
        .trim();

    let (word, rest) = match after.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (after, ""),
    };

    let request = match word.to_lowercase().as_str() {
        "ia" => MentionRequest::Ia(rest.to_string()),
        "habla" => MentionRequest::Habla(rest.to_string()),
        _ => MentionRequest::Chat(after.to_string()),
    };
    Some(request)
}

/// Si el texto pide música, devuelve lo que va después de la primera palabra clave encontrada.
///
/// Las palabras clave se prueban en orden y se buscan como subcadena, sin
/// distinguir mayúsculas. Una palabra clave sin nada detrás no cuenta.
pub fn detect_music_request(prompt: &str) -> Option<String> {
    let lower = prompt.to_lowercase();
    MUSIC_KEYWORDS.iter().find_map(|keyword| {
        let index = lower.find(keyword)?;
        // `to_lowercase` puede cambiar longitudes; se corta sobre el texto en minúsculas
        // cuando no coinciden los límites del original.
        let end = index + keyword.len();
        let query = prompt
            .get(end..)
            .filter(|_| lower.len() == prompt.len())
            .unwrap_or(&lower[end..])
            .trim();
        (!query.is_empty()).then(|| query.to_string())
    })
}
