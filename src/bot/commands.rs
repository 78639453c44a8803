//! Comandos de texto con prefijo (`#play`, `#ia`, ...).

/// Comando ya interpretado, con su argumento de texto si lo lleva.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join,
    Leave,
    Play(String),
    Skip,
    Stop,
    Queue(usize),
    Now,
    Pause,
    Ia(String),
    Habla(String),
    LimpiarIa,
    Personalidad,
    Resumen(String),
    Help,
}

/// Nombre del comando y sus alias (se comparan sin distinguir mayúsculas).
const NAMES: &[(&str, &[&str])] = &[
    ("join", &["j"]),
    ("leave", &["l"]),
    ("play", &["p"]),
    ("skip", &["sk", "next"]),
    ("stop", &["s", "st"]),
    ("queue", &["q"]),
    ("now", &["np"]),
    ("pause", &["pausa", "resume"]),
    ("ia", &["i"]),
    ("habla", &["h", "voz", "tts"]),
    ("limpiar_ia", &["limpiaria", "clear_ia", "cia"]),
    ("personalidad", &["perso", "persona", "whoami", "info"]),
    ("resumen", &["res", "sum", "tl", "tl;dr"]),
    ("help", &["ayuda", "commands", "comandos"]),
];

fn canonical_name(word: &str) -> Option<&'static str> {
    let word = word.to_lowercase();
    NAMES
        .iter()
        .find(|(name, aliases)| *name == word || aliases.contains(&word.as_str()))
        .map(|(name, _)| *name)
}

impl Command {
    /// Interpreta `content` si empieza por `prefix`. Un nombre desconocido da `None`.
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        let body = content.trim_start().strip_prefix(prefix)?;
        let mut parts = body.splitn(2, char::is_whitespace);
        let name = canonical_name(parts.next()?)?;
        let rest = parts.next().unwrap_or("").trim().to_string();

        let command = match name {
            "join" => Self::Join,
            "leave" => Self::Leave,
            "play" => Self::Play(rest),
            "skip" => Self::Skip,
            "stop" => Self::Stop,
            "queue" => Self::Queue(rest.parse().unwrap_or(1).max(1)),
            "now" => Self::Now,
            "pause" => Self::Pause,
            "ia" => Self::Ia(rest),
            "habla" => Self::Habla(rest),
            "limpiar_ia" => Self::LimpiarIa,
            "personalidad" => Self::Personalidad,
            "resumen" => Self::Resumen(rest),
            _ => Self::Help,
        };
        Some(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Play(_) => "play",
            Self::Skip => "skip",
            Self::Stop => "stop",
            Self::Queue(_) => "queue",
            Self::Now => "now",
            Self::Pause => "pause",
            Self::Ia(_) => "ia",
            Self::Habla(_) => "habla",
            Self::LimpiarIa => "limpiar_ia",
            Self::Personalidad => "personalidad",
            Self::Resumen(_) => "resumen",
            Self::Help => "help",
        }
    }

    /// Comandos de música sujetos a la regla de "mismo canal de voz".
    pub fn is_music(&self) -> bool {
        matches!(
            self,
            Self::Join
                | Self::Leave
                | Self::Play(_)
                | Self::Skip
                | Self::Stop
                | Self::Queue(_)
                | Self::Now
                | Self::Pause
        )
    }

    /// `play` y `join` pueden usarse sin que el bot esté conectado.
    pub fn connects_on_demand(&self) -> bool {
        matches!(self, Self::Join | Self::Play(_))
    }
}
