use serenity::model::id::ChannelId;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Origen de una canción dentro de la cola.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLabel {
    /// El usuario pegó una URL.
    Direct,
    /// Se resolvió a partir de una búsqueda de texto.
    ResolvedSearch,
}

impl SourceLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceLabel::Direct => "direct",
            SourceLabel::ResolvedSearch => "resolved-search",
        }
    }
}

/// Una canción pendiente o en reproducción. Inmutable una vez creada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub source_url: String,
    pub display_title: String,
    pub requested_by: String,
    pub origin_channel: ChannelId,
    pub source_label: SourceLabel,
}

/// Cola FIFO acotada de un servidor.
///
/// Llena y vacía no son errores: `enqueue` devuelve `false` y `dequeue` devuelve `None`.
#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega al final si queda espacio. Si la cola está llena no la toca.
    pub fn enqueue(&mut self, track: Track) -> bool {
        if self.remaining() == 0 {
            debug!(
                "🚫 Cola llena ({}/{}), rechazada: {}",
                self.items.len(),
                self.max_size,
                track.display_title
            );
            return false;
        }

        debug!("➕ Agregado a la cola: {}", track.display_title);
        self.items.push_back(track);
        true
    }

    /// Saca la primera canción (FIFO)
    pub fn dequeue(&mut self) -> Option<Track> {
        let next = self.items.pop_front();
        if let Some(ref track) = next {
            debug!("➡️ Siguiente en cola (FIFO): {}", track.display_title);
        }
        next
    }

    pub fn clear(&mut self) {
        if !self.items.is_empty() {
            info!("🗑️ Cola limpiada ({} canciones)", self.items.len());
        }
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn remaining(&self) -> usize {
        self.max_size.saturating_sub(self.items.len())
    }

    pub fn peek_titles(&self) -> Vec<String> {
        self.items.iter().map(|t| t.display_title.clone()).collect()
    }
}

/// Una página de títulos para el comando `queue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePage {
    pub items: Vec<String>,
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    /// Posición (1-based) del primer elemento de la página.
    pub first_position: usize,
}

impl QueuePage {
    /// Pagina sobre una copia de los títulos. Las páginas empiezan en 1 y una
    /// página fuera de rango se ajusta a la última.
    pub fn from_titles(titles: &[String], page: usize, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let total_items = titles.len();
        let total_pages = total_items.div_ceil(page_size).max(1);
        let page = page.clamp(1, total_pages);

        let start = (page - 1) * page_size;
        let items: Vec<String> = titles.iter().skip(start).take(page_size).cloned().collect();

        Self {
            items,
            page,
            total_pages,
            total_items,
            first_position: start + 1,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}
