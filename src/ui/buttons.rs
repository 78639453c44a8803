use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

use crate::audio::queue::QueuePage;

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PAUSE_RESUME: &str = "np_pause_resume";
    pub const SKIP: &str = "np_skip";
    pub const STOP: &str = "np_stop";
    pub const QUEUE_PAGE_PREFIX: &str = "queue_page:";
}

/// Lo que pide un botón pulsado.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    PauseResume,
    Skip,
    Stop,
    QueuePage(usize),
}

impl ButtonAction {
    pub fn parse(custom_id: &str) -> Option<Self> {
        match custom_id {
            button_ids::PAUSE_RESUME => Some(Self::PauseResume),
            button_ids::SKIP => Some(Self::Skip),
            button_ids::STOP => Some(Self::Stop),
            other => other
                .strip_prefix(button_ids::QUEUE_PAGE_PREFIX)
                .and_then(|page| page.parse().ok())
                .map(Self::QueuePage),
        }
    }
}

pub fn now_playing_buttons() -> Vec<CreateActionRow> {
    vec![CreateActionRow::Buttons(vec![
        CreateButton::new(button_ids::PAUSE_RESUME)
            .label("⏯ Pausa/Resume")
            .style(ButtonStyle::Primary),
        CreateButton::new(button_ids::SKIP)
            .label("⏭ Skip")
            .style(ButtonStyle::Success),
        CreateButton::new(button_ids::STOP)
            .label("🛑 Stop")
            .style(ButtonStyle::Danger),
    ])]
}

/// Botones anterior/siguiente; nada si la cola cabe en una página.
pub fn queue_navigation(page: &QueuePage) -> Vec<CreateActionRow> {
    if page.total_pages <= 1 {
        return Vec::new();
    }

    let previous = CreateButton::new(format!(
        "{}{}",
        button_ids::QUEUE_PAGE_PREFIX,
        page.page.saturating_sub(1).max(1)
    ))
    .label("⬅️ Anterior")
    .style(ButtonStyle::Secondary)
    .disabled(!page.has_previous());

    let next = CreateButton::new(format!(
        "{}{}",
        button_ids::QUEUE_PAGE_PREFIX,
        (page.page + 1).min(page.total_pages)
    ))
    .label("Siguiente ➡️")
    .style(ButtonStyle::Secondary)
    .disabled(!page.has_next());

    vec![CreateActionRow::Buttons(vec![previous, next])]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_known_ids() {
        assert_eq!(ButtonAction::parse("np_skip"), Some(ButtonAction::Skip));
        assert_eq!(ButtonAction::parse("np_pause_resume"), Some(ButtonAction::PauseResume));
        assert_eq!(ButtonAction::parse("queue_page:3"), Some(ButtonAction::QueuePage(3)));
        assert_eq!(ButtonAction::parse("queue_page:x"), None);
        assert_eq!(ButtonAction::parse("otro"), None);
    }

    #[test]
    fn single_page_has_no_navigation() {
        let titles = vec!["a".to_string()];
        assert!(queue_navigation(&QueuePage::from_titles(&titles, 1, 50)).is_empty());

        let many: Vec<String> = (0..120).map(|i| i.to_string()).collect();
        assert_eq!(queue_navigation(&QueuePage::from_titles(&many, 2, 50)).len(), 1);
    }
}
