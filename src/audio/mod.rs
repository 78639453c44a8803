pub mod coordinator;
pub mod notify;
pub mod queue;
pub mod registry;
pub mod speech;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{CoordinatorSettings, PauseOutcome, PlaybackCoordinator};
pub use registry::{GuildRegistry, VoiceFactory};
pub use speech::SpeechBridge;
