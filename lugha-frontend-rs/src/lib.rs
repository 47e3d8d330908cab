#![deny(clippy::string_slice)]

mod audio;
pub mod config;
mod difficult_words;
mod events;
mod keys;
mod migration;
mod orchestrator;
mod progress;
mod prompt;
mod session;
mod tracker;

#[cfg(target_arch = "wasm32")]
mod bindings;

pub use audio::{AudioError, AudioPlayer, Silent, play_clip};
pub use config::{DrillConfig, DrillMode, Settings};
pub use difficult_words::{DifficultWordRecord, eligible_difficult_words};
pub use events::ProgressEvent;
pub use keys::StoredKey;
pub use migration::{MigrationOutcome, plan_migration};
pub use orchestrator::{
    CategoryProgress, CompletionEffects, CompletionReport, LessonError, PendingCompletion,
    SessionOrchestrator,
};
pub use progress::{CheckpointPhase, ProgressStore, ResumableSession, SaveError};
pub use prompt::{Prompt, PromptError, build_options, build_prompt};
pub use session::{
    DrillSession, Phase, PhaseKind, QuestionClock, SessionError, SessionScope, SessionView,
};
pub use tracker::{
    AnswerOutcome, MasteryTracker, SessionScore, SessionSummary, TrackerError, build_queue,
    finalize_session, is_mastered, required_repetitions,
};

#[cfg(target_arch = "wasm32")]
pub use audio::HtmlAudioPlayer;
#[cfg(target_arch = "wasm32")]
pub use bindings::{Lugha, available_languages};
