//! Banned-vocabulary rules engine: catalogue, round selection, matching and punishment.

pub mod authority;
pub mod catalogue;
pub mod eligibility;
pub mod matcher;
pub mod participant;
pub mod punishment;
pub mod scheduler;
pub mod selector;
pub mod session;
pub mod settings;
pub mod speech;
pub mod world;

pub use authority::{effective_forced, Authority, Outbound, Recipient, RoundError};
pub use catalogue::{parse_word_list, Category, CategoryError, CategoryName, VocabularyCatalogue};
pub use eligibility::{category_for_entity, eligible_categories, SessionContext, RESERVED_LOCATION};
pub use matcher::{LegalReason, Matcher, Verdict, TYPED_INPUT_CONFIDENCE};
pub use participant::{category_hint, Participant, ParticipantEvent, SyncError};
pub use punishment::{DispatchOutcome, Dispatcher, PunishmentError, PunishmentEvent, PunishmentState};
pub use scheduler::{ScheduledTask, TaskId, TaskScheduler};
pub use selector::pick_categories;
pub use session::{RoundPhase, SessionVocabularyState, SharedSession, StateError};
pub use settings::SettingsError;
pub use speech::{RecognizedSpeech, SpeechSubscription};
pub use world::{
    show_hint, Collaborators, GameWorld, Hint, HudError, HudSurface, RecognizerControl, RecordingHud,
    RecordingRecognizer, SimPlayer, SimWorld, WorldAction,
};
