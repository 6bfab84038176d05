//! v1 cross-boundary contracts for the vocabulary core, lobby API, and CLI.

pub mod serde_u64_string;
pub mod sync;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use sync::{AuthorityRequest, CatalogueEntry, RoundAssignment, SyncMessage};

pub const SCHEMA_VERSION_V1: &str = "1.0";

pub type PlayerId = u64;

pub const MIN_CATEGORIES_PER_ROUND: u8 = 0;
pub const MAX_CATEGORIES_PER_ROUND: u8 = 20;
pub const MIN_CONFIDENCE_THRESHOLD: f64 = 0.1;
pub const MAX_CONFIDENCE_THRESHOLD: f64 = 0.99;

/// Name of the standing profanity category toggled by `punish_profanity`.
pub const PROFANITY_CATEGORY: &str = "Profanity";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PunishmentKind {
    Random,
    Teleport,
    Explode,
    Flash,
    Apologize,
    Suffocate,
}

impl PunishmentKind {
    /// Every kind that can actually execute. `Random` is resolved to one of these.
    pub const CONCRETE: [PunishmentKind; 5] = [
        PunishmentKind::Teleport,
        PunishmentKind::Explode,
        PunishmentKind::Flash,
        PunishmentKind::Apologize,
        PunishmentKind::Suffocate,
    ];

    pub fn is_concrete(self) -> bool {
        self != PunishmentKind::Random
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PunishmentKind::Random => "random",
            PunishmentKind::Teleport => "teleport",
            PunishmentKind::Explode => "explode",
            PunishmentKind::Flash => "flash",
            PunishmentKind::Apologize => "apologize",
            PunishmentKind::Suffocate => "suffocate",
        }
    }
}

impl fmt::Display for PunishmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PunishmentKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(PunishmentKind::Random),
            "teleport" => Ok(PunishmentKind::Teleport),
            "explode" => Ok(PunishmentKind::Explode),
            "flash" => Ok(PunishmentKind::Flash),
            "apologize" | "apologise" => Ok(PunishmentKind::Apologize),
            "suffocate" => Ok(PunishmentKind::Suffocate),
            other => Err(format!("unknown punishment kind: {other}")),
        }
    }
}

/// Authoritative per-session gameplay settings. Owned by the host and
/// replicated to every participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    #[serde(default = "default_punishment")]
    pub punishment: PunishmentKind,
    #[serde(default = "default_shared_per_round")]
    pub shared_categories_per_round: u8,
    #[serde(default)]
    pub private_categories_per_round: u8,
    #[serde(default = "default_true")]
    pub display_category_hints: bool,
    #[serde(default)]
    pub hide_shared_categories: bool,
    #[serde(default)]
    pub hide_private_categories: bool,
    #[serde(default)]
    pub punish_profanity: bool,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_true")]
    pub log_recognition_output: bool,
}

fn default_punishment() -> PunishmentKind {
    PunishmentKind::Random
}

fn default_shared_per_round() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

fn default_confidence_threshold() -> f64 {
    0.9
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            punishment: default_punishment(),
            shared_categories_per_round: default_shared_per_round(),
            private_categories_per_round: 0,
            display_category_hints: true,
            hide_shared_categories: false,
            hide_private_categories: false,
            punish_profanity: false,
            confidence_threshold: default_confidence_threshold(),
            log_recognition_output: true,
        }
    }
}

impl fmt::Display for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "punishment={} shared={} private={} hints={} hide_shared={} hide_private={} profanity={} threshold={:.2}",
            self.punishment,
            self.shared_categories_per_round,
            self.private_categories_per_round,
            self.display_category_hints,
            self.hide_shared_categories,
            self.hide_private_categories,
            self.punish_profanity,
            self.confidence_threshold
        )
    }
}

/// Partial settings write. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub punishment: Option<PunishmentKind>,
    #[serde(default)]
    pub shared_categories_per_round: Option<i64>,
    #[serde(default)]
    pub private_categories_per_round: Option<i64>,
    #[serde(default)]
    pub display_category_hints: Option<bool>,
    #[serde(default)]
    pub hide_shared_categories: Option<bool>,
    #[serde(default)]
    pub hide_private_categories: Option<bool>,
    #[serde(default)]
    pub punish_profanity: Option<bool>,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
    #[serde(default)]
    pub log_recognition_output: Option<bool>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self == &SettingsUpdate::default()
    }
}

/// Top-level configuration as loaded by the CLI. Category word lists are
/// comma separated; validation happens when the catalogue is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModConfig {
    pub schema_version: String,
    #[serde(default, with = "serde_u64_string::option")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub settings: SessionSettings,
    #[serde(default)]
    pub categories: BTreeMap<String, String>,
    #[serde(default)]
    pub custom_categories: BTreeMap<String, String>,
    /// Categories that stay banned every round regardless of selection.
    #[serde(default)]
    pub forced_categories: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Default for ModConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            seed: None,
            settings: SessionSettings::default(),
            categories: BTreeMap::new(),
            custom_categories: BTreeMap::new(),
            forced_categories: Vec::new(),
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    TeleportBuildup,
    TeleportBeam,
    ExplosionWarning,
    Explosion,
    Flash,
    SuffocatorSpawned,
    SuffocatorRemoved,
}

/// Visual/mechanical effect requested from the game world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectRequest {
    pub kind: EffectKind,
    pub player_id: PlayerId,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    Chat,
    Terminal,
    Speech,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LobbyEventType {
    PlayerJoined,
    PlayerLeft,
    CatalogueLoaded,
    SettingsChanged,
    RoundStarted,
    RoundEnded,
    RoundSkipped,
    ViolationDetected,
    PunishmentStarted,
    PunishmentEscalated,
    PunishmentCompleted,
    ApologyAccepted,
    SyncMismatch,
    HintDisplayed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LobbyEvent {
    pub schema_version: String,
    pub sequence: u64,
    pub at_ms: u64,
    pub event_type: LobbyEventType,
    pub player_id: Option<PlayerId>,
    pub details: Option<Value>,
}

impl LobbyEvent {
    pub fn new(
        sequence: u64,
        at_ms: u64,
        event_type: LobbyEventType,
        player_id: Option<PlayerId>,
        details: Option<Value>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            sequence,
            at_ms,
            event_type,
            player_id,
            details,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LobbyStatus {
    pub schema_version: String,
    pub location_id: Option<String>,
    pub round_in_progress: bool,
    pub round_id: u64,
    pub clock_ms: u64,
    pub players: Vec<PlayerId>,
    pub shared_categories: Vec<String>,
}

impl fmt::Display for LobbyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "round={} in_progress={} location={} players={} clock_ms={} shared=[{}]",
            self.round_id,
            self.round_in_progress,
            self.location_id.as_deref().unwrap_or("-"),
            self.players.len(),
            self.clock_ms,
            self.shared_categories.join(", ")
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PlayerNotFound,
    PlayerAlreadyJoined,
    InvalidInput,
    InvalidSetting,
    NotAuthority,
    RoundStateConflict,
    ContractVersionUnsupported,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_fill_missing_fields_with_defaults() {
        let parsed: SessionSettings =
            serde_json::from_str(r#"{"punishment":"flash","private_categories_per_round":2}"#)
                .expect("partial settings");
        assert_eq!(parsed.punishment, PunishmentKind::Flash);
        assert_eq!(parsed.shared_categories_per_round, 1);
        assert_eq!(parsed.private_categories_per_round, 2);
        assert!((parsed.confidence_threshold - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn punishment_kind_parses_case_insensitively() {
        assert_eq!("Teleport".parse::<PunishmentKind>(), Ok(PunishmentKind::Teleport));
        assert_eq!(" apologise ".parse::<PunishmentKind>(), Ok(PunishmentKind::Apologize));
        assert!("vanish".parse::<PunishmentKind>().is_err());
    }

    #[test]
    fn concrete_kinds_exclude_random() {
        assert!(!PunishmentKind::CONCRETE.contains(&PunishmentKind::Random));
        assert!(PunishmentKind::CONCRETE.iter().all(|kind| kind.is_concrete()));
    }

    #[test]
    fn settings_update_is_partial() {
        let update: SettingsUpdate =
            serde_json::from_str(r#"{"hide_shared_categories":true}"#).expect("update");
        assert_eq!(update.hide_shared_categories, Some(true));
        assert!(update.punishment.is_none());
        assert!(!update.is_empty());
        assert!(SettingsUpdate::default().is_empty());
    }

    #[test]
    fn mod_config_accepts_string_seed() {
        let parsed: ModConfig =
            serde_json::from_str(r#"{"schema_version":"1.0","seed":"77"}"#).expect("config");
        assert_eq!(parsed.seed, Some(77));
        assert!(parsed.categories.is_empty());
    }
}
