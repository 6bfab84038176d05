//! Messages replicated between the host and participants.
//!
//! Word lists travel once, at join time, as `CatalogueEntry` values. Round
//! assignments only carry category names and every participant resolves the
//! words from its local catalogue.

use serde::{Deserialize, Serialize};

use crate::{PlayerId, SessionSettings, SCHEMA_VERSION_V1};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogueEntry {
    pub category_name: String,
    /// Comma separated, already normalized by the sender.
    pub words: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundAssignment {
    pub schema_version: String,
    pub round_id: u64,
    pub player_id: PlayerId,
    pub location_id: String,
    pub shared_category_names: Vec<String>,
    pub private_category_names: Vec<String>,
}

impl RoundAssignment {
    pub fn new(
        round_id: u64,
        player_id: PlayerId,
        location_id: impl Into<String>,
        shared_category_names: Vec<String>,
        private_category_names: Vec<String>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            round_id,
            player_id,
            location_id: location_id.into(),
            shared_category_names,
            private_category_names,
        }
    }
}

/// Host -> participant traffic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    CatalogueSync {
        entries: Vec<CatalogueEntry>,
        forced_category_names: Vec<String>,
    },
    SettingsSync {
        /// `None` when broadcast to everyone after a settings change.
        target: Option<PlayerId>,
        settings: SessionSettings,
    },
    RoundAssignment(RoundAssignment),
    RoundEnded {
        round_id: u64,
    },
    Notice {
        title: String,
        body: String,
    },
}

impl SyncMessage {
    pub fn label(&self) -> &'static str {
        match self {
            SyncMessage::CatalogueSync { .. } => "catalogue_sync",
            SyncMessage::SettingsSync { .. } => "settings_sync",
            SyncMessage::RoundAssignment(_) => "round_assignment",
            SyncMessage::RoundEnded { .. } => "round_ended",
            SyncMessage::Notice { .. } => "notice",
        }
    }
}

/// Participant -> host traffic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthorityRequest {
    RequestCatalogue { player_id: PlayerId },
    RequestSettings { player_id: PlayerId },
    ToggleProfanity { player_id: PlayerId },
    ToggleHideShared { player_id: PlayerId },
    ToggleHidePrivate { player_id: PlayerId },
}

impl AuthorityRequest {
    pub fn player_id(&self) -> PlayerId {
        match self {
            AuthorityRequest::RequestCatalogue { player_id }
            | AuthorityRequest::RequestSettings { player_id }
            | AuthorityRequest::ToggleProfanity { player_id }
            | AuthorityRequest::ToggleHideShared { player_id }
            | AuthorityRequest::ToggleHidePrivate { player_id } => *player_id,
        }
    }
}
