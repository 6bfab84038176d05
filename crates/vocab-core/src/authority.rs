//! The host role: settings, catalogue and round lifecycle.
//!
//! The authority decides and pushes; it never negotiates. Every decision
//! lands in the outbox as a `SyncMessage` addressed to one participant or to
//! everyone, and the transport drains it.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{
    AuthorityRequest, CatalogueEntry, ModConfig, PlayerId, PunishmentKind, RoundAssignment,
    SessionSettings, SettingsUpdate, SyncMessage, PROFANITY_CATEGORY,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::catalogue::{CategoryName, VocabularyCatalogue};
use crate::eligibility::{eligible_categories, SessionContext};
use crate::selector::pick_categories;
use crate::session::{SessionVocabularyState, StateError};
use crate::settings::{apply_update, validate, validate_category_count, validate_confidence_threshold, SettingsError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundError {
    #[error("round {round_id} is already in progress")]
    AlreadyInProgress { round_id: u64 },
    #[error(transparent)]
    Selection(#[from] StateError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Player(PlayerId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: Recipient,
    pub message: SyncMessage,
}

#[derive(Debug)]
pub struct Authority {
    host_id: PlayerId,
    settings: SessionSettings,
    catalogue: VocabularyCatalogue,
    configured_forced: BTreeSet<CategoryName>,
    rng: StdRng,
    state: SessionVocabularyState,
    players: BTreeSet<PlayerId>,
    location_id: Option<String>,
    round_eligible: BTreeSet<CategoryName>,
    round_private: BTreeMap<PlayerId, BTreeSet<CategoryName>>,
    outbox: Vec<Outbound>,
}

impl Authority {
    pub fn new(host_id: PlayerId, config: &ModConfig, seed: u64) -> Result<Self, SettingsError> {
        validate(&config.settings)?;
        let catalogue = VocabularyCatalogue::from_config(config);
        let configured_forced = config
            .forced_categories
            .iter()
            .map(|name| name.trim().to_string())
            .filter(|name| {
                let known = catalogue.contains(name);
                if !known {
                    warn!(category = %name, "configured forced category is not in the catalogue");
                }
                known
            })
            .collect();
        Ok(Self {
            host_id,
            settings: config.settings.clone(),
            catalogue,
            configured_forced,
            rng: StdRng::seed_from_u64(seed),
            state: SessionVocabularyState::default(),
            players: BTreeSet::new(),
            location_id: None,
            round_eligible: BTreeSet::new(),
            round_private: BTreeMap::new(),
            outbox: Vec::new(),
        })
    }

    pub fn host_id(&self) -> PlayerId {
        self.host_id
    }

    pub fn catalogue(&self) -> &VocabularyCatalogue {
        &self.catalogue
    }

    pub fn catalogue_entries(&self) -> Vec<CatalogueEntry> {
        self.catalogue.entries()
    }

    /// Forced categories from the config, without the profanity toggle.
    pub fn configured_forced(&self) -> &BTreeSet<CategoryName> {
        &self.configured_forced
    }

    /// Forced categories in effect for the next round.
    pub fn forced_categories(&self) -> BTreeSet<CategoryName> {
        effective_forced(&self.configured_forced, &self.settings, &self.catalogue)
    }

    pub fn players(&self) -> &BTreeSet<PlayerId> {
        &self.players
    }

    pub fn round_in_progress(&self) -> bool {
        self.state.round_in_progress()
    }

    pub fn round_id(&self) -> u64 {
        self.state.round_id()
    }

    pub fn location_id(&self) -> Option<&str> {
        self.location_id.as_deref()
    }

    pub fn shared_categories(&self) -> &BTreeSet<CategoryName> {
        self.state.shared_categories()
    }

    pub fn private_categories_of(&self, player_id: PlayerId) -> Option<&BTreeSet<CategoryName>> {
        self.round_private.get(&player_id)
    }

    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    /// Adds a participant and sends it the catalogue. Settings follow once
    /// the participant asks for them.
    pub fn register(&mut self, player_id: PlayerId) {
        if self.players.insert(player_id) {
            info!(player_id, "participant registered");
        }
        self.send(Recipient::Player(player_id), self.catalogue_sync());
    }

    pub fn unregister(&mut self, player_id: PlayerId) {
        if self.players.remove(&player_id) {
            self.round_private.remove(&player_id);
            info!(player_id, "participant left");
        }
    }

    pub fn start_round(&mut self, context: &SessionContext) -> Result<u64, RoundError> {
        if self.state.round_in_progress() {
            let round_id = self.state.round_id();
            error!(round_id, "round start requested while a round is in progress, ignoring");
            return Err(RoundError::AlreadyInProgress { round_id });
        }

        let eligible = eligible_categories(&self.catalogue, context, &self.state, true);
        let shared = pick_categories(
            &eligible,
            i64::from(self.settings.shared_categories_per_round),
            &mut self.rng,
        );
        self.state.begin_round(&self.catalogue, shared, BTreeSet::new())?;
        self.location_id = Some(context.location_id.clone());
        self.round_eligible = eligible;
        self.round_private.clear();

        info!(
            round_id = self.state.round_id(),
            location = %context.location_id,
            shared = ?self.state.shared_categories(),
            eligible = self.round_eligible.len(),
            "round started"
        );
        let players: Vec<PlayerId> = self.players.iter().copied().collect();
        for player_id in players {
            let assignment = self.assignment_for(player_id);
            self.send(Recipient::Player(player_id), SyncMessage::RoundAssignment(assignment));
        }
        Ok(self.state.round_id())
    }

    /// Ends the round. Ending while idle is a no-op and returns `None`.
    pub fn end_round(&mut self) -> Option<u64> {
        if !self.state.round_in_progress() {
            debug!("round end requested while idle");
            return None;
        }
        let round_id = self.state.round_id();
        self.state.end_round(&self.catalogue);
        self.round_private.clear();
        self.round_eligible.clear();
        info!(round_id, "round ended");
        self.send(Recipient::All, SyncMessage::RoundEnded { round_id });
        Some(round_id)
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn punishment(&self) -> PunishmentKind {
        self.settings.punishment
    }

    pub fn shared_categories_per_round(&self) -> u8 {
        self.settings.shared_categories_per_round
    }

    pub fn private_categories_per_round(&self) -> u8 {
        self.settings.private_categories_per_round
    }

    pub fn display_category_hints(&self) -> bool {
        self.settings.display_category_hints
    }

    pub fn hide_shared_categories(&self) -> bool {
        self.settings.hide_shared_categories
    }

    pub fn hide_private_categories(&self) -> bool {
        self.settings.hide_private_categories
    }

    pub fn punish_profanity(&self) -> bool {
        self.settings.punish_profanity
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.settings.confidence_threshold
    }

    pub fn set_punishment(&mut self, kind: PunishmentKind) {
        let mut next = self.settings.clone();
        next.punishment = kind;
        self.commit(next);
    }

    pub fn set_shared_categories_per_round(&mut self, count: i64) -> Result<(), SettingsError> {
        let mut next = self.settings.clone();
        next.shared_categories_per_round = validate_category_count("shared_categories_per_round", count)?;
        self.commit(next);
        Ok(())
    }

    pub fn set_private_categories_per_round(&mut self, count: i64) -> Result<(), SettingsError> {
        let mut next = self.settings.clone();
        next.private_categories_per_round = validate_category_count("private_categories_per_round", count)?;
        self.commit(next);
        Ok(())
    }

    pub fn set_display_category_hints(&mut self, display: bool) {
        let mut next = self.settings.clone();
        next.display_category_hints = display;
        self.commit(next);
    }

    pub fn set_hide_shared_categories(&mut self, hide: bool) {
        let mut next = self.settings.clone();
        next.hide_shared_categories = hide;
        self.commit(next);
    }

    pub fn set_hide_private_categories(&mut self, hide: bool) {
        let mut next = self.settings.clone();
        next.hide_private_categories = hide;
        self.commit(next);
    }

    pub fn set_punish_profanity(&mut self, punish: bool) {
        let mut next = self.settings.clone();
        next.punish_profanity = punish;
        self.commit(next);
    }

    pub fn set_confidence_threshold(&mut self, threshold: f64) -> Result<(), SettingsError> {
        let mut next = self.settings.clone();
        next.confidence_threshold = validate_confidence_threshold(threshold)?;
        self.commit(next);
        Ok(())
    }

    pub fn set_log_recognition_output(&mut self, log: bool) {
        let mut next = self.settings.clone();
        next.log_recognition_output = log;
        self.commit(next);
    }

    /// Partial settings write on behalf of `requester`, who must be the host.
    pub fn apply_update(
        &mut self,
        requester: PlayerId,
        update: &SettingsUpdate,
    ) -> Result<&SessionSettings, SettingsError> {
        self.require_host(requester)?;
        let next = apply_update(&self.settings, update)?;
        self.commit(next);
        Ok(&self.settings)
    }

    /// Replaces the configured forced categories. Participants adopt the new
    /// set once they are idle, so a running round keeps its words. Returns
    /// whether anything changed.
    pub fn set_forced_categories(
        &mut self,
        requester: PlayerId,
        names: &BTreeSet<CategoryName>,
    ) -> Result<bool, SettingsError> {
        self.require_host(requester)?;
        let mut next = BTreeSet::new();
        for name in names {
            let name = name.trim();
            if !self.catalogue.contains(name) {
                return Err(SettingsError::UnknownCategory { name: name.to_string() });
            }
            next.insert(name.to_string());
        }
        if next == self.configured_forced {
            debug!("forced categories unchanged");
            return Ok(false);
        }
        info!(forced = ?next, "forced categories changed");
        self.configured_forced = next;
        self.send(Recipient::All, self.catalogue_sync());
        Ok(true)
    }

    pub fn toggle_profanity(&mut self, requester: PlayerId) -> Result<bool, SettingsError> {
        self.require_host(requester)?;
        let punish = !self.settings.punish_profanity;
        self.set_punish_profanity(punish);
        let notice = if punish {
            ("Curse words will be banned!", "Applies on the next moon\nWatch your language...")
        } else {
            ("Curse words will be legal!", "Applies on the next moon\nGo wild ;)")
        };
        self.notice_all(notice.0, notice.1);
        Ok(punish)
    }

    pub fn toggle_hide_shared(&mut self, requester: PlayerId) -> Result<bool, SettingsError> {
        self.require_host(requester)?;
        let hide = !self.settings.hide_shared_categories;
        self.set_hide_shared_categories(hide);
        let title = if hide {
            "Shared Categories will be hidden"
        } else {
            "Shared Categories will be shown"
        };
        self.notice_all(title, "Applies on the next moon");
        Ok(hide)
    }

    pub fn toggle_hide_private(&mut self, requester: PlayerId) -> Result<bool, SettingsError> {
        self.require_host(requester)?;
        let hide = !self.settings.hide_private_categories;
        self.set_hide_private_categories(hide);
        let title = if hide {
            "Private Categories will be hidden"
        } else {
            "Private Categories will be shown"
        };
        self.notice_all(title, "Applies on the next moon");
        Ok(hide)
    }

    /// Everything a late joiner needs after the catalogue: its settings and,
    /// mid-round, its own assignment.
    pub fn settings_for(&mut self, player_id: PlayerId) -> Vec<SyncMessage> {
        let mut messages = vec![SyncMessage::SettingsSync {
            target: Some(player_id),
            settings: self.settings.clone(),
        }];
        if self.state.round_in_progress() && self.players.contains(&player_id) {
            messages.push(SyncMessage::RoundAssignment(self.assignment_for(player_id)));
        }
        messages
    }

    pub fn handle_request(&mut self, request: &AuthorityRequest) -> Result<(), SettingsError> {
        debug!(request = ?request, "authority request");
        match request {
            AuthorityRequest::RequestCatalogue { player_id } => {
                self.send(Recipient::Player(*player_id), self.catalogue_sync());
            }
            AuthorityRequest::RequestSettings { player_id } => {
                for message in self.settings_for(*player_id) {
                    self.send(Recipient::Player(*player_id), message);
                }
            }
            AuthorityRequest::ToggleProfanity { player_id } => {
                self.toggle_profanity(*player_id)?;
            }
            AuthorityRequest::ToggleHideShared { player_id } => {
                self.toggle_hide_shared(*player_id)?;
            }
            AuthorityRequest::ToggleHidePrivate { player_id } => {
                self.toggle_hide_private(*player_id)?;
            }
        }
        Ok(())
    }

    fn assignment_for(&mut self, player_id: PlayerId) -> RoundAssignment {
        let private = match self.round_private.get(&player_id) {
            Some(existing) => existing.clone(),
            None => {
                let pool: BTreeSet<CategoryName> = self
                    .round_eligible
                    .difference(self.state.shared_categories())
                    .cloned()
                    .collect();
                let picked = pick_categories(
                    &pool,
                    i64::from(self.settings.private_categories_per_round),
                    &mut self.rng,
                );
                self.round_private.insert(player_id, picked.clone());
                picked
            }
        };
        RoundAssignment::new(
            self.state.round_id(),
            player_id,
            self.location_id.clone().unwrap_or_default(),
            self.state.shared_categories().iter().cloned().collect(),
            private.into_iter().collect(),
        )
    }

    fn catalogue_sync(&self) -> SyncMessage {
        SyncMessage::CatalogueSync {
            entries: self.catalogue.entries(),
            forced_category_names: self.configured_forced.iter().cloned().collect(),
        }
    }

    fn commit(&mut self, next: SessionSettings) {
        if next == self.settings {
            debug!("settings unchanged");
            return;
        }
        info!(settings = %next, "settings changed");
        self.settings = next;
        self.send(
            Recipient::All,
            SyncMessage::SettingsSync {
                target: None,
                settings: self.settings.clone(),
            },
        );
    }

    fn require_host(&self, requester: PlayerId) -> Result<(), SettingsError> {
        if requester != self.host_id {
            warn!(player_id = requester, "non-host tried to change a host setting");
            return Err(SettingsError::NotAuthority { player_id: requester });
        }
        Ok(())
    }

    fn notice_all(&mut self, title: &str, body: &str) {
        self.send(
            Recipient::All,
            SyncMessage::Notice {
                title: title.to_string(),
                body: body.to_string(),
            },
        );
    }

    fn send(&mut self, to: Recipient, message: SyncMessage) {
        debug!(to = ?to, message = message.label(), "queued sync message");
        self.outbox.push(Outbound { to, message });
    }
}

/// Configured forced categories plus `Profanity` while it is punished.
pub fn effective_forced(
    configured: &BTreeSet<CategoryName>,
    settings: &SessionSettings,
    catalogue: &VocabularyCatalogue,
) -> BTreeSet<CategoryName> {
    let mut forced = configured.clone();
    if settings.punish_profanity && catalogue.contains(PROFANITY_CATEGORY) {
        forced.insert(PROFANITY_CATEGORY.to_string());
    }
    forced
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: PlayerId = 1;

    fn authority(settings: SessionSettings) -> Authority {
        let config = ModConfig {
            settings,
            ..ModConfig::default()
        };
        Authority::new(HOST, &config, 42).expect("authority")
    }

    fn assignments(outbox: &[Outbound]) -> Vec<RoundAssignment> {
        outbox
            .iter()
            .filter_map(|out| match &out.message {
                SyncMessage::RoundAssignment(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn register_sends_catalogue_to_the_joiner_only() {
        let mut authority = authority(SessionSettings::default());
        authority.register(2);
        let outbox = authority.drain_outbox();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].to, Recipient::Player(2));
        assert!(matches!(&outbox[0].message, SyncMessage::CatalogueSync { entries, .. } if entries.len() == 17));
    }

    #[test]
    fn shared_picks_are_identical_and_private_never_overlaps() {
        let mut authority = authority(SessionSettings {
            shared_categories_per_round: 1,
            private_categories_per_round: 2,
            ..SessionSettings::default()
        });
        for player in [1, 2, 3] {
            authority.register(player);
        }
        authority.drain_outbox();

        let context = SessionContext::new("8 Titan", ["Jester", "Nutcracker", "Spring", "Flowerman", "Bunker Spider"]);
        let round_id = authority.start_round(&context).expect("start");
        assert_eq!(round_id, 1);

        let sent = assignments(&authority.drain_outbox());
        assert_eq!(sent.len(), 3);
        let shared = &sent[0].shared_category_names;
        assert_eq!(shared.len(), 1);
        for assignment in &sent {
            assert_eq!(&assignment.shared_category_names, shared);
            assert_eq!(assignment.private_category_names.len(), 2);
            assert!(assignment.private_category_names.iter().all(|name| !shared.contains(name)));
        }
    }

    #[test]
    fn second_start_is_rejected_and_end_is_idempotent() {
        let mut authority = authority(SessionSettings::default());
        authority.register(HOST);
        let context = SessionContext::new("41 Experimentation", ["Flowerman"]);
        authority.start_round(&context).expect("start");
        assert_eq!(
            authority.start_round(&context),
            Err(RoundError::AlreadyInProgress { round_id: 1 })
        );
        assert_eq!(authority.end_round(), Some(1));
        assert_eq!(authority.end_round(), None);
        assert!(!authority.round_in_progress());
    }

    #[test]
    fn reserved_location_starts_an_empty_round() {
        let mut authority = authority(SessionSettings::default());
        authority.register(HOST);
        authority.drain_outbox();
        authority
            .start_round(&SessionContext::new("71 Gordion", ["Flowerman"]))
            .expect("start");
        assert!(authority.shared_categories().is_empty());
        let sent = assignments(&authority.drain_outbox());
        assert!(sent[0].shared_category_names.is_empty());
    }

    #[test]
    fn non_host_cannot_toggle() {
        let mut authority = authority(SessionSettings::default());
        let err = authority
            .handle_request(&AuthorityRequest::ToggleProfanity { player_id: 5 })
            .unwrap_err();
        assert_eq!(err, SettingsError::NotAuthority { player_id: 5 });
        assert!(!authority.punish_profanity());
        assert!(authority.drain_outbox().is_empty());
    }

    #[test]
    fn profanity_toggle_broadcasts_settings_and_notice() {
        let mut authority = authority(SessionSettings::default());
        assert!(authority.toggle_profanity(HOST).expect("toggle"));
        assert!(authority.forced_categories().contains(PROFANITY_CATEGORY));
        let outbox = authority.drain_outbox();
        assert!(outbox.iter().all(|out| out.to == Recipient::All));
        assert!(matches!(outbox[0].message, SyncMessage::SettingsSync { target: None, .. }));
        assert!(matches!(&outbox[1].message, SyncMessage::Notice { title, .. } if title == "Curse words will be banned!"));
    }

    #[test]
    fn only_the_host_may_write_settings() {
        let mut authority = authority(SessionSettings::default());
        let update = SettingsUpdate {
            punishment: Some(PunishmentKind::Explode),
            ..SettingsUpdate::default()
        };
        assert_eq!(
            authority.apply_update(5, &update).unwrap_err(),
            SettingsError::NotAuthority { player_id: 5 }
        );
        assert_eq!(authority.punishment(), PunishmentKind::Random);
        assert!(authority.drain_outbox().is_empty());

        let settings = authority.apply_update(HOST, &update).expect("host update");
        assert_eq!(settings.punishment, PunishmentKind::Explode);
    }

    #[test]
    fn forced_categories_are_validated_and_broadcast() {
        let mut authority = authority(SessionSettings::default());
        let thumper: BTreeSet<CategoryName> = [" Thumper ".to_string()].into_iter().collect();
        assert_eq!(
            authority.set_forced_categories(2, &thumper),
            Err(SettingsError::NotAuthority { player_id: 2 })
        );
        let unknown: BTreeSet<CategoryName> = ["Leviathan".to_string()].into_iter().collect();
        assert_eq!(
            authority.set_forced_categories(HOST, &unknown),
            Err(SettingsError::UnknownCategory {
                name: "Leviathan".to_string()
            })
        );
        assert!(authority.configured_forced().is_empty());

        assert_eq!(authority.set_forced_categories(HOST, &thumper), Ok(true));
        assert!(authority.forced_categories().contains("Thumper"));
        let outbox = authority.drain_outbox();
        assert_eq!(outbox.len(), 1);
        assert!(matches!(
            &outbox[0].message,
            SyncMessage::CatalogueSync { forced_category_names, .. } if forced_category_names == &vec!["Thumper".to_string()]
        ));

        assert_eq!(authority.set_forced_categories(HOST, &thumper), Ok(false));
        assert!(authority.drain_outbox().is_empty());
    }

    #[test]
    fn unchanged_setting_is_not_rebroadcast() {
        let mut authority = authority(SessionSettings::default());
        authority.set_punishment(PunishmentKind::Random);
        assert!(authority.drain_outbox().is_empty());
        assert!(authority.set_shared_categories_per_round(25).is_err());
        assert!(authority.drain_outbox().is_empty());
    }

    #[test]
    fn late_joiner_gets_settings_and_its_assignment() {
        let mut authority = authority(SessionSettings {
            private_categories_per_round: 1,
            ..SessionSettings::default()
        });
        authority.register(HOST);
        let context = SessionContext::new("85 Rend", ["Jester", "Nutcracker", "Spring", "Girl"]);
        authority.start_round(&context).expect("start");
        authority.register(9);
        authority.drain_outbox();

        let messages = authority.settings_for(9);
        assert!(matches!(messages[0], SyncMessage::SettingsSync { target: Some(9), .. }));
        let SyncMessage::RoundAssignment(assignment) = &messages[1] else {
            panic!("expected an assignment");
        };
        assert_eq!(assignment.player_id, 9);
        assert_eq!(assignment.round_id, authority.round_id());

        // Asking again yields the same private draw.
        let again = authority.settings_for(9);
        assert_eq!(again[1], messages[1]);
    }
}
