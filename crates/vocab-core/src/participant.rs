//! One player's side of a session.
//!
//! A participant applies whatever the host pushes, keeps its own replicated
//! catalogue and vocabulary state, and judges its local player's input. The
//! host is also a participant; only its `Authority` is extra.
//!
//! Every `apply` is idempotent: replaying a message the participant has
//! already seen changes nothing.

use std::collections::BTreeSet;

use contracts::{
    AuthorityRequest, CatalogueEntry, InputSource, PlayerId, RoundAssignment, SessionSettings, SyncMessage,
    SCHEMA_VERSION_V1,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::authority::effective_forced;
use crate::catalogue::{CategoryName, VocabularyCatalogue};
use crate::matcher::{normalize, Matcher, Verdict, TYPED_INPUT_CONFIDENCE};
use crate::punishment::{Dispatcher, PunishmentEvent, PunishmentState};
use crate::session::{SessionVocabularyState, SharedSession, StateError};
use crate::speech::SpeechSubscription;
use crate::world::{show_hint, Collaborators};

pub const COMMAND_PREFIX: &str = "/lv";
pub const HINT_TITLE: &str = "Don't talk about...";
const TRANSMIT_COMMAND: &str = "transmit";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("round {round_id} names category \"{name}\" missing from the local catalogue")]
    UnknownCategory { round_id: u64, name: String },
    #[error("unsupported schema version {found}")]
    SchemaMismatch { found: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParticipantEvent {
    RoundStarted {
        round_id: u64,
        shared: Vec<String>,
        private: Vec<String>,
    },
    RoundEnded {
        round_id: u64,
    },
    SyncMismatch {
        round_id: u64,
        category: String,
    },
    HintDisplayed {
        title: String,
        body: String,
    },
    Violation {
        source: InputSource,
        word: String,
    },
    Punishment(PunishmentEvent),
}

/// Body of the round-start hint, or `None` when nothing should be shown.
pub fn category_hint(
    settings: &SessionSettings,
    shared: &BTreeSet<CategoryName>,
    private: &BTreeSet<CategoryName>,
) -> Option<String> {
    if !settings.display_category_hints {
        return None;
    }
    let mut names: Vec<&str> = Vec::new();
    if !settings.hide_shared_categories {
        names.extend(shared.iter().map(String::as_str));
    }
    if !settings.hide_private_categories {
        names.extend(private.iter().map(String::as_str));
    }
    (!names.is_empty()).then(|| names.join(", "))
}

#[derive(Debug)]
pub struct Participant {
    player_id: PlayerId,
    is_host: bool,
    catalogue: VocabularyCatalogue,
    configured_forced: BTreeSet<CategoryName>,
    catalogue_synced: bool,
    settings: SessionSettings,
    session: SharedSession,
    matcher: Matcher,
    dispatcher: Dispatcher,
    speech: SpeechSubscription,
    requests: Vec<AuthorityRequest>,
    events: Vec<ParticipantEvent>,
}

impl Participant {
    pub fn new(player_id: PlayerId, is_host: bool, seed: u64) -> Self {
        let settings = SessionSettings::default();
        Self {
            player_id,
            is_host,
            catalogue: VocabularyCatalogue::default(),
            configured_forced: BTreeSet::new(),
            catalogue_synced: false,
            matcher: Matcher::new(settings.confidence_threshold),
            dispatcher: Dispatcher::new(settings.punishment, seed),
            settings,
            session: SharedSession::default(),
            speech: SpeechSubscription::new(),
            requests: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn catalogue(&self) -> &VocabularyCatalogue {
        &self.catalogue
    }

    pub fn is_synced(&self) -> bool {
        self.catalogue_synced
    }

    pub fn state(&self) -> SessionVocabularyState {
        self.session.snapshot()
    }

    pub fn punishment_state(&self) -> PunishmentState {
        self.dispatcher.state(self.player_id)
    }

    pub fn pending_apology(&self) -> Option<&str> {
        self.dispatcher.pending_apology(self.player_id)
    }

    /// Handle for the speech recognizer's callback thread.
    pub fn speech_subscription(&self) -> SpeechSubscription {
        self.speech.clone()
    }

    pub fn drain_requests(&mut self) -> Vec<AuthorityRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn drain_events(&mut self) -> Vec<ParticipantEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn apply(&mut self, message: &SyncMessage, collab: &mut Collaborators<'_>) -> Result<(), SyncError> {
        debug!(player_id = self.player_id, message = message.label(), "applying sync message");
        match message {
            SyncMessage::CatalogueSync {
                entries,
                forced_category_names,
            } => {
                self.apply_catalogue(entries, forced_category_names);
                Ok(())
            }
            SyncMessage::SettingsSync { target, settings } => {
                if target.is_some_and(|id| id != self.player_id) {
                    return Ok(());
                }
                self.apply_settings(settings);
                Ok(())
            }
            SyncMessage::RoundAssignment(assignment) => self.apply_assignment(assignment, collab),
            SyncMessage::RoundEnded { round_id } => {
                self.apply_round_end(*round_id, collab);
                Ok(())
            }
            SyncMessage::Notice { title, body } => {
                self.hint(collab, title, body);
                Ok(())
            }
        }
    }

    /// Chat submission. Returns the text that should continue on to the
    /// game; an empty string means the message was swallowed.
    pub fn on_chat_submit(&mut self, text: &str, collab: &mut Collaborators<'_>) -> String {
        if let Some(args) = command_args(text) {
            self.run_command(&args, collab);
            return String::new();
        }
        if self.dispatcher.try_apologize(self.player_id, text, collab.hud) {
            self.collect_punishment_events();
            return text.to_string();
        }
        if self.check(InputSource::Chat, text, TYPED_INPUT_CONFIDENCE, collab) {
            text.to_string()
        } else {
            String::new()
        }
    }

    /// Terminal command. A violating `transmit` is swallowed; any other
    /// violating command is punished but still passes through.
    pub fn on_terminal_command(&mut self, text: &str, collab: &mut Collaborators<'_>) -> String {
        let legal = self.check(InputSource::Terminal, text, TYPED_INPUT_CONFIDENCE, collab);
        if !legal && normalize(text).starts_with(TRANSMIT_COMMAND) {
            return String::new();
        }
        text.to_string()
    }

    pub fn on_speech_recognized(&mut self, transcript: &str, confidence: f64, collab: &mut Collaborators<'_>) {
        if self.settings.log_recognition_output {
            if confidence >= self.matcher.confidence_threshold() {
                warn!(player_id = self.player_id, transcript, confidence, "speech recognized");
            } else {
                info!(player_id = self.player_id, transcript, confidence, "speech recognized below threshold");
            }
        }
        self.check(InputSource::Speech, transcript, confidence, collab);
    }

    /// `true` when `text` is allowed. A violation dispatches exactly one
    /// punishment for the local player before returning `false`.
    pub fn is_legal(&mut self, text: &str, confidence: f64, collab: &mut Collaborators<'_>) -> bool {
        self.check(InputSource::Chat, text, confidence, collab)
    }

    /// Drains queued speech, then runs every punishment task due by `now_ms`.
    pub fn pump(&mut self, now_ms: u64, collab: &mut Collaborators<'_>) {
        for speech in self.speech.drain() {
            self.on_speech_recognized(&speech.text, speech.confidence, collab);
        }
        self.dispatcher.advance(now_ms, collab.world, collab.hud);
        self.collect_punishment_events();
    }

    /// The player left the lobby: stop listening and drop pending work.
    pub fn disconnect(&mut self, collab: &mut Collaborators<'_>) {
        collab.recognizer.stop();
        collab.recognizer.unload_grammar();
        self.dispatcher.reset();
        let catalogue = &self.catalogue;
        self.session.modify(|state| state.end_round(catalogue));
        info!(player_id = self.player_id, "participant disconnected");
    }

    fn check(&mut self, source: InputSource, text: &str, confidence: f64, collab: &mut Collaborators<'_>) -> bool {
        let alive = collab.world.is_player_alive(self.player_id);
        let verdict = self
            .session
            .read(|state| self.matcher.evaluate(state, text, confidence, alive));
        let Verdict::Violation { word } = verdict else {
            return true;
        };

        info!(player_id = self.player_id, source = ?source, word = %word, "banned word used");
        self.events.push(ParticipantEvent::Violation { source, word });
        if let Err(err) = self.dispatcher.dispatch(self.player_id, false, collab.world, collab.hud) {
            debug!(player_id = self.player_id, error = %err, "violation left unpunished");
        }
        self.collect_punishment_events();
        false
    }

    fn apply_catalogue(&mut self, entries: &[CatalogueEntry], forced: &[String]) {
        let forced: BTreeSet<CategoryName> = forced.iter().cloned().collect();
        if self.catalogue_synced && self.catalogue.entries() == entries && self.configured_forced == forced {
            debug!(player_id = self.player_id, "catalogue already in sync");
            return;
        }

        self.catalogue = VocabularyCatalogue::from_entries(entries);
        self.configured_forced = forced;
        info!(player_id = self.player_id, categories = self.catalogue.len(), "catalogue received");
        self.refresh_forced_if_idle();

        if !self.catalogue_synced {
            self.catalogue_synced = true;
            self.requests.push(AuthorityRequest::RequestSettings {
                player_id: self.player_id,
            });
        }
    }

    fn apply_settings(&mut self, settings: &SessionSettings) {
        if &self.settings == settings {
            debug!(player_id = self.player_id, "settings already in sync");
            return;
        }
        info!(player_id = self.player_id, settings = %settings, "settings received");
        self.settings = settings.clone();
        self.matcher.set_confidence_threshold(settings.confidence_threshold);
        self.dispatcher.set_kind(settings.punishment);
        // Forced-category changes take effect on the next round.
        self.refresh_forced_if_idle();
    }

    fn apply_assignment(&mut self, assignment: &RoundAssignment, collab: &mut Collaborators<'_>) -> Result<(), SyncError> {
        if assignment.player_id != self.player_id {
            return Ok(());
        }
        if assignment.schema_version != SCHEMA_VERSION_V1 {
            error!(player_id = self.player_id, found = %assignment.schema_version, "round assignment schema mismatch");
            return Err(SyncError::SchemaMismatch {
                found: assignment.schema_version.clone(),
            });
        }

        let current = self.session.snapshot();
        if current.round_in_progress() {
            if current.round_id() == assignment.round_id {
                debug!(player_id = self.player_id, round_id = assignment.round_id, "assignment already applied");
                return Ok(());
            }
            warn!(
                player_id = self.player_id,
                stale_round = current.round_id(),
                "new assignment while a round is active, ending the old round"
            );
            self.apply_round_end(current.round_id(), collab);
        }

        let round_id = assignment.round_id;
        let shared: BTreeSet<CategoryName> = assignment.shared_category_names.iter().cloned().collect();
        let private: BTreeSet<CategoryName> = assignment.private_category_names.iter().cloned().collect();
        let forced = effective_forced(&self.configured_forced, &self.settings, &self.catalogue);
        let catalogue = &self.catalogue;
        let applied = self.session.update(|state| {
            state.set_forced(catalogue, forced);
            state.begin_round_with_id(catalogue, round_id, shared, private)
        });
        if let Err(StateError::UnknownCategory { name }) = applied {
            error!(
                player_id = self.player_id,
                round_id,
                category = %name,
                "assigned category missing from local catalogue, sitting this round out"
            );
            self.events.push(ParticipantEvent::SyncMismatch {
                round_id,
                category: name.clone(),
            });
            // Resync so the next round finds every category.
            self.requests.push(AuthorityRequest::RequestCatalogue {
                player_id: self.player_id,
            });
            return Err(SyncError::UnknownCategory { round_id, name });
        }

        let state = self.session.snapshot();
        let words: Vec<String> = state.active_words().iter().cloned().collect();
        collab.recognizer.load_grammar(&words);
        collab.recognizer.start();
        self.events.push(ParticipantEvent::RoundStarted {
            round_id,
            shared: state.shared_categories().iter().cloned().collect(),
            private: state.private_categories().iter().cloned().collect(),
        });
        if let Some(body) = category_hint(&self.settings, state.shared_categories(), state.private_categories()) {
            self.hint(collab, HINT_TITLE, &body);
        }
        Ok(())
    }

    fn apply_round_end(&mut self, round_id: u64, collab: &mut Collaborators<'_>) {
        let current = self.session.snapshot();
        if !current.round_in_progress() {
            debug!(player_id = self.player_id, round_id, "round end while idle");
            return;
        }
        if current.round_id() != round_id {
            warn!(player_id = self.player_id, local = current.round_id(), round_id, "round end for a different round");
        }
        // Punishments are round-scoped; nothing from this round fires in the next.
        self.dispatcher.cancel_player(self.player_id);
        let forced = effective_forced(&self.configured_forced, &self.settings, &self.catalogue);
        let catalogue = &self.catalogue;
        self.session.modify(|state| {
            state.end_round(catalogue);
            state.set_forced(catalogue, forced);
        });
        collab.recognizer.stop();
        collab.recognizer.unload_grammar();
        self.events.push(ParticipantEvent::RoundEnded {
            round_id: current.round_id(),
        });
    }

    fn refresh_forced_if_idle(&mut self) {
        if self.session.read(SessionVocabularyState::round_in_progress) {
            return;
        }
        let forced = effective_forced(&self.configured_forced, &self.settings, &self.catalogue);
        let catalogue = &self.catalogue;
        self.session.modify(|state| state.set_forced(catalogue, forced));
    }

    fn run_command(&mut self, args: &str, collab: &mut Collaborators<'_>) {
        let request = match args {
            "cw" | "cursewords" => AuthorityRequest::ToggleProfanity {
                player_id: self.player_id,
            },
            "sc" | "sharedcategories" => AuthorityRequest::ToggleHideShared {
                player_id: self.player_id,
            },
            "pc" | "privatecategories" => AuthorityRequest::ToggleHidePrivate {
                player_id: self.player_id,
            },
            "debug" => {
                let state = self.session.snapshot();
                info!(
                    player_id = self.player_id,
                    host = self.is_host,
                    round_id = state.round_id(),
                    phase = ?state.phase(),
                    shared = ?state.shared_categories(),
                    private = ?state.private_categories(),
                    forced = ?state.forced_categories(),
                    settings = %self.settings,
                    "participant debug dump"
                );
                return;
            }
            other => {
                debug!(player_id = self.player_id, command = other, "unknown chat command");
                self.hint(collab, "Unknown command", "Try /lv cw, /lv sc, /lv pc or /lv debug");
                return;
            }
        };
        if !self.is_host {
            self.hint(collab, "Only the host can toggle this setting!", "");
            return;
        }
        self.requests.push(request);
    }

    fn hint(&mut self, collab: &mut Collaborators<'_>, title: &str, body: &str) {
        show_hint(collab.hud, title, body);
        self.events.push(ParticipantEvent::HintDisplayed {
            title: title.to_string(),
            body: body.to_string(),
        });
    }

    fn collect_punishment_events(&mut self) {
        self.events
            .extend(self.dispatcher.drain_events().into_iter().map(ParticipantEvent::Punishment));
    }
}

/// Arguments of a `/lv` command, lower-cased, or `None` for ordinary chat.
fn command_args(text: &str) -> Option<String> {
    let normalized = normalize(text);
    let rest = normalized.strip_prefix(COMMAND_PREFIX)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim().to_string())
}
