//! Per-session vocabulary state and its shared handle.
//!
//! `active_words` is derived: it is rebuilt from the shared, private and
//! forced category sets on every transition and never patched in place.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, warn};

use crate::catalogue::{CategoryName, VocabularyCatalogue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Idle,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("category \"{name}\" is not present in the local catalogue")]
    UnknownCategory { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionVocabularyState {
    phase: RoundPhase,
    round_id: u64,
    shared: BTreeSet<CategoryName>,
    private: BTreeSet<CategoryName>,
    forced: BTreeSet<CategoryName>,
    active_words: BTreeSet<String>,
}

impl Default for SessionVocabularyState {
    fn default() -> Self {
        Self {
            phase: RoundPhase::Idle,
            round_id: 0,
            shared: BTreeSet::new(),
            private: BTreeSet::new(),
            forced: BTreeSet::new(),
            active_words: BTreeSet::new(),
        }
    }
}

impl SessionVocabularyState {
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn round_in_progress(&self) -> bool {
        self.phase == RoundPhase::Active
    }

    pub fn round_id(&self) -> u64 {
        self.round_id
    }

    pub fn shared_categories(&self) -> &BTreeSet<CategoryName> {
        &self.shared
    }

    pub fn private_categories(&self) -> &BTreeSet<CategoryName> {
        &self.private
    }

    pub fn forced_categories(&self) -> &BTreeSet<CategoryName> {
        &self.forced
    }

    pub fn active_words(&self) -> &BTreeSet<String> {
        &self.active_words
    }

    /// Idle -> Active. Every name must resolve in `catalogue`; on failure the
    /// state is left untouched.
    pub fn begin_round(
        &mut self,
        catalogue: &VocabularyCatalogue,
        shared: BTreeSet<CategoryName>,
        private: BTreeSet<CategoryName>,
    ) -> Result<(), StateError> {
        if let Some(name) = shared.iter().chain(private.iter()).find(|name| !catalogue.contains(name)) {
            return Err(StateError::UnknownCategory { name: name.clone() });
        }

        self.phase = RoundPhase::Active;
        self.round_id = self.round_id.wrapping_add(1);
        self.shared = shared;
        // A category already shared is never also private.
        self.private = private.difference(&self.shared).cloned().collect();
        self.recompute_active_words(catalogue);
        info!(
            round_id = self.round_id,
            shared = ?self.shared,
            private = ?self.private,
            forced = ?self.forced,
            words = self.active_words.len(),
            "round vocabulary active"
        );
        Ok(())
    }

    /// Same as `begin_round` but pins the round id to the host's.
    pub fn begin_round_with_id(
        &mut self,
        catalogue: &VocabularyCatalogue,
        round_id: u64,
        shared: BTreeSet<CategoryName>,
        private: BTreeSet<CategoryName>,
    ) -> Result<(), StateError> {
        self.begin_round(catalogue, shared, private)?;
        self.round_id = round_id;
        Ok(())
    }

    /// Active -> Idle. Forced categories survive, so `active_words` keeps
    /// their words. Calling it twice is the same as calling it once.
    pub fn end_round(&mut self, catalogue: &VocabularyCatalogue) {
        let was_active = self.round_in_progress();
        self.phase = RoundPhase::Idle;
        self.shared.clear();
        self.private.clear();
        self.recompute_active_words(catalogue);
        if was_active {
            info!(round_id = self.round_id, "round vocabulary cleared");
        }
    }

    /// Replaces the forced set. Unknown names are dropped with a warning.
    pub fn set_forced(&mut self, catalogue: &VocabularyCatalogue, forced: BTreeSet<CategoryName>) {
        self.forced = forced
            .into_iter()
            .filter(|name| {
                let known = catalogue.contains(name);
                if !known {
                    warn!(category = %name, "forced category missing from catalogue, ignoring");
                }
                known
            })
            .collect();
        self.recompute_active_words(catalogue);
    }

    fn recompute_active_words(&mut self, catalogue: &VocabularyCatalogue) {
        self.active_words = self
            .shared
            .iter()
            .chain(self.private.iter())
            .chain(self.forced.iter())
            .filter_map(|name| catalogue.words_of(name))
            .flat_map(|words| words.iter().cloned())
            .collect();
    }
}

/// Shared handle used by the input thread and the speech callback thread.
/// Writers build the next state off to the side and swap it in whole.
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    inner: Arc<RwLock<SessionVocabularyState>>,
}

impl SharedSession {
    pub fn new(state: SessionVocabularyState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub fn snapshot(&self) -> SessionVocabularyState {
        self.inner.read().clone()
    }

    pub fn read<T>(&self, f: impl FnOnce(&SessionVocabularyState) -> T) -> T {
        f(&self.inner.read())
    }

    pub fn modify(&self, f: impl FnOnce(&mut SessionVocabularyState)) {
        let mut next = self.inner.read().clone();
        f(&mut next);
        *self.inner.write() = next;
    }

    /// Applies `f` to a copy of the state and swaps it in only if `f`
    /// succeeds.
    pub fn update<T, E>(
        &self,
        f: impl FnOnce(&mut SessionVocabularyState) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut next = self.inner.read().clone();
        let value = f(&mut next)?;
        *self.inner.write() = next;
        Ok(value)
    }
}
