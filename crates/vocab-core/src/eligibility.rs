//! Which categories may be drawn this round.
//!
//! Eligibility comes from the creatures that can spawn at the current
//! location. The company building never gets banned categories.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::catalogue::{CategoryName, VocabularyCatalogue, BUILTIN_CATEGORIES};
use crate::session::SessionVocabularyState;

/// Location where category selection is disabled outright.
pub const RESERVED_LOCATION: &str = "71 Gordion";

/// Spawnable entities that never map to a category.
pub const IGNORED_ENTITIES: [&str; 4] = ["Red Locust Bees", "Manticoil", "Docile Locust Bees", "Lasso"];

fn entity_lookup() -> &'static BTreeMap<&'static str, &'static str> {
    static LOOKUP: OnceLock<BTreeMap<&'static str, &'static str>> = OnceLock::new();
    LOOKUP.get_or_init(|| {
        let mut lookup = BTreeMap::new();
        for builtin in BUILTIN_CATEGORIES.iter() {
            for entity_id in builtin.entity_ids {
                lookup.insert(*entity_id, builtin.name);
            }
        }
        lookup
    })
}

/// Category governed by a spawnable entity identifier, if any.
pub fn category_for_entity(entity_id: &str) -> Option<&'static str> {
    if IGNORED_ENTITIES.contains(&entity_id) {
        return None;
    }
    entity_lookup().get(entity_id).copied()
}

/// What the resolver needs to know about the session's current location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub location_id: String,
    pub spawnable_entities: BTreeSet<String>,
}

impl SessionContext {
    pub fn new<I, S>(location_id: impl Into<String>, spawnable_entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            location_id: location_id.into(),
            spawnable_entities: spawnable_entities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_reserved(&self) -> bool {
        self.location_id == RESERVED_LOCATION
    }
}

/// Categories that may legally be chosen for this session context.
///
/// With `exclude_active`, categories already shared or private in `state`
/// are removed. Forced categories are never excluded here since they are
/// not part of the draw.
pub fn eligible_categories(
    catalogue: &VocabularyCatalogue,
    context: &SessionContext,
    state: &SessionVocabularyState,
    exclude_active: bool,
) -> BTreeSet<CategoryName> {
    if context.is_reserved() {
        return BTreeSet::new();
    }

    let mut eligible: BTreeSet<CategoryName> = context
        .spawnable_entities
        .iter()
        .filter_map(|entity| category_for_entity(entity))
        .filter(|name| catalogue.contains(name))
        .map(str::to_string)
        .collect();

    if exclude_active {
        eligible.retain(|name| {
            !state.shared_categories().contains(name) && !state.private_categories().contains(name)
        });
    }

    eligible
}
