//! Vocabulary catalogue: named categories of banned words.
//!
//! A category is created once when the session loads its configuration and
//! is immutable afterwards. Validation never aborts loading of the whole
//! catalogue; a bad word is dropped and a bad category is rejected on its own.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{CatalogueEntry, ModConfig, PROFANITY_CATEGORY};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const CATEGORY_NAME_MAX_LENGTH: usize = 64;
pub const CATEGORY_WORDS_MAX_LENGTH: usize = 512;
pub const WORD_MAX_LENGTH: usize = 128;

pub type CategoryName = String;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryError {
    #[error("category with words \"{words}\" has no name")]
    EmptyName { words: String },
    #[error("category name \"{name}\" exceeds maximum length ({CATEGORY_NAME_MAX_LENGTH})")]
    NameTooLong { name: String },
    #[error("a category with the name \"{name}\" has already been loaded")]
    DuplicateCategory { name: String },
    #[error("words for category \"{name}\" exceed maximum length ({CATEGORY_WORDS_MAX_LENGTH}) and will not be loaded")]
    WordsTooLong { name: String, length: usize },
    #[error("no words found for category \"{name}\" and it will not be loaded")]
    NoValidWords { name: String },
}

/// A built-in creature category: display name, the spawnable entity
/// identifiers that make it eligible, and its default word list.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinCategory {
    pub name: &'static str,
    pub entity_ids: &'static [&'static str],
    pub default_words: &'static str,
}

pub const BUILTIN_CATEGORIES: [BuiltinCategory; 16] = [
    BuiltinCategory {
        name: "Baboon Hawk",
        entity_ids: &["Baboon hawk"],
        default_words: "baboon hawk,baboon,hawk",
    },
    BuiltinCategory {
        name: "Bracken",
        entity_ids: &["Flowerman"],
        default_words: "bracken,flowerman",
    },
    BuiltinCategory {
        name: "Bunker Spider",
        entity_ids: &["Bunker Spider"],
        default_words: "bunker spider,bunker,spider,web",
    },
    BuiltinCategory {
        name: "Coil Head",
        entity_ids: &["Spring"],
        default_words: "coil head,coil,head",
    },
    BuiltinCategory {
        name: "Earth Leviathan",
        entity_ids: &["Earth Leviathan"],
        default_words: "earth leviathan,earth,leviathan,worm",
    },
    BuiltinCategory {
        name: "Eyeless Dog",
        entity_ids: &["MouthDog"],
        default_words: "eyeless dog,eyeless,dog",
    },
    BuiltinCategory {
        name: "Forest Keeper",
        entity_ids: &["ForestGiant"],
        default_words: "forest keeper,forest giant,keeper,giant",
    },
    BuiltinCategory {
        name: "Ghost Girl",
        entity_ids: &["Girl"],
        default_words: "ghost girl,ghost,girl,haunt,haunted",
    },
    BuiltinCategory {
        name: "Hoarding Bug",
        entity_ids: &["Hoarding bug"],
        default_words: "hoarding bug,loot bug,hoard,loot,bug",
    },
    BuiltinCategory {
        name: "Hygrodere",
        entity_ids: &["Blob"],
        default_words: "hygrodere,slime,blob",
    },
    BuiltinCategory {
        name: "Jester",
        entity_ids: &["Jester"],
        default_words: "jester,winding",
    },
    BuiltinCategory {
        name: "Masked",
        entity_ids: &["Masked"],
        default_words: "mimic,masked",
    },
    BuiltinCategory {
        name: "Nutcracker",
        entity_ids: &["Nutcracker"],
        default_words: "nutcracker,soldier,shotgun,gun,nut",
    },
    BuiltinCategory {
        name: "Snare Flea",
        entity_ids: &["Centipede"],
        default_words: "snare flea,snare,flea,centipede,face hugger",
    },
    BuiltinCategory {
        name: "Spore Lizard",
        entity_ids: &["Puffer"],
        default_words: "spore lizard,spore,lizard,puffer",
    },
    BuiltinCategory {
        name: "Thumper",
        entity_ids: &["Crawler"],
        default_words: "thumper,crawler",
    },
];

pub const DEFAULT_PROFANITY_WORDS: &str =
    "fuck,shit,damn,bitch,ass,crap,bastard,dick,piss,hell,bloody,bollocks";

/// Number of category slots; below this, oversized or empty word lists are
/// tolerated with a warning instead of rejected.
pub const DEFAULT_MAX_CATEGORY_SLOTS: usize = BUILTIN_CATEGORIES.len();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    name: CategoryName,
    words: BTreeSet<String>,
}

impl Category {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn words(&self) -> &BTreeSet<String> {
        &self.words
    }

    /// Comma-joined form used for replication.
    pub fn words_csv(&self) -> String {
        join_words(&self.words)
    }
}

#[derive(Debug, Clone)]
pub struct VocabularyCatalogue {
    categories: BTreeMap<CategoryName, Category>,
    /// Insertion order, which is also the order categories replicate in.
    order: Vec<CategoryName>,
    max_slots: usize,
}

impl Default for VocabularyCatalogue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CATEGORY_SLOTS)
    }
}

impl VocabularyCatalogue {
    pub fn new(max_slots: usize) -> Self {
        Self {
            categories: BTreeMap::new(),
            order: Vec::new(),
            max_slots,
        }
    }

    /// Builds the catalogue a host loads at session start: the built-in
    /// creature categories (with configured overrides), the profanity
    /// category, then any custom categories. Failures are logged and skipped.
    pub fn from_config(config: &ModConfig) -> Self {
        let mut catalogue = Self::default();
        for builtin in BUILTIN_CATEGORIES.iter() {
            let words = config
                .categories
                .get(builtin.name)
                .map(String::as_str)
                .unwrap_or(builtin.default_words);
            let _ = catalogue.add_category(builtin.name, words);
        }

        let profanity_words = config
            .categories
            .get(PROFANITY_CATEGORY)
            .map(String::as_str)
            .unwrap_or(DEFAULT_PROFANITY_WORDS);
        let _ = catalogue.add_category(PROFANITY_CATEGORY, profanity_words);

        for (name, words) in &config.custom_categories {
            let _ = catalogue.add_category(name, words);
        }

        info!(
            categories = catalogue.len(),
            "vocabulary catalogue loaded from config"
        );
        catalogue
    }

    /// Rebuilds a participant-side catalogue from the host's replicated
    /// entries. Entries go through the same validation as local loading.
    pub fn from_entries(entries: &[CatalogueEntry]) -> Self {
        let mut catalogue = Self::new(DEFAULT_MAX_CATEGORY_SLOTS.max(entries.len()));
        for entry in entries {
            let _ = catalogue.add_category(&entry.category_name, &entry.words);
        }
        catalogue
    }

    pub fn add_category(&mut self, name: &str, raw_words: &str) -> Result<(), CategoryError> {
        let result = self.try_add_category(name, raw_words);
        if let Err(err) = &result {
            error!(%err, "category rejected");
        }
        result
    }

    fn try_add_category(&mut self, name: &str, raw_words: &str) -> Result<(), CategoryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CategoryError::EmptyName {
                words: raw_words.to_string(),
            });
        }
        if name.chars().count() > CATEGORY_NAME_MAX_LENGTH {
            return Err(CategoryError::NameTooLong {
                name: name.to_string(),
            });
        }
        if self.categories.contains_key(name) {
            return Err(CategoryError::DuplicateCategory {
                name: name.to_string(),
            });
        }

        let has_free_slot = self.categories.len() < self.max_slots;
        let mut words = parse_word_list(raw_words);
        let joined = join_words(&words);
        let joined_length = joined.chars().count();

        if joined_length > CATEGORY_WORDS_MAX_LENGTH {
            if !has_free_slot {
                return Err(CategoryError::WordsTooLong {
                    name: name.to_string(),
                    length: joined_length,
                });
            }
            warn!(
                category = name,
                length = joined_length,
                max = CATEGORY_WORDS_MAX_LENGTH,
                "category words exceed maximum length, truncating"
            );
            let truncated: String = joined.chars().take(CATEGORY_WORDS_MAX_LENGTH).collect();
            words = parse_word_list(&truncated);
        } else if words.is_empty() {
            if !has_free_slot {
                return Err(CategoryError::NoValidWords {
                    name: name.to_string(),
                });
            }
            warn!(category = name, "no words found for category");
        }

        info!(
            category = name,
            words = %join_words(&words),
            index = self.order.len(),
            "loaded category"
        );
        self.order.push(name.to_string());
        self.categories.insert(
            name.to_string(),
            Category {
                name: name.to_string(),
                words,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }

    pub fn words_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.categories.get(name).map(Category::words)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Replication form, sent once to each joining participant.
    pub fn entries(&self) -> Vec<CatalogueEntry> {
        self.order
            .iter()
            .filter_map(|name| self.categories.get(name))
            .map(|category| CatalogueEntry {
                category_name: category.name.clone(),
                words: category.words_csv(),
            })
            .collect()
    }
}

/// Splits a comma separated list into normalized words: lower-cased,
/// trimmed, deduplicated. Empty and over-long tokens are dropped.
pub fn parse_word_list(raw: &str) -> BTreeSet<String> {
    let mut words = BTreeSet::new();
    for token in raw.split(',') {
        let word = token.trim().to_lowercase();
        if word.is_empty() {
            continue;
        }
        if word.chars().count() > WORD_MAX_LENGTH {
            warn!(
                word = %word,
                max = WORD_MAX_LENGTH,
                "word exceeds maximum length and will not be loaded"
            );
            continue;
        }
        if !words.insert(word) {
            debug!(token = token.trim(), "duplicate word collapsed");
        }
    }
    words
}

pub fn join_words(words: &BTreeSet<String>) -> String {
    words.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}
