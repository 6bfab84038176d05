//! Range checks and partial updates for `SessionSettings`.

use contracts::{
    PlayerId, SessionSettings, SettingsUpdate, MAX_CATEGORIES_PER_ROUND, MAX_CONFIDENCE_THRESHOLD,
    MIN_CATEGORIES_PER_ROUND, MIN_CONFIDENCE_THRESHOLD,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },
    #[error("player {player_id} is not the host and cannot change settings")]
    NotAuthority { player_id: PlayerId },
    #[error("unknown category {name:?}")]
    UnknownCategory { name: String },
}

pub fn validate_category_count(field: &'static str, value: i64) -> Result<u8, SettingsError> {
    let min = i64::from(MIN_CATEGORIES_PER_ROUND);
    let max = i64::from(MAX_CATEGORIES_PER_ROUND);
    if !(min..=max).contains(&value) {
        return Err(SettingsError::OutOfRange {
            field,
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    u8::try_from(value).map_err(|_| SettingsError::OutOfRange {
        field,
        value: value.to_string(),
        min: min.to_string(),
        max: max.to_string(),
    })
}

pub fn validate_confidence_threshold(value: f64) -> Result<f64, SettingsError> {
    // NaN fails the range check too.
    if !(MIN_CONFIDENCE_THRESHOLD..=MAX_CONFIDENCE_THRESHOLD).contains(&value) {
        return Err(SettingsError::OutOfRange {
            field: "confidence_threshold",
            value: value.to_string(),
            min: MIN_CONFIDENCE_THRESHOLD.to_string(),
            max: MAX_CONFIDENCE_THRESHOLD.to_string(),
        });
    }
    Ok(value)
}

pub fn validate(settings: &SessionSettings) -> Result<(), SettingsError> {
    validate_category_count(
        "shared_categories_per_round",
        i64::from(settings.shared_categories_per_round),
    )?;
    validate_category_count(
        "private_categories_per_round",
        i64::from(settings.private_categories_per_round),
    )?;
    validate_confidence_threshold(settings.confidence_threshold)?;
    Ok(())
}

/// Applies `update` to a copy of `current`. Either every field is valid and
/// the new settings are returned, or nothing changes.
pub fn apply_update(current: &SessionSettings, update: &SettingsUpdate) -> Result<SessionSettings, SettingsError> {
    let mut next = current.clone();
    if let Some(kind) = update.punishment {
        next.punishment = kind;
    }
    if let Some(count) = update.shared_categories_per_round {
        next.shared_categories_per_round = validate_category_count("shared_categories_per_round", count)?;
    }
    if let Some(count) = update.private_categories_per_round {
        next.private_categories_per_round = validate_category_count("private_categories_per_round", count)?;
    }
    if let Some(flag) = update.display_category_hints {
        next.display_category_hints = flag;
    }
    if let Some(flag) = update.hide_shared_categories {
        next.hide_shared_categories = flag;
    }
    if let Some(flag) = update.hide_private_categories {
        next.hide_private_categories = flag;
    }
    if let Some(flag) = update.punish_profanity {
        next.punish_profanity = flag;
    }
    if let Some(threshold) = update.confidence_threshold {
        next.confidence_threshold = validate_confidence_threshold(threshold)?;
    }
    if let Some(flag) = update.log_recognition_output {
        next.log_recognition_output = flag;
    }
    Ok(next)
}
