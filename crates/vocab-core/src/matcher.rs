//! Text and speech matching against the active vocabulary.
//!
//! Matching is plain substring containment on normalized text, so a short
//! word also matches inside a longer one ("ass" in "class").

use crate::session::SessionVocabularyState;

/// Confidence used for typed input (chat, terminal).
pub const TYPED_INPUT_CONFIDENCE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegalReason {
    RoundInactive,
    SpeakerEliminated,
    BelowThreshold,
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Legal(LegalReason),
    Violation { word: String },
}

impl Verdict {
    pub fn is_legal(&self) -> bool {
        matches!(self, Verdict::Legal(_))
    }
}

pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matcher {
    confidence_threshold: f64,
}

impl Matcher {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn set_confidence_threshold(&mut self, threshold: f64) {
        self.confidence_threshold = threshold;
    }

    pub fn evaluate(
        &self,
        state: &SessionVocabularyState,
        text: &str,
        confidence: f64,
        speaker_alive: bool,
    ) -> Verdict {
        if !state.round_in_progress() {
            return Verdict::Legal(LegalReason::RoundInactive);
        }
        if !speaker_alive {
            return Verdict::Legal(LegalReason::SpeakerEliminated);
        }
        // NaN compares false against everything, so test it explicitly.
        if !confidence.is_finite() || confidence < self.confidence_threshold {
            return Verdict::Legal(LegalReason::BelowThreshold);
        }

        let normalized = normalize(text);
        state
            .active_words()
            .iter()
            .find(|word| normalized.contains(word.as_str()))
            .map(|word| Verdict::Violation { word: word.clone() })
            .unwrap_or(Verdict::Legal(LegalReason::NoMatch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::VocabularyCatalogue;
    use std::collections::BTreeSet;

    fn active_state() -> SessionVocabularyState {
        let mut catalogue = VocabularyCatalogue::default();
        catalogue.add_category("Bracken", "bracken,flowerman").expect("bracken");
        catalogue.add_category("Profanity", "ass").expect("profanity");
        let mut state = SessionVocabularyState::default();
        state.set_forced(&catalogue, ["Profanity".to_string()].into_iter().collect());
        state
            .begin_round(&catalogue, ["Bracken".to_string()].into_iter().collect(), BTreeSet::new())
            .expect("begin");
        state
    }

    #[test]
    fn detects_word_regardless_of_case_and_padding() {
        let matcher = Matcher::new(0.9);
        let verdict = matcher.evaluate(&active_state(), "  I saw a Flowerman!", TYPED_INPUT_CONFIDENCE, true);
        assert_eq!(verdict, Verdict::Violation { word: "flowerman".to_string() });
    }

    #[test]
    fn clean_text_is_legal() {
        let matcher = Matcher::new(0.9);
        let verdict = matcher.evaluate(&active_state(), "nothing to report", TYPED_INPUT_CONFIDENCE, true);
        assert_eq!(verdict, Verdict::Legal(LegalReason::NoMatch));
    }

    #[test]
    fn substring_inside_longer_word_still_matches() {
        let matcher = Matcher::new(0.9);
        let verdict = matcher.evaluate(&active_state(), "first class loot", TYPED_INPUT_CONFIDENCE, true);
        assert_eq!(verdict, Verdict::Violation { word: "ass".to_string() });
    }

    #[test]
    fn low_confidence_is_always_legal() {
        let matcher = Matcher::new(0.9);
        let verdict = matcher.evaluate(&active_state(), "bracken bracken", 0.89, true);
        assert_eq!(verdict, Verdict::Legal(LegalReason::BelowThreshold));
    }

    #[test]
    fn non_finite_confidence_is_below_threshold() {
        let matcher = Matcher::new(0.9);
        for confidence in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(
                matcher.evaluate(&active_state(), "bracken", confidence, true),
                Verdict::Legal(LegalReason::BelowThreshold)
            );
        }
    }

    #[test]
    fn confidence_at_threshold_is_checked() {
        let matcher = Matcher::new(0.9);
        assert!(!matcher.evaluate(&active_state(), "bracken", 0.9, true).is_legal());
    }

    #[test]
    fn dead_speaker_and_idle_round_are_legal() {
        let matcher = Matcher::new(0.9);
        assert_eq!(
            matcher.evaluate(&active_state(), "bracken", 1.0, false),
            Verdict::Legal(LegalReason::SpeakerEliminated)
        );
        assert_eq!(
            matcher.evaluate(&SessionVocabularyState::default(), "bracken", 1.0, true),
            Verdict::Legal(LegalReason::RoundInactive)
        );
    }
}
