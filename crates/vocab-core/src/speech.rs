//! Hand-off point between a speech recognizer thread and the participant.
//!
//! The recognizer holds a clone of the subscription and calls
//! `on_recognized` from whatever thread it runs on. Results wait in the
//! inbox until the participant drains them in `pump`.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedSpeech {
    pub text: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SpeechSubscription {
    inbox: Arc<Mutex<VecDeque<RecognizedSpeech>>>,
}

impl SpeechSubscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_recognized(&self, text: impl Into<String>, confidence: f64) {
        self.inbox.lock().push_back(RecognizedSpeech {
            text: text.into(),
            confidence,
        });
    }

    /// Takes everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<RecognizedSpeech> {
        self.inbox.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inbox.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inbox.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn callbacks_from_other_threads_arrive_in_order() {
        let subscription = SpeechSubscription::new();
        let recognizer = subscription.clone();
        thread::spawn(move || {
            for i in 0..5 {
                recognizer.on_recognized(format!("utterance {i}"), 0.95);
            }
        })
        .join()
        .expect("recognizer thread");

        let received = subscription.drain();
        assert_eq!(received.len(), 5);
        assert_eq!(received[0].text, "utterance 0");
        assert_eq!(received[4].text, "utterance 4");
        assert!(subscription.is_empty());
    }
}
