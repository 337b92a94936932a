// crates/core/src/events.rs
use std::time::Instant;

/// One recognized, non-empty utterance plus its recognition start time.
///
/// Events are immutable once published and are handed to every
/// subscriber by value, in recognition order.
#[derive(Debug, Clone)]
pub struct TranscriptEvent {
    pub text: String,
    pub started_at: Instant,
}

impl TranscriptEvent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            started_at: Instant::now(),
        }
    }

    pub fn at(text: impl Into<String>, started_at: Instant) -> Self {
        Self {
            text: text.into(),
            started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_their_recognition_time() {
        let before = Instant::now();
        let event = TranscriptEvent::new("hello");
        assert!(event.started_at >= before);
        assert_eq!(event.text, "hello");
    }

    #[test]
    fn cloned_events_share_the_same_timestamp() {
        let event = TranscriptEvent::new("hello");
        let copy = event.clone();
        assert_eq!(copy.started_at, event.started_at);
    }
}
