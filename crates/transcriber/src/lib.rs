// crates/transcriber/src/lib.rs

use castmate_core::{CastmateError, CastmateResult};
use regex::Regex;

/// Parses raw recognizer lines and accumulates the running transcript.
///
/// Recognizer lines look like `[00:00:00.000 --> 00:00:02.000]  text`,
/// occasionally carrying noise markers such as `[BLANK_AUDIO]` or
/// wrapping quote artifacts.
pub struct Transcriber {
    full_transcript: String,
    line_pattern: Regex,
}

impl Default for Transcriber {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcriber {
    pub fn new() -> Self {
        Self {
            full_transcript: String::new(),
            line_pattern: Regex::new(r"\[.*?(\d{2}:\d{2}:\d{2}\.\d{3}).*?\]\s{1,3}(.+)")
                .expect("recognizer line pattern is valid"),
        }
    }

    /// Cleans one raw recognizer line and appends the result to the
    /// running transcript.
    ///
    /// Returns the cleaned text, which may be empty; empty results mean
    /// "no utterance" and must not be published or persisted by callers.
    pub fn process(&mut self, raw_line: &str) -> String {
        let text = self.parse_line(raw_line);
        if !text.is_empty() {
            self.full_transcript.push_str(&text);
        }
        text
    }

    pub fn full_transcript(&self) -> &str {
        &self.full_transcript
    }

    /// Returns the last `limit` characters of the transcript, fewer if
    /// the transcript is shorter. A negative `limit` is an error, never
    /// silently clamped.
    pub fn latest(&self, limit: i64) -> CastmateResult<String> {
        if limit < 0 {
            return Err(CastmateError::InvalidArgument(format!(
                "latest: negative limit {limit}"
            )));
        }

        let limit = limit as usize;
        let total = self.full_transcript.chars().count();
        let skip = total.saturating_sub(limit);
        Ok(self.full_transcript.chars().skip(skip).collect())
    }

    fn parse_line(&self, line: &str) -> String {
        let Some(captures) = self.line_pattern.captures(line) else {
            return String::new();
        };
        let raw = captures.get(2).map(|m| m.as_str()).unwrap_or_default();

        let mut text = raw.replace("[BLANK_AUDIO]", "");
        if let Some(stripped) = text.strip_prefix("[\" ").or_else(|| text.strip_prefix("[\"")) {
            text = stripped.to_string();
        }
        if let Some(stripped) = text.strip_suffix("\"]") {
            text = stripped.to_string();
        }

        let mut text = text.trim().to_string();
        if text
            .chars()
            .last()
            .is_some_and(|c| !c.is_alphanumeric() && c != '_' && !c.is_whitespace())
        {
            text.push(' ');
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_extracts_text_from_a_timestamped_line() {
        let mut transcriber = Transcriber::new();
        let text = transcriber.process("[00:00:00.000 --> 00:00:02.000]  Hello there.");
        assert_eq!(text, "Hello there. ");
        assert_eq!(transcriber.full_transcript(), "Hello there. ");
    }

    #[test]
    fn blank_audio_lines_produce_no_text() {
        let mut transcriber = Transcriber::new();
        let text = transcriber.process("[00:00:02.000 --> 00:00:04.000]  [BLANK_AUDIO]");
        assert_eq!(text, "");
        assert_eq!(transcriber.full_transcript(), "");
    }

    #[test]
    fn lines_without_timestamps_produce_no_text() {
        let mut transcriber = Transcriber::new();
        assert_eq!(transcriber.process("whisper_init: loading model"), "");
        assert_eq!(transcriber.process(""), "");
        assert_eq!(transcriber.full_transcript(), "");
    }

    #[test]
    fn wrapping_quote_artifacts_are_stripped() {
        let mut transcriber = Transcriber::new();
        let text = transcriber.process("[00:00:00.000 --> 00:00:02.000]  [\" Hello again.\"]");
        assert_eq!(text, "Hello again. ");
    }

    #[test]
    fn punctuation_endings_get_a_joining_space() {
        let mut transcriber = Transcriber::new();
        assert_eq!(
            transcriber.process("[00:00:00.000 --> 00:00:02.000]  How are you?"),
            "How are you? "
        );
        assert_eq!(
            transcriber.process("[00:00:02.000 --> 00:00:04.000]  and then we"),
            "and then we"
        );
    }

    #[test]
    fn transcript_accumulates_in_recognition_order() {
        let mut transcriber = Transcriber::new();
        transcriber.process("[00:00:00.000 --> 00:00:02.000]  Hello there.");
        transcriber.process("[00:00:02.000 --> 00:00:04.000]  [BLANK_AUDIO]");
        transcriber.process("[00:00:04.000 --> 00:00:06.000]  How are you?");
        assert_eq!(transcriber.full_transcript(), "Hello there. How are you? ");
    }

    #[test]
    fn latest_returns_a_bounded_suffix() {
        let mut transcriber = Transcriber::new();
        transcriber.process("[00:00:00.000 --> 00:00:02.000]  Hello there.");

        assert_eq!(transcriber.latest(6).expect("suffix"), "here. ");
    }

    #[test]
    fn latest_is_idempotent_without_new_input() {
        let mut transcriber = Transcriber::new();
        transcriber.process("[00:00:00.000 --> 00:00:02.000]  Hello there.");

        let first = transcriber.latest(5).expect("suffix");
        let second = transcriber.latest(5).expect("suffix");
        assert_eq!(first, second);
        assert!(first.chars().count() <= 5);
    }

    #[test]
    fn latest_returns_everything_when_shorter_than_limit() {
        let mut transcriber = Transcriber::new();
        transcriber.process("[00:00:00.000 --> 00:00:02.000]  Hi.");
        assert_eq!(transcriber.latest(1000).expect("suffix"), "Hi. ");
    }

    #[test]
    fn latest_rejects_negative_limits() {
        let transcriber = Transcriber::new();
        let err = transcriber.latest(-1).unwrap_err();
        assert!(matches!(err, CastmateError::InvalidArgument(_)));
    }
}
