// crates/config/src/validator.rs

use castmate_core::{CastmateError, CastmateResult};
use tracing::warn;

use crate::CastmateConfig;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &CastmateConfig) -> CastmateResult<()> {
        if config.whisper.model.trim().is_empty() {
            return Err(CastmateError::Config("Whisper model must be set".to_string()));
        }
        if !config.whisper.model_path().exists() {
            warn!(
                "Whisper model file not found yet: {}",
                config.whisper.model_path().display()
            );
        }

        if config.assistant.summarization_interval_s == 0 {
            return Err(CastmateError::Config(
                "Summarization interval must be > 0 seconds".to_string(),
            ));
        }

        if config.cohost.input_timeout_s == 0 || config.cohost.input_timeout_s > 30 {
            return Err(CastmateError::Config(
                "Input timeout must be between 1 and 30 seconds".to_string(),
            ));
        }
        if config.cohost.answer_context_chars == 0 {
            return Err(CastmateError::Config(
                "Answer context size must be > 0 characters".to_string(),
            ));
        }

        for model in [
            &config.openai.summary_model,
            &config.openai.topics_model,
            &config.openai.answer_model,
            &config.openai.notes_model,
            &config.openai.tts_model,
        ] {
            if model.trim().is_empty() {
                return Err(CastmateError::Config("Model ids must not be empty".to_string()));
            }
        }
        if !(0.25..=4.0).contains(&config.openai.tts_speed) {
            return Err(CastmateError::Config(
                "TTS speed must be between 0.25 and 4.0".to_string(),
            ));
        }
        if config.openai.timeout_s == 0 {
            return Err(CastmateError::Config(
                "Request timeout must be > 0 seconds".to_string(),
            ));
        }

        if config.player.command.is_empty() {
            return Err(CastmateError::Config(
                "Player command must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ConfigValidator::validate(&CastmateConfig::default()).expect("defaults validate");
    }

    #[test]
    fn zero_summarization_interval_is_rejected() {
        let mut config = CastmateConfig::default();
        config.assistant.summarization_interval_s = 0;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn out_of_range_input_timeout_is_rejected() {
        let mut config = CastmateConfig::default();
        config.cohost.input_timeout_s = 45;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn empty_player_command_is_rejected() {
        let mut config = CastmateConfig::default();
        config.player.command.clear();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn absurd_tts_speed_is_rejected() {
        let mut config = CastmateConfig::default();
        config.openai.tts_speed = 9.0;
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
