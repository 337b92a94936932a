// crates/config/src/loader.rs

use std::path::Path;

use castmate_core::{CastmateError, CastmateResult};
use tracing::debug;

use crate::CastmateConfig;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load_from_file(path: &Path) -> CastmateResult<CastmateConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CastmateError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;

        let config: CastmateConfig = toml::from_str(&content).map_err(|e| {
            CastmateError::Config(format!("Failed to parse config {}: {e}", path.display()))
        })?;

        Ok(config)
    }

    /// Loads `path` when given, otherwise starts from defaults. Environment
    /// overrides are applied in both cases.
    pub fn load_or_default(path: Option<&Path>) -> CastmateResult<CastmateConfig> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => {
                debug!("No config file given, using defaults");
                CastmateConfig::default()
            }
        };
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    fn apply_env_overrides(config: &mut CastmateConfig) {
        if let Ok(model) = std::env::var("CASTMATE_WHISPER_MODEL") {
            config.whisper.model = model;
        }
        if let Ok(name) = std::env::var("CASTMATE_SESSION") {
            config.app.session_name = Some(name);
        }
        if let Ok(base_url) = std::env::var("CASTMATE_OPENAI_BASE_URL") {
            config.openai.base_url = Some(base_url);
        }
    }
}
