// src/cli.rs
use std::path::PathBuf;

use castmate_config::CastmateConfig;
use clap::Parser;

/// Command-line options; everything else lives in the config file.
#[derive(Parser, Debug)]
#[command(name = "castmate", about = "Live AI podcast co-host", version)]
pub struct Cli {
    /// Run in debug mode
    #[arg(long)]
    pub debug: bool,

    /// Use a specific whisper model
    #[arg(short = 'w', long)]
    pub whisper_model: Option<String>,

    /// A name for the session to label all log files
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Path to a configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Path to the actions file
    #[arg(long)]
    pub actions_file: Option<PathBuf>,
}

impl Cli {
    /// Folds command-line overrides into the loaded configuration.
    pub fn apply(&self, config: &mut CastmateConfig) {
        if let Some(model) = &self.whisper_model {
            config.whisper.model = model.clone();
        }
        if let Some(name) = &self.name {
            config.app.session_name = Some(name.clone());
        }
        if let Some(actions_file) = &self.actions_file {
            config.app.actions_file = actions_file.clone();
        }
    }
}
