// crates/core/src/result.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CastmateError {
    #[error("Recognizer error: {0}")]
    Recognizer(String),

    #[error("Transcript error: {0}")]
    Transcript(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Speech error: {0}")]
    Speech(String),

    #[error("Action error: {0}")]
    Action(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type CastmateResult<T> = Result<T, CastmateError>;
