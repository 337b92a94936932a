// crates/core/src/display.rs
use owo_colors::OwoColorize;

/// Closed set of operator-facing status styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLabel {
    Info,
    Wait,
    Input,
    Success,
}

/// Renders `text` with the terminal style mapped to `label`.
pub fn to_human(text: &str, label: StatusLabel) -> String {
    match label {
        StatusLabel::Info => text.blue().to_string(),
        StatusLabel::Wait => text.yellow().to_string(),
        StatusLabel::Input => text.black().on_yellow().to_string(),
        StatusLabel::Success => text.green().to_string(),
    }
}
