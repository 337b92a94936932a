// crates/config/src/lib.rs

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod loader;
pub mod validator;

pub use loader::ConfigLoader;
pub use validator::ConfigValidator;

/// Main configuration structure, constructed once at startup and passed
/// by reference into every component.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CastmateConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub whisper: WhisperConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub cohost: CoHostConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Session name used to label all log files. Defaults to a timestamp.
    #[serde(default)]
    pub session_name: Option<String>,
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_session_timeout_s")]
    pub session_timeout_s: u64,
    #[serde(default = "default_actions_file")]
    pub actions_file: PathBuf,
    /// Command used to pretty-print announced topics, given the topics
    /// file path as its final argument.
    #[serde(default = "default_announce_command")]
    pub announce_command: Vec<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_session_timeout_s() -> u64 {
    60 * 60 * 2
}

fn default_actions_file() -> PathBuf {
    PathBuf::from("Actions.toml")
}

fn default_announce_command() -> Vec<String> {
    vec!["bat".to_string(), "--language=markdown".to_string()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session_name: None,
            root: default_root(),
            session_timeout_s: default_session_timeout_s(),
            actions_file: default_actions_file(),
            announce_command: default_announce_command(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperConfig {
    #[serde(default = "default_whisper_model")]
    pub model: String,
    #[serde(default = "default_whisper_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_whisper_model_dir")]
    pub model_dir: PathBuf,
    #[serde(default = "default_whisper_threads")]
    pub threads: u32,
    #[serde(default)]
    pub step_ms: u32,
    #[serde(default = "default_whisper_length_ms")]
    pub length_ms: u32,
    #[serde(default = "default_whisper_keep_ms")]
    pub keep_ms: u32,
    #[serde(default = "default_whisper_vad_threshold")]
    pub vad_threshold: f32,
    #[serde(default = "default_whisper_language")]
    pub language: String,
}

fn default_whisper_model() -> String {
    "small.en-q5_1".to_string()
}

fn default_whisper_binary() -> PathBuf {
    PathBuf::from("./whisper.cpp/stream")
}

fn default_whisper_model_dir() -> PathBuf {
    PathBuf::from("./whisper.cpp/models")
}

fn default_whisper_threads() -> u32 {
    8
}

fn default_whisper_length_ms() -> u32 {
    5000
}

fn default_whisper_keep_ms() -> u32 {
    500
}

fn default_whisper_vad_threshold() -> f32 {
    0.75
}

fn default_whisper_language() -> String {
    "en".to_string()
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model: default_whisper_model(),
            binary: default_whisper_binary(),
            model_dir: default_whisper_model_dir(),
            threads: default_whisper_threads(),
            step_ms: 0,
            length_ms: default_whisper_length_ms(),
            keep_ms: default_whisper_keep_ms(),
            vad_threshold: default_whisper_vad_threshold(),
            language: default_whisper_language(),
        }
    }
}

impl WhisperConfig {
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(format!("ggml-{}.bin", self.model))
    }

    /// Full argv for the streaming recognizer subprocess.
    pub fn command(&self) -> (PathBuf, Vec<String>) {
        let args = vec![
            "-m".to_string(),
            self.model_path().to_string_lossy().into_owned(),
            "-t".to_string(),
            self.threads.to_string(),
            "--step".to_string(),
            self.step_ms.to_string(),
            "--length".to_string(),
            self.length_ms.to_string(),
            "--keep".to_string(),
            self.keep_ms.to_string(),
            "--vad-thold".to_string(),
            self.vad_threshold.to_string(),
            "--audio-ctx".to_string(),
            "0".to_string(),
            "--keep-context".to_string(),
            "-c".to_string(),
            "1".to_string(),
            "-l".to_string(),
            self.language.clone(),
        ];
        (self.binary.clone(), args)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_summary_model")]
    pub summary_model: String,
    #[serde(default = "default_topics_model")]
    pub topics_model: String,
    #[serde(default = "default_answer_model")]
    pub answer_model: String,
    #[serde(default = "default_notes_model")]
    pub notes_model: String,
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,
    #[serde(default = "default_topics_max_tokens")]
    pub topics_max_tokens: u32,
    #[serde(default = "default_answer_max_tokens")]
    pub answer_max_tokens: u32,
    #[serde(default = "default_notes_max_tokens")]
    pub notes_max_tokens: u32,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_tts_voice")]
    pub tts_voice: String,
    #[serde(default = "default_tts_speed")]
    pub tts_speed: f32,
    #[serde(default = "default_tts_format")]
    pub tts_format: String,
    #[serde(default = "default_request_timeout_s")]
    pub timeout_s: u64,
}

fn default_api_key_env() -> String {
    "OPENAI_ACCESS_TOKEN".to_string()
}

fn default_summary_model() -> String {
    "gpt-4o".to_string()
}

fn default_topics_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_answer_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_notes_model() -> String {
    "gpt-4o".to_string()
}

fn default_summary_max_tokens() -> u32 {
    250
}

fn default_topics_max_tokens() -> u32 {
    500
}

fn default_answer_max_tokens() -> u32 {
    150
}

fn default_notes_max_tokens() -> u32 {
    500
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_tts_voice() -> String {
    "onyx".to_string()
}

fn default_tts_speed() -> f32 {
    1.0
}

fn default_tts_format() -> String {
    "mp3".to_string()
}

fn default_request_timeout_s() -> u64 {
    30
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: None,
            summary_model: default_summary_model(),
            topics_model: default_topics_model(),
            answer_model: default_answer_model(),
            notes_model: default_notes_model(),
            summary_max_tokens: default_summary_max_tokens(),
            topics_max_tokens: default_topics_max_tokens(),
            answer_max_tokens: default_answer_max_tokens(),
            notes_max_tokens: default_notes_max_tokens(),
            tts_model: default_tts_model(),
            tts_voice: default_tts_voice(),
            tts_speed: default_tts_speed(),
            tts_format: default_tts_format(),
            timeout_s: default_request_timeout_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_topic_system_prompt")]
    pub topic_system: String,
    #[serde(default = "default_topic_user_prompt")]
    pub topic_user: String,
    #[serde(default = "default_discussion_system_prompt")]
    pub discussion_system: String,
    #[serde(default = "default_discussion_user_prompt")]
    pub discussion_user: String,
    #[serde(default = "default_notes_system_prompt")]
    pub notes_system: String,
    #[serde(default = "default_notes_user_prompt")]
    pub notes_user: String,
}

fn default_topic_system_prompt() -> String {
    "As a podcast assistant, your task is to diligently extract topics related to the \
discussion on the show and prepare this information in an optimal way for participants \
to learn more in the closing show notes.

To achieve this, follow these steps:

1. Listen to the podcast discussion and identify the main topics covered.
2. For each main topic, provide a brief summary of what was discussed.
3. Generate 2-3 questions that participants can ask to delve deeper into each topic.
4. Organize the information in a structured format that can be used in the closing Show Notes.

Example Structure:
- **Some Topic**: Summary of Some Topic
- **Another Topic**: Summary of Another Topic
- **Super Cool Topic**: Summary of Super Cool Topic"
        .to_string()
}

fn default_topic_user_prompt() -> String {
    "Here is a snippet from the podcast discussion for you to analyze:
\"\"\"
%{discussion}
\"\"\"

Please extract the topics following the structure above."
        .to_string()
}

fn default_discussion_system_prompt() -> String {
    "As a kind and helpful podcast co-host. Your task is to keep track of the overall \
discussion on the show. Additionally, you must be ready to provide a concise summary of \
the ongoing discussion at any moment and actively participate when asked.

To achieve this, follow these guidelines:
1. You are an active participant, and co-host of the show.
2. Your name is \"Buddy\".
3. Listen carefully to the podcast or read the provided transcript.
4. Take note of key points, arguments, discussions, and any action items mentioned.
5. Summarize the main points in a few sentences.
6. Think about this segment, and be prepared to elaborate on any part of the discussion \
or provide insights when asked.
7. You must never ask how you can help or provide assistance.
8. Never provide commentary or response, like \"Got it!\" or \"Great!\". Act naturally.

Here is a brief summary of the latest segment:
\"\"\"
%{summary}
\"\"\"

Let's start with the first segment:"
        .to_string()
}

fn default_discussion_user_prompt() -> String {
    "Segment:
\"\"\"
%{discussion}
\"\"\"

Wait for further instructions or questions from the host."
        .to_string()
}

fn default_notes_system_prompt() -> String {
    "You are a kind and helpful podcast assistant helping to take notes for the show, \
and extract useful information being discussed for listeners."
        .to_string()
}

fn default_notes_user_prompt() -> String {
    "Transcript:
---
%{transcript}
---

Topics:
---
%{topics}
---

Use the above transcript and topics to create Show Notes in markdown that outline the \
discussion. Extract a brief summary that describes the overall conversation, the people \
involved and their roles, and sentiment of the topics discussed. Follow the summary with \
a list of helpful links to any libraries, products, or other resources related to the \
discussion. Cite sources."
        .to_string()
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            topic_system: default_topic_system_prompt(),
            topic_user: default_topic_user_prompt(),
            discussion_system: default_discussion_system_prompt(),
            discussion_user: default_discussion_user_prompt(),
            notes_system: default_notes_system_prompt(),
            notes_user: default_notes_user_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_summarization_interval_s")]
    pub summarization_interval_s: u64,
}

fn default_summarization_interval_s() -> u64 {
    15
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            summarization_interval_s: default_summarization_interval_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoHostConfig {
    /// Upper bound on each operator-input wait so shutdown is observed
    /// promptly.
    #[serde(default = "default_input_timeout_s")]
    pub input_timeout_s: u64,
    /// Raw-transcript characters handed to answer generation as context.
    #[serde(default = "default_answer_context_chars")]
    pub answer_context_chars: u32,
    #[serde(default = "default_recent_topic_lines")]
    pub recent_topic_lines: usize,
}

fn default_input_timeout_s() -> u64 {
    5
}

fn default_answer_context_chars() -> u32 {
    1000
}

fn default_recent_topic_lines() -> usize {
    10
}

impl Default for CoHostConfig {
    fn default() -> Self {
        Self {
            input_timeout_s: default_input_timeout_s(),
            answer_context_chars: default_answer_context_chars(),
            recent_topic_lines: default_recent_topic_lines(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Audio player argv; the answer audio path is appended as the final
    /// argument.
    #[serde(default = "default_player_command")]
    pub command: Vec<String>,
}

fn default_player_command() -> Vec<String> {
    vec!["afplay".to_string()]
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: default_player_command(),
        }
    }
}

/// Substitutes `%{name}` placeholders in a prompt template.
pub fn fill_placeholders(template: &str, pairs: &[(&str, &str)]) -> String {
    let mut filled = template.to_string();
    for (name, value) in pairs {
        filled = filled.replace(&format!("%{{{name}}}"), value);
    }
    filled
}

/// Default session name: a filesystem-friendly local timestamp.
pub fn default_session_name() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}
