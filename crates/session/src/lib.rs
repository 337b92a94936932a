// crates/session/src/lib.rs

use std::path::{Path, PathBuf};

use castmate_core::{CastmateResult, StatusLabel, to_human};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Per-run storage bundle for one recording session.
///
/// All artifacts live under `<root>/tmp/<name>/`; the file layout is
/// this store's concern, callers only see the narrow accessors.
pub struct Session {
    name: String,
    base_path: PathBuf,
}

impl Session {
    pub fn new(root: &Path, name: impl Into<String>) -> CastmateResult<Self> {
        let name = name.into();
        let base_path = root.join("tmp").join(&name);
        std::fs::create_dir_all(&base_path)?;

        Ok(Self { name, base_path })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.base_path.join("transcript.log")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.base_path.join("summary.log")
    }

    pub fn topics_path(&self) -> PathBuf {
        self.base_path.join("topics.log")
    }

    pub fn show_notes_path(&self) -> PathBuf {
        self.base_path.join("show-notes.md")
    }

    pub fn whisper_log_path(&self) -> PathBuf {
        self.base_path.join("whisper.log")
    }

    pub fn answer_audio_path(&self) -> PathBuf {
        self.base_path.join("response.mp3")
    }

    pub async fn append_transcript(&self, text: &str) -> CastmateResult<()> {
        append_line(&self.transcript_path(), text).await
    }

    pub async fn current_transcript(&self) -> CastmateResult<String> {
        read_or_empty(&self.transcript_path()).await
    }

    pub async fn current_summary(&self) -> CastmateResult<String> {
        read_or_empty(&self.summary_path()).await
    }

    pub async fn replace_summary(&self, summary: &str) -> CastmateResult<()> {
        tokio::fs::write(self.summary_path(), summary).await?;
        Ok(())
    }

    pub async fn current_topics(&self) -> CastmateResult<String> {
        read_or_empty(&self.topics_path()).await
    }

    pub async fn append_topics(&self, topics: &str) -> CastmateResult<()> {
        append_line(&self.topics_path(), topics).await
    }

    /// Pretty-prints the topics file through an external command,
    /// falling back to a styled log line when the command is missing.
    pub async fn announce_topics(&self, topics: &str, command: &[String]) -> CastmateResult<()> {
        if let Some((program, args)) = command.split_first() {
            let status = tokio::process::Command::new(program)
                .args(args)
                .arg(self.topics_path())
                .status()
                .await;

            match status {
                Ok(status) if status.success() => return Ok(()),
                Ok(status) => debug!(%status, "Topic announce command exited non-zero"),
                Err(err) => debug!(error = %err, "Topic announce command unavailable"),
            }
        }

        info!("{}", to_human(&format!("New topics:\n{topics}"), StatusLabel::Info));
        Ok(())
    }

    pub async fn append_whisper_log(&self, line: &str) -> CastmateResult<()> {
        append_line(&self.whisper_log_path(), line).await
    }

    pub async fn write_show_notes(&self, notes: &str) -> CastmateResult<()> {
        tokio::fs::write(self.show_notes_path(), notes).await?;
        Ok(())
    }

    pub async fn write_answer_audio(&self, audio: &[u8]) -> CastmateResult<PathBuf> {
        let path = self.answer_audio_path();
        tokio::fs::write(&path, audio).await?;
        Ok(path)
    }
}

async fn append_line(path: &Path, text: &str) -> CastmateResult<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.write_all(b"\n").await?;
    Ok(())
}

async fn read_or_empty(path: &Path) -> CastmateResult<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err.into()),
    }
}
