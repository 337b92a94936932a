// crates/audio/src/lib.rs

use std::path::Path;
use std::sync::Arc;

use castmate_core::{CastmateError, CastmateResult};
use castmate_llm_connector::{SpeechBackend, SpeechRequest};
use tokio::process::Command;
use tracing::debug;

/// Turns answer text into audible playback: synthesize through the
/// speech backend, persist the bytes, hand the file to an external
/// player subprocess.
pub struct AudioService {
    speech: Arc<dyn SpeechBackend>,
    player_command: Vec<String>,
}

impl AudioService {
    pub fn new(speech: Arc<dyn SpeechBackend>, player_command: Vec<String>) -> Self {
        Self {
            speech,
            player_command,
        }
    }

    /// Synthesizes `request` and writes the audio to `path`.
    pub async fn speak_to_file(&self, request: SpeechRequest, path: &Path) -> CastmateResult<()> {
        debug!(backend = %self.speech.name(), "Synthesizing speech");
        let audio = self.speech.synthesize(request).await?;

        if audio.is_empty() {
            return Err(CastmateError::Speech(
                "Synthesis returned an empty audio payload".to_string(),
            ));
        }

        tokio::fs::write(path, &audio).await?;
        Ok(())
    }

    /// Plays an audio file through the configured player subprocess and
    /// waits for playback to finish.
    pub async fn play(&self, path: &Path) -> CastmateResult<()> {
        let (program, args) = self
            .player_command
            .split_first()
            .ok_or_else(|| CastmateError::Config("Player command is empty".to_string()))?;

        debug!(player = %program, file = %path.display(), "Playing audio");

        let status = Command::new(program)
            .args(args)
            .arg(path)
            .status()
            .await
            .map_err(|e| CastmateError::Speech(format!("Failed to launch player: {e}")))?;

        if !status.success() {
            return Err(CastmateError::Speech(format!(
                "Player exited with status {status}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticSpeech(Vec<u8>);

    #[async_trait]
    impl SpeechBackend for StaticSpeech {
        async fn synthesize(&self, _request: SpeechRequest) -> CastmateResult<Vec<u8>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn request() -> SpeechRequest {
        SpeechRequest {
            model: "tts-1".to_string(),
            input: "hello".to_string(),
            voice: "onyx".to_string(),
            speed: 1.0,
            format: "mp3".to_string(),
        }
    }

    #[tokio::test]
    async fn speak_to_file_persists_synthesized_audio() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("answer.mp3");
        let service = AudioService::new(Arc::new(StaticSpeech(b"mp3".to_vec())), vec!["true".into()]);

        service.speak_to_file(request(), &path).await.expect("speaks");
        assert_eq!(std::fs::read(&path).expect("read"), b"mp3");
    }

    #[tokio::test]
    async fn empty_synthesis_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("answer.mp3");
        let service = AudioService::new(Arc::new(StaticSpeech(Vec::new())), vec!["true".into()]);

        let err = service.speak_to_file(request(), &path).await.unwrap_err();
        assert!(matches!(err, CastmateError::Speech(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn play_reports_player_failure() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("answer.mp3");
        std::fs::write(&path, b"mp3").expect("write");

        let service = AudioService::new(Arc::new(StaticSpeech(Vec::new())), vec!["false".into()]);
        let err = service.play(&path).await.unwrap_err();
        assert!(matches!(err, CastmateError::Speech(_)));
    }

    #[tokio::test]
    async fn play_succeeds_with_a_well_behaved_player() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("answer.mp3");
        std::fs::write(&path, b"mp3").expect("write");

        let service = AudioService::new(Arc::new(StaticSpeech(Vec::new())), vec!["true".into()]);
        service.play(&path).await.expect("plays");
    }
}
