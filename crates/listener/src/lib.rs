// crates/listener/src/lib.rs

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use castmate_core::{CastmateError, CastmateResult, TranscriptEvent};
use castmate_session::Session;
use castmate_signal::PodSignal;
use castmate_transcriber::Transcriber;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Argv of the streaming recognizer subprocess.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Drives the recognizer subprocess and turns its output into
/// transcript events.
///
/// The stdout read loop does the ordering-sensitive work inline (parse,
/// publish) so events reach the bus in exact recognition order; slow
/// side effects (transcript persistence) run in per-line tasks that are
/// all joined before `start` returns.
pub struct Listener {
    config: ListenerConfig,
    transcriber: Arc<Mutex<Transcriber>>,
    signal: Arc<PodSignal<TranscriptEvent>>,
    session: Arc<Session>,
    shutdown_tx: watch::Sender<bool>,
}

impl Listener {
    pub fn new(
        config: ListenerConfig,
        transcriber: Arc<Mutex<Transcriber>>,
        signal: Arc<PodSignal<TranscriptEvent>>,
        session: Arc<Session>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            transcriber,
            signal,
            session,
            shutdown_tx,
        }
    }

    /// Registers a callback on the transcript event stream.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&TranscriptEvent) -> CastmateResult<()> + Send + Sync + 'static,
    {
        self.signal.subscribe(callback);
    }

    pub fn signal(&self) -> &Arc<PodSignal<TranscriptEvent>> {
        &self.signal
    }

    pub fn transcriber(&self) -> &Arc<Mutex<Transcriber>> {
        &self.transcriber
    }

    /// Requests a cooperative stop. Idempotent; the flag is observed
    /// before each blocking read.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Runs the recognizer until shutdown or stream end. The subprocess
    /// never outlives this call.
    pub async fn start(&self) -> CastmateResult<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow() {
            return Ok(());
        }

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CastmateError::Recognizer(format!(
                    "Failed to start recognizer {}: {e}",
                    self.config.program.display()
                ))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            CastmateError::Recognizer("Unable to capture recognizer stdout".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            CastmateError::Recognizer("Unable to capture recognizer stderr".to_string())
        })?;

        // Recognizer diagnostics go to the session's whisper log, not
        // the operator console.
        let stderr_session = Arc::clone(&self.session);
        let stderr_task: JoinHandle<()> = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "recognizer", "{line}");
                if let Err(err) = stderr_session.append_whisper_log(&line).await {
                    warn!(error = %err, "Failed to persist recognizer diagnostics");
                }
            }
        });

        info!("Listening...");

        let mut reader = BufReader::new(stdout).lines();
        let mut line_tasks: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!("Shutdown observed, leaving recognizer read loop");
                        break;
                    }
                }
                line = reader.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            let started_at = Instant::now();
                            debug!(raw = %line, "Recognizer output");

                            let text = self.transcriber.lock().process(&line);
                            if text.is_empty() {
                                continue;
                            }

                            info!("Heard: {text}");
                            self.signal
                                .trigger(TranscriptEvent::at(text.clone(), started_at))
                                .await;

                            let session = Arc::clone(&self.session);
                            line_tasks.push(tokio::spawn(async move {
                                if let Err(err) = session.append_transcript(&text).await {
                                    warn!(error = %err, "Failed to persist transcript line");
                                }
                            }));
                            line_tasks.retain(|task| !task.is_finished());
                        }
                        Ok(None) => {
                            info!("Recognizer stream ended");
                            break;
                        }
                        Err(err) => {
                            warn!(error = %err, "Recognizer read failed");
                            break;
                        }
                    }
                }
            }
        }

        for task in line_tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "Transcript persistence task failed");
            }
        }

        if child.start_kill().is_err() {
            debug!("Recognizer already exited");
        }
        if let Err(err) = child.wait().await {
            warn!(error = %err, "Failed to reap recognizer subprocess");
        }
        if let Err(err) = stderr_task.await {
            warn!(error = %err, "Recognizer diagnostics task failed");
        }

        Ok(())
    }
}
