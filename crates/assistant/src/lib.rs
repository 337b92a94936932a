// crates/assistant/src/lib.rs

use std::sync::Arc;
use std::time::Duration;

use castmate_config::{AppConfig, AssistantConfig, OpenAiConfig, PromptsConfig, fill_placeholders};
use castmate_core::{CastmateResult, StatusLabel, TranscriptEvent, to_human};
use castmate_llm_connector::{CompletionBackend, CompletionRequest, Message};
use castmate_session::Session;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Passive show assistant: accumulates the ongoing discussion and, on a
/// fixed interval, extracts topics and refreshes the rolling summary.
/// After shutdown it turns the whole session into show notes.
pub struct ShowAssistant {
    config: AssistantConfig,
    prompts: PromptsConfig,
    openai: OpenAiConfig,
    announce_command: Vec<String>,
    session: Arc<Session>,
    completion: Arc<dyn CompletionBackend>,
    discussion: Arc<Mutex<String>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ShowAssistant {
    pub fn new(
        config: AssistantConfig,
        app: &AppConfig,
        prompts: PromptsConfig,
        openai: OpenAiConfig,
        session: Arc<Session>,
        completion: Arc<dyn CompletionBackend>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            prompts,
            openai,
            announce_command: app.announce_command.clone(),
            session,
            completion,
            discussion: Arc::new(Mutex::new(String::new())),
            shutdown_rx,
        }
    }

    /// Bus callback: every utterance joins the discussion buffer for the
    /// next summarization cycle.
    pub fn subscriber(
        &self,
    ) -> impl Fn(&TranscriptEvent) -> CastmateResult<()> + Send + Sync + 'static {
        let discussion = Arc::clone(&self.discussion);
        move |event| {
            discussion.lock().push_str(&event.text);
            Ok(())
        }
    }

    /// Fixed-interval loop under the shared shutdown flag.
    pub async fn run(&self) -> CastmateResult<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let interval = Duration::from_secs(self.config.summarization_interval_s);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {
                    self.summarize_latest().await;
                }
            }
        }

        debug!("Periodic summarizer stopped");
        Ok(())
    }

    /// Hands the buffered discussion to topic extraction and
    /// summarization. The buffer is reset at the handoff: text arriving
    /// while the AI calls run belongs to the next cycle. Each call's
    /// failure is isolated and logged.
    pub async fn summarize_latest(&self) {
        let text = {
            let mut discussion = self.discussion.lock();
            std::mem::take(&mut *discussion)
        };
        if text.trim().is_empty() {
            return;
        }

        debug!("[periodic summarization] Latest transcript: {text}");
        tokio::join!(self.update_topics(&text), self.summarize(&text));
    }

    async fn update_topics(&self, text: &str) {
        debug!("Looking for topics related to: {text}");

        let request = CompletionRequest::new(
            self.openai.topics_model.clone(),
            vec![
                Message::system(self.prompts.topic_system.clone()),
                Message::user(fill_placeholders(
                    &self.prompts.topic_user,
                    &[("discussion", text)],
                )),
            ],
            self.openai.topics_max_tokens,
        );

        match self.completion.complete(request).await {
            Ok(response) => {
                let new_topics = response.replace("NONE", "").trim().to_string();
                if new_topics.is_empty() {
                    return;
                }

                if let Err(err) = self.session.append_topics(&new_topics).await {
                    error!(error = %err, "Failed to store topics");
                    return;
                }
                if let Err(err) = self
                    .session
                    .announce_topics(&new_topics, &self.announce_command)
                    .await
                {
                    error!(error = %err, "Failed to announce topics");
                }
            }
            Err(err) => error!("Failed to update topics: {err}"),
        }
    }

    async fn summarize(&self, text: &str) {
        debug!("Summarizing current discussion...");

        let summary = self.session.current_summary().await.unwrap_or_default();
        let request = CompletionRequest::new(
            self.openai.summary_model.clone(),
            vec![
                Message::system(fill_placeholders(
                    &self.prompts.discussion_system,
                    &[("summary", &summary)],
                )),
                Message::user(fill_placeholders(
                    &self.prompts.discussion_user,
                    &[("discussion", text)],
                )),
            ],
            self.openai.summary_max_tokens,
        );

        match self.completion.complete(request).await {
            Ok(new_summary) => {
                info!("{}", to_human(&format!("Thoughts: {new_summary}"), StatusLabel::Info));
                if let Err(err) = self.session.replace_summary(&new_summary).await {
                    error!(error = %err, "Failed to store summary");
                }
            }
            Err(err) => error!("Failed to summarize discussion: {err}"),
        }
    }

    /// Terminal step, run after every task has completed: one completion
    /// over the full transcript and topics, written to the show-notes
    /// file. An empty transcript produces no notes.
    pub async fn generate_show_notes(&self) -> CastmateResult<()> {
        let transcript = self.session.current_transcript().await?;
        if transcript.trim().is_empty() {
            debug!("Transcript empty, skipping show notes");
            return Ok(());
        }
        let topics = self.session.current_topics().await?;

        let request = CompletionRequest::new(
            self.openai.notes_model.clone(),
            vec![
                Message::system(self.prompts.notes_system.clone()),
                Message::user(fill_placeholders(
                    &self.prompts.notes_user,
                    &[("transcript", transcript.as_str()), ("topics", topics.as_str())],
                )),
            ],
            self.openai.notes_max_tokens,
        );

        let notes = self.completion.complete(request).await?;
        self.session.write_show_notes(&notes).await?;

        info!(
            "{}",
            to_human(
                &format!("Show notes saved to: {}", self.session.show_notes_path().display()),
                StatusLabel::Success
            )
        );
        Ok(())
    }
}
