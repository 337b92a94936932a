// crates/cohost/src/lib.rs

use std::sync::Arc;
use std::time::{Duration, Instant};

use castmate_audio::AudioService;
use castmate_config::{CoHostConfig, OpenAiConfig, PromptsConfig, fill_placeholders};
use castmate_core::{CastmateResult, StatusLabel, TranscriptEvent, to_human};
use castmate_llm_connector::{CompletionBackend, CompletionRequest, Message, SpeechRequest};
use castmate_session::Session;
use castmate_transcriber::Transcriber;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Question-interval state. Exactly one is active at a time and
/// transitions happen only on operator-input edges, never on a timer.
pub enum QuestionState {
    Idle,
    Listening { since: Instant, buffer: String },
}

impl QuestionState {
    fn begin(&mut self) {
        *self = QuestionState::Listening {
            since: Instant::now(),
            buffer: String::new(),
        };
    }

    fn finish(&mut self) -> String {
        match std::mem::replace(self, QuestionState::Idle) {
            QuestionState::Listening { buffer, .. } => buffer,
            QuestionState::Idle => String::new(),
        }
    }
}

enum Wait {
    Edge,
    Timeout,
    Shutdown,
}

/// Operator-driven co-host: buffers the question text spoken between
/// two input edges, answers it through the AI backend and plays the
/// answer on air.
pub struct CoHost {
    config: CoHostConfig,
    prompts: PromptsConfig,
    openai: OpenAiConfig,
    state: Arc<Mutex<QuestionState>>,
    transcriber: Arc<Mutex<Transcriber>>,
    session: Arc<Session>,
    completion: Arc<dyn CompletionBackend>,
    audio: Arc<AudioService>,
    shutdown_rx: watch::Receiver<bool>,
}

impl CoHost {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CoHostConfig,
        prompts: PromptsConfig,
        openai: OpenAiConfig,
        transcriber: Arc<Mutex<Transcriber>>,
        session: Arc<Session>,
        completion: Arc<dyn CompletionBackend>,
        audio: Arc<AudioService>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            prompts,
            openai,
            state: Arc::new(Mutex::new(QuestionState::Idle)),
            transcriber,
            session,
            completion,
            audio,
            shutdown_rx,
        }
    }

    /// Bus callback: while Listening, events recognized at or after the
    /// start edge are appended in arrival order; earlier ones are
    /// recognizer lag from before the press and are ignored.
    pub fn subscriber(
        &self,
    ) -> impl Fn(&TranscriptEvent) -> CastmateResult<()> + Send + Sync + 'static {
        let state = Arc::clone(&self.state);
        move |event| {
            if let QuestionState::Listening { since, buffer } = &mut *state.lock() {
                if event.started_at >= *since {
                    info!("Heard question: {}", event.text);
                    buffer.push_str(&event.text);
                }
            }
            Ok(())
        }
    }

    /// Input loop: consumes operator edges until shutdown. Answer
    /// generation blocks only this loop; every failure inside it is
    /// logged and the machine returns to Idle.
    pub async fn run(&self, mut input_rx: mpsc::Receiver<()>) -> CastmateResult<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();
        self.prompt_for_start();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let listening = matches!(*self.state.lock(), QuestionState::Listening { .. });
            match self.wait_for_edge(&mut input_rx, &mut shutdown_rx).await {
                Wait::Edge if !listening => {
                    self.state.lock().begin();
                    info!(
                        "{}{}{}",
                        to_human("🎙️ Listening for question. Press ", StatusLabel::Wait),
                        to_human("Enter", StatusLabel::Input),
                        to_human(" to signal the end of the question...", StatusLabel::Wait)
                    );
                }
                Wait::Edge => {
                    info!("End of question signal. Generating answer...");
                    let question = self.state.lock().finish();
                    if let Err(err) = self.answer_question(&question).await {
                        error!(error = %err, "Failed to answer question");
                    }
                    self.prompt_for_start();
                }
                Wait::Timeout => {
                    debug!("Input timeout...");
                }
                Wait::Shutdown => break,
            }
        }

        debug!("Co-host input loop stopped");
        Ok(())
    }

    fn prompt_for_start(&self) {
        info!(
            "{}{}{}",
            to_human("Press ", StatusLabel::Info),
            to_human("Enter", StatusLabel::Input),
            to_human(" to signal a question start...", StatusLabel::Info)
        );
    }

    async fn wait_for_edge(
        &self,
        input_rx: &mut mpsc::Receiver<()>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Wait {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    Wait::Shutdown
                } else {
                    Wait::Timeout
                }
            }
            edge = input_rx.recv() => match edge {
                Some(()) => Wait::Edge,
                None => {
                    debug!("Operator input stream closed");
                    Wait::Shutdown
                }
            },
            _ = tokio::time::sleep(Duration::from_secs(self.config.input_timeout_s)) => Wait::Timeout,
        }
    }

    async fn answer_question(&self, question: &str) -> CastmateResult<()> {
        if question.trim().is_empty() {
            debug!("Question buffer is empty, nothing to answer");
            return Ok(());
        }

        let summary = self.session.current_summary().await.unwrap_or_default();
        let topics = self.session.current_topics().await.unwrap_or_default();
        let recent_topics = {
            let mut lines: Vec<&str> = topics
                .lines()
                .rev()
                .take(self.config.recent_topic_lines)
                .collect();
            lines.reverse();
            lines.join("\n")
        };
        let previous_discussion = self
            .transcriber
            .lock()
            .latest(i64::from(self.config.answer_context_chars))?;

        info!("Answering question:\n{question}");
        debug!(
            "Context:\n---\n{summary}\nTopics discussed recently:\n---\n{recent_topics}\n---\n\
Previous discussion:\n---\n{previous_discussion}\n---\nAnswering question:\n---\n{question}\n---"
        );

        let system = format!(
            "{}\nTopics discussed recently:\n---\n{recent_topics}\n---\n\
Previous discussion:\n---\n{previous_discussion}\n---",
            fill_placeholders(&self.prompts.discussion_system, &[("summary", &summary)])
        );

        let answer = self
            .completion
            .complete(CompletionRequest::new(
                self.openai.answer_model.clone(),
                vec![Message::system(system), Message::user(question.to_string())],
                self.openai.answer_max_tokens,
            ))
            .await?;
        debug!("Answer: {answer}");

        let audio_path = self.session.answer_audio_path();
        self.audio
            .speak_to_file(
                SpeechRequest {
                    model: self.openai.tts_model.clone(),
                    input: answer,
                    voice: self.openai.tts_voice.clone(),
                    speed: self.openai.tts_speed,
                    format: self.openai.tts_format.clone(),
                },
                &audio_path,
            )
            .await?;
        debug!("Answer converted to speech: {}", audio_path.display());

        self.audio.play(&audio_path).await?;
        Ok(())
    }
}

/// Pumps operator input lines into a channel of edges: every complete
/// line is one distinguished newline edge.
pub fn spawn_stdin_edges(mut shutdown_rx: watch::Receiver<bool>) -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                line = lines.next_line() => match line {
                    Ok(Some(_)) => {
                        debug!("Input received...");
                        if tx.send(()).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
        }
        debug!("Operator input pump stopped");
    });

    rx
}
