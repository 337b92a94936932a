// src/app.rs
use std::sync::Arc;
use std::time::Duration;

use castmate_actions::ActionScheduler;
use castmate_assistant::ShowAssistant;
use castmate_audio::AudioService;
use castmate_cohost::CoHost;
use castmate_config::{CastmateConfig, default_session_name};
use castmate_core::{CastmateResult, StatusLabel, TranscriptEvent, to_human};
use castmate_listener::{Listener, ListenerConfig};
use castmate_llm_connector::OpenAiClient;
use castmate_session::Session;
use castmate_signal::{PodSignal, SignalConfig};
use castmate_transcriber::Transcriber;
use parking_lot::Mutex;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

struct NamedTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Composition root: builds every component against one shared event
/// bus, runs them under a single shutdown flag, and performs the
/// ordered shutdown (stop listener, join tasks, drain bus, show notes).
pub struct CastmateApp {
    config: CastmateConfig,
    session: Arc<Session>,
    signal: Arc<PodSignal<TranscriptEvent>>,
    listener: Arc<Listener>,
    cohost: Arc<CoHost>,
    assistant: Arc<ShowAssistant>,
    actions: Arc<ActionScheduler>,
    shutdown_tx: watch::Sender<bool>,
}

impl CastmateApp {
    pub async fn new(config: CastmateConfig) -> CastmateResult<Self> {
        let session_name = config
            .app
            .session_name
            .clone()
            .unwrap_or_else(default_session_name);
        let session = Arc::new(Session::new(&config.app.root, session_name)?);
        info!(
            "{}",
            to_human(
                &format!("Saving session files to: {}", session.base_path().display()),
                StatusLabel::Info
            )
        );

        // A missing credential fails here, before anything starts.
        let openai = Arc::new(OpenAiClient::new(config.openai.clone())?);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let signal = Arc::new(PodSignal::new(SignalConfig::default()));
        let transcriber = Arc::new(Mutex::new(Transcriber::new()));

        let (program, args) = config.whisper.command();
        let listener = Arc::new(Listener::new(
            ListenerConfig { program, args },
            Arc::clone(&transcriber),
            Arc::clone(&signal),
            Arc::clone(&session),
        ));

        let audio = Arc::new(AudioService::new(
            openai.clone(),
            config.player.command.clone(),
        ));

        let cohost = Arc::new(CoHost::new(
            config.cohost.clone(),
            config.prompts.clone(),
            config.openai.clone(),
            Arc::clone(&transcriber),
            Arc::clone(&session),
            openai.clone(),
            audio,
            shutdown_rx.clone(),
        ));

        let assistant = Arc::new(ShowAssistant::new(
            config.assistant.clone(),
            &config.app,
            config.prompts.clone(),
            config.openai.clone(),
            Arc::clone(&session),
            openai.clone(),
            shutdown_rx.clone(),
        ));

        let action_specs = castmate_actions::load_actions(&config.app.actions_file)?;
        if !action_specs.is_empty() {
            info!(actions = action_specs.len(), "Loaded buffered actions");
        }
        let actions = Arc::new(ActionScheduler::new(action_specs, openai, shutdown_rx));

        // Subscription order is delivery order for every event.
        signal.subscribe(cohost.subscriber());
        signal.subscribe(assistant.subscriber());
        signal.subscribe(actions.subscriber());

        Ok(Self {
            config,
            session,
            signal,
            listener,
            cohost,
            assistant,
            actions,
            shutdown_tx,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub async fn run(&self) -> CastmateResult<()> {
        let listener = Arc::clone(&self.listener);
        let listener_task = tokio::spawn(async move {
            if let Err(err) = listener.start().await {
                error!("Listener failed: {err}");
            }
        });

        let assistant = Arc::clone(&self.assistant);
        let summarizer_task = tokio::spawn(async move {
            if let Err(err) = assistant.run().await {
                error!("Periodic summarizer failed: {err}");
            }
        });

        let actions = Arc::clone(&self.actions);
        let actions_task = tokio::spawn(async move {
            if let Err(err) = actions.run().await {
                error!("Action scheduler failed: {err}");
            }
        });

        let cohost = Arc::clone(&self.cohost);
        let input_rx = castmate_cohost::spawn_stdin_edges(self.shutdown_tx.subscribe());
        let cohost_task = tokio::spawn(async move {
            if let Err(err) = cohost.run(input_rx).await {
                error!("Co-host failed: {err}");
            }
        });

        let tasks = vec![
            NamedTask {
                name: "Listener",
                handle: listener_task,
            },
            NamedTask {
                name: "Periodic Summarizer",
                handle: summarizer_task,
            },
            NamedTask {
                name: "Action Scheduler",
                handle: actions_task,
            },
            NamedTask {
                name: "Co-Host",
                handle: cohost_task,
            },
        ];

        let session_timeout = Duration::from_secs(self.config.app.session_timeout_s);
        tokio::select! {
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("{}", to_human("\nShutting down streams...", StatusLabel::Wait)),
                    Err(err) => error!("Failed to listen for shutdown signal: {err}"),
                }
            }
            _ = tokio::time::sleep(session_timeout) => {
                info!("{}", to_human("Session timeout reached, shutting down...", StatusLabel::Wait));
            }
        }

        self.shutdown(tasks).await;
        Ok(())
    }

    /// Ordered shutdown: flag every loop, stop the recognizer, join all
    /// tasks, drain the bus, then run terminal steps over the settled
    /// stores. Terminal failures are logged, never raised.
    async fn shutdown(&self, tasks: Vec<NamedTask>) {
        let _ = self.shutdown_tx.send(true);
        self.listener.stop();

        for task in tasks {
            info!(
                "{}",
                to_human(&format!("Waiting for {} to shutdown...", task.name), StatusLabel::Wait)
            );
            if let Err(err) = task.handle.await {
                warn!("{} task ended abnormally: {err}", task.name);
            }
        }

        self.signal.close().await;
        self.actions.flush_remaining().await;

        info!("{}", to_human("Generating show notes...", StatusLabel::Wait));
        if let Err(err) = self.assistant.generate_show_notes().await {
            warn!("Failed to generate show notes: {err}");
        }
    }
}
