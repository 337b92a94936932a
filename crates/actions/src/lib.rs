// crates/actions/src/lib.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use castmate_config::fill_placeholders;
use castmate_core::{CastmateError, CastmateResult, TranscriptEvent};
use castmate_llm_connector::{CompletionBackend, CompletionRequest, Message};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// How an action writes its output file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Append,
    Overwrite,
}

/// One user-configured post-processing rule, loaded once at session
/// start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// User prompt template; `%{discussion}` is replaced with the
    /// buffered text.
    pub prompt: String,
    #[serde(default = "default_action_model")]
    pub model: String,
    #[serde(default = "default_action_max_tokens")]
    pub max_tokens: u32,
    pub output_file: PathBuf,
    #[serde(default)]
    pub mode: WriteMode,
    #[serde(default)]
    pub interval_secs: u64,
}

fn default_action_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_action_max_tokens() -> u32 {
    500
}

#[derive(Debug, Default, Deserialize)]
struct ActionsFile {
    #[serde(default)]
    actions: BTreeMap<String, ActionSpec>,
}

/// Loads the actions file. A missing file simply means no actions.
pub fn load_actions(path: &Path) -> CastmateResult<Vec<ActionSpec>> {
    if !path.exists() {
        debug!("No actions file at {}", path.display());
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)?;
    let file: ActionsFile = toml::from_str(&content).map_err(|e| {
        CastmateError::Action(format!("Failed to parse actions file {}: {e}", path.display()))
    })?;

    let mut specs = Vec::new();
    for (key, mut spec) in file.actions {
        if spec.name.is_empty() {
            spec.name = key;
        }
        specs.push(spec);
    }
    Ok(specs)
}

struct ActionState {
    buffer: String,
    last_flushed_at: Instant,
    in_flight: bool,
}

struct ActionRuntime {
    spec: ActionSpec,
    state: Mutex<ActionState>,
}

impl ActionRuntime {
    fn new(spec: ActionSpec) -> Self {
        Self {
            spec,
            state: Mutex::new(ActionState {
                buffer: String::new(),
                last_flushed_at: Instant::now(),
                in_flight: false,
            }),
        }
    }

    /// Snapshot the buffer when the action is due; marks the action
    /// in-flight so no second flush starts before this one resolves.
    fn take_eligible_snapshot(&self) -> Option<String> {
        let mut state = self.state.lock();
        if state.in_flight || state.buffer.is_empty() {
            return None;
        }

        let due = self.spec.interval_secs == 0
            || state.last_flushed_at.elapsed() >= Duration::from_secs(self.spec.interval_secs);
        if !due {
            return None;
        }

        state.in_flight = true;
        Some(state.buffer.clone())
    }

    /// Only the flushed prefix is cleared, so text that arrived while
    /// the AI call was in flight survives into the next cycle.
    fn complete_flush(&self, flushed_len: usize) {
        let mut state = self.state.lock();
        state.in_flight = false;
        let drain_len = flushed_len.min(state.buffer.len());
        state.buffer.drain(..drain_len);
        state.last_flushed_at = Instant::now();
    }

    fn abort_flush(&self) {
        self.state.lock().in_flight = false;
    }
}

/// Runs every configured action over the shared transcript stream, each
/// on its own flush interval against its own buffer.
pub struct ActionScheduler {
    actions: Vec<Arc<ActionRuntime>>,
    completion: Arc<dyn CompletionBackend>,
    tick_tx: mpsc::Sender<()>,
    tick_rx: Mutex<Option<mpsc::Receiver<()>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ActionScheduler {
    pub fn new(
        specs: Vec<ActionSpec>,
        completion: Arc<dyn CompletionBackend>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let (tick_tx, tick_rx) = mpsc::channel(1);
        Self {
            actions: specs.into_iter().map(|s| Arc::new(ActionRuntime::new(s))).collect(),
            completion,
            tick_tx,
            tick_rx: Mutex::new(Some(tick_rx)),
            shutdown_rx,
        }
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Bus callback: buffer the utterance into every action and nudge
    /// the scheduler. A full tick channel means a tick is already
    /// pending, which is all we need.
    pub fn subscriber(
        &self,
    ) -> impl Fn(&TranscriptEvent) -> CastmateResult<()> + Send + Sync + 'static {
        let actions: Vec<Arc<ActionRuntime>> = self.actions.iter().map(Arc::clone).collect();
        let tick_tx = self.tick_tx.clone();
        move |event| {
            for action in &actions {
                action.state.lock().buffer.push_str(&event.text);
            }
            let _ = tick_tx.try_send(());
            Ok(())
        }
    }

    /// Scheduling loop: evaluates all actions on every event tick and on
    /// a periodic fallback tick, until shutdown. In-flight flushes are
    /// awaited before returning.
    pub async fn run(&self) -> CastmateResult<()> {
        if self.actions.is_empty() {
            debug!("No actions configured");
            return Ok(());
        }

        let mut tick_rx = self
            .tick_rx
            .lock()
            .take()
            .ok_or_else(|| CastmateError::Action("Action scheduler already running".to_string()))?;
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut flushes: Vec<JoinHandle<()>> = Vec::new();

        info!(actions = self.actions.len(), "Action scheduler started");

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tick_rx.recv() => {
                    self.evaluate_all(&mut flushes);
                }
                _ = tokio::time::sleep(TICK_INTERVAL) => {
                    self.evaluate_all(&mut flushes);
                }
            }
            flushes.retain(|flush| !flush.is_finished());
        }

        for flush in flushes {
            if let Err(err) = flush.await {
                warn!(error = %err, "Action flush task failed");
            }
        }

        debug!("Action scheduler stopped");
        Ok(())
    }

    fn evaluate_all(&self, flushes: &mut Vec<JoinHandle<()>>) {
        for action in &self.actions {
            let Some(snapshot) = action.take_eligible_snapshot() else {
                continue;
            };

            let action = Arc::clone(action);
            let completion = Arc::clone(&self.completion);
            flushes.push(tokio::spawn(async move {
                let flushed_len = snapshot.len();
                match flush_action(&action.spec, snapshot, completion.as_ref()).await {
                    Ok(()) => action.complete_flush(flushed_len),
                    Err(err) => {
                        warn!("[{}] action failed: {err}", action.spec.name);
                        action.abort_flush();
                    }
                }
            }));
        }
    }

    /// One final evaluation pass, used at shutdown to flush whatever is
    /// still buffered. Best-effort: failures are logged and dropped.
    pub async fn flush_remaining(&self) {
        for action in &self.actions {
            let snapshot = {
                let mut state = action.state.lock();
                if state.in_flight || state.buffer.is_empty() {
                    continue;
                }
                state.in_flight = true;
                state.buffer.clone()
            };

            let flushed_len = snapshot.len();
            match flush_action(&action.spec, snapshot, self.completion.as_ref()).await {
                Ok(()) => action.complete_flush(flushed_len),
                Err(err) => {
                    warn!("[{}] final flush failed: {err}", action.spec.name);
                    action.abort_flush();
                }
            }
        }
    }
}

async fn flush_action(
    spec: &ActionSpec,
    buffered: String,
    completion: &dyn CompletionBackend,
) -> CastmateResult<()> {
    let mut messages = Vec::new();
    if let Some(system) = &spec.system_prompt {
        messages.push(Message::system(system.clone()));
    }
    messages.push(Message::user(fill_placeholders(
        &spec.prompt,
        &[("discussion", &buffered)],
    )));

    let output = completion
        .complete(CompletionRequest::new(
            spec.model.clone(),
            messages,
            spec.max_tokens,
        ))
        .await?;

    let mut file = match spec.mode {
        WriteMode::Append => {
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&spec.output_file)
                .await?
        }
        WriteMode::Overwrite => {
            tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&spec.output_file)
                .await?
        }
    };
    file.write_all(output.as_bytes()).await?;
    file.write_all(b"\n").await?;

    debug!("[{}] wrote output to {}", spec.name, spec.output_file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingBackend {
        fn succeeding() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl CompletionBackend for CountingBackend {
        async fn complete(&self, request: CompletionRequest) -> CastmateResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CastmateError::Completion("backend down".to_string()));
            }
            let prompt = &request.messages.last().expect("user message").content;
            Ok(format!("summary of: {prompt}"))
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn spec(name: &str, interval_secs: u64, output: &Path, mode: WriteMode) -> ActionSpec {
        ActionSpec {
            name: name.to_string(),
            system_prompt: None,
            prompt: "Process: %{discussion}".to_string(),
            model: "test-model".to_string(),
            max_tokens: 100,
            output_file: output.to_path_buf(),
            mode,
            interval_secs,
        }
    }

    fn feed(scheduler: &ActionScheduler, text: &str) {
        let subscriber = scheduler.subscriber();
        subscriber(&TranscriptEvent::new(text)).expect("subscriber accepts event");
    }

    #[tokio::test]
    async fn zero_interval_actions_flush_on_every_non_empty_buffer() {
        let dir = tempfile::tempdir().expect("temp dir");
        let output = dir.path().join("notes.md");
        let backend = CountingBackend::succeeding();
        let (_tx, rx) = watch::channel(false);
        let scheduler = ActionScheduler::new(
            vec![spec("notes", 0, &output, WriteMode::Append)],
            backend.clone(),
            rx,
        );

        feed(&scheduler, "first ");
        scheduler.flush_remaining().await;
        feed(&scheduler, "second ");
        scheduler.flush_remaining().await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        let written = std::fs::read_to_string(&output).expect("output exists");
        assert!(written.contains("first"));
        assert!(written.contains("second"));
    }

    #[tokio::test]
    async fn empty_buffers_never_flush() {
        let dir = tempfile::tempdir().expect("temp dir");
        let backend = CountingBackend::succeeding();
        let (_tx, rx) = watch::channel(false);
        let scheduler = ActionScheduler::new(
            vec![spec("notes", 0, &dir.path().join("notes.md"), WriteMode::Append)],
            backend.clone(),
            rx,
        );

        scheduler.flush_remaining().await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn interval_gated_actions_coalesce_writes_inside_the_window() {
        let dir = tempfile::tempdir().expect("temp dir");
        let output = dir.path().join("notes.md");
        let backend = CountingBackend::succeeding();
        let (_tx, rx) = watch::channel(false);
        let scheduler = ActionScheduler::new(
            vec![spec("notes", 30, &output, WriteMode::Append)],
            backend.clone(),
            rx,
        );

        // Two buffer writes well inside the interval window.
        feed(&scheduler, "first ");
        feed(&scheduler, "second ");

        let mut flushes = Vec::new();
        scheduler.evaluate_all(&mut flushes);
        for flush in flushes {
            flush.await.expect("flush joins");
        }

        // Not yet due: construction counts as the last flush point.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        // Once due, both writes land in exactly one flush.
        scheduler.actions[0].state.lock().last_flushed_at = Instant::now()
            .checked_sub(Duration::from_secs(31))
            .expect("process has been up longer than the flush interval");
        let mut flushes = Vec::new();
        scheduler.evaluate_all(&mut flushes);
        for flush in flushes {
            flush.await.expect("flush joins");
        }

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        let written = std::fs::read_to_string(&output).expect("output exists");
        assert!(written.contains("first second"));
    }

    #[tokio::test]
    async fn a_failing_action_keeps_its_buffer_for_a_later_tick() {
        let dir = tempfile::tempdir().expect("temp dir");
        let output = dir.path().join("notes.md");
        let backend = CountingBackend::failing();
        let (_tx, rx) = watch::channel(false);
        let scheduler = ActionScheduler::new(
            vec![spec("notes", 0, &output, WriteMode::Append)],
            backend.clone(),
            rx,
        );

        feed(&scheduler, "buffered text ");
        scheduler.flush_remaining().await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.actions[0].state.lock().buffer, "buffered text ");
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn one_failing_action_does_not_affect_the_others() {
        let dir = tempfile::tempdir().expect("temp dir");
        let good_output = dir.path().join("good.md");
        let backend = CountingBackend::succeeding();
        let (_tx, rx) = watch::channel(false);

        let mut bad = spec("bad", 0, &dir.path().join("no/such/dir/out.md"), WriteMode::Append);
        bad.prompt = "%{discussion}".to_string();
        let scheduler = ActionScheduler::new(
            vec![bad, spec("good", 0, &good_output, WriteMode::Append)],
            backend,
            rx,
        );

        feed(&scheduler, "text ");
        scheduler.flush_remaining().await;

        assert!(good_output.exists());
        // The failing action keeps its buffer, the good one cleared it.
        assert_eq!(scheduler.actions[0].state.lock().buffer, "text ");
        assert!(scheduler.actions[1].state.lock().buffer.is_empty());
    }

    #[tokio::test]
    async fn overwrite_mode_replaces_previous_output() {
        let dir = tempfile::tempdir().expect("temp dir");
        let output = dir.path().join("latest.md");
        let backend = CountingBackend::succeeding();
        let (_tx, rx) = watch::channel(false);
        let scheduler = ActionScheduler::new(
            vec![spec("latest", 0, &output, WriteMode::Overwrite)],
            backend,
            rx,
        );

        feed(&scheduler, "first");
        scheduler.flush_remaining().await;
        feed(&scheduler, "second");
        scheduler.flush_remaining().await;

        let written = std::fs::read_to_string(&output).expect("output exists");
        assert!(written.contains("second"));
        assert!(!written.contains("first"));
    }

    #[tokio::test]
    async fn run_drains_on_shutdown() {
        let dir = tempfile::tempdir().expect("temp dir");
        let backend = CountingBackend::succeeding();
        let (tx, rx) = watch::channel(false);
        let scheduler = Arc::new(ActionScheduler::new(
            vec![spec("notes", 0, &dir.path().join("notes.md"), WriteMode::Append)],
            backend,
            rx,
        ));

        let runner = Arc::clone(&scheduler);
        let handle = tokio::spawn(async move { runner.run().await });

        feed(&scheduler, "on air ");
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).expect("shutdown");

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler stops")
            .expect("task joins")
            .expect("run returns cleanly");
    }

    #[test]
    fn load_actions_reads_toml_and_defaults_names() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("Actions.toml");
        std::fs::write(
            &path,
            r#"
            [actions.research]
            prompt = "Find links for: %{discussion}"
            output_file = "research.md"
            interval_secs = 60

            [actions.quotes]
            name = "pull-quotes"
            prompt = "Pick a quote: %{discussion}"
            output_file = "quotes.md"
            mode = "overwrite"
            "#,
        )
        .expect("write actions file");

        let mut specs = load_actions(&path).expect("actions load");
        specs.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "pull-quotes");
        assert_eq!(specs[0].mode, WriteMode::Overwrite);
        assert_eq!(specs[0].interval_secs, 0);
        assert_eq!(specs[1].name, "research");
        assert_eq!(specs[1].interval_secs, 60);
        assert_eq!(specs[1].mode, WriteMode::Append);
    }

    #[test]
    fn missing_actions_file_means_no_actions() {
        let specs = load_actions(Path::new("/definitely/not/Actions.toml")).expect("load");
        assert!(specs.is_empty());
    }
}
