// crates/signal/src/lib.rs

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use castmate_core::CastmateResult;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type Subscriber<T> = Box<dyn Fn(&T) -> CastmateResult<()> + Send + Sync>;

/// What `trigger` does when the FIFO is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Discard the oldest enqueued payload to make room. Publishers
    /// never wait.
    DropOldest,
    /// Apply backpressure: the publisher waits for the dispatcher to
    /// drain a slot.
    Block,
}

#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    subscribers: RwLock<Vec<Subscriber<T>>>,
    ready: Notify,
    space: Notify,
    closed: AtomicBool,
    config: SignalConfig,
}

/// Ordered publish/subscribe dispatcher.
///
/// Payloads are enqueued on a bounded FIFO and dispatched serially by a
/// dedicated task; for each payload every subscriber is invoked
/// synchronously in registration order, so any state built from the
/// stream sees it in exactly the order it was published.
pub struct PodSignal<T> {
    shared: Arc<Shared<T>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Default for PodSignal<T> {
    fn default() -> Self {
        Self::new(SignalConfig::default())
    }
}

impl<T: Send + 'static> PodSignal<T> {
    /// Creates the bus and starts its dispatch loop. Must be called from
    /// within a tokio runtime.
    pub fn new(config: SignalConfig) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(config.capacity)),
            subscribers: RwLock::new(Vec::new()),
            ready: Notify::new(),
            space: Notify::new(),
            closed: AtomicBool::new(false),
            config,
        });

        let dispatch = tokio::spawn(Self::dispatch_loop(Arc::clone(&shared)));

        Self {
            shared,
            dispatch: Mutex::new(Some(dispatch)),
        }
    }

    /// Registers a callback. Callbacks fire in subscription order and
    /// only for payloads triggered after the subscription.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&T) -> CastmateResult<()> + Send + Sync + 'static,
    {
        self.shared.subscribers.write().push(Box::new(callback));
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.read().len()
    }

    /// Enqueues a payload for dispatch. With the default `DropOldest`
    /// policy this never waits on a slow subscriber; with `Block` it
    /// waits for queue space.
    pub async fn trigger(&self, payload: T) {
        if self.shared.closed.load(Ordering::SeqCst) {
            debug!("Ignoring trigger on closed signal");
            return;
        }

        loop {
            {
                let mut queue = self.shared.queue.lock();
                if queue.len() < self.shared.config.capacity {
                    queue.push_back(payload);
                    drop(queue);
                    self.shared.ready.notify_one();
                    return;
                }

                if self.shared.config.overflow == OverflowPolicy::DropOldest {
                    queue.pop_front();
                    queue.push_back(payload);
                    drop(queue);
                    warn!("Signal queue full, dropped oldest payload");
                    self.shared.ready.notify_one();
                    return;
                }
            }

            // Block policy: wait for the dispatcher to drain a slot.
            self.shared.space.notified().await;
            if self.shared.closed.load(Ordering::SeqCst) {
                debug!("Signal closed while waiting for queue space");
                return;
            }
        }
    }

    /// Stops accepting payloads, drains everything already enqueued and
    /// waits for the dispatch loop to finish. Idempotent.
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.ready.notify_one();
        self.shared.space.notify_waiters();

        let handle = self.dispatch.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "Signal dispatch task ended abnormally");
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    async fn dispatch_loop(shared: Arc<Shared<T>>) {
        loop {
            let payload = shared.queue.lock().pop_front();

            match payload {
                Some(payload) => {
                    {
                        let subscribers = shared.subscribers.read();
                        for (index, subscriber) in subscribers.iter().enumerate() {
                            if let Err(err) = subscriber(&payload) {
                                warn!(
                                    subscriber = index,
                                    error = %err,
                                    "Subscriber failed, continuing dispatch"
                                );
                            }
                        }
                    }
                    shared.space.notify_one();
                }
                None => {
                    if shared.closed.load(Ordering::SeqCst) {
                        break;
                    }
                    shared.ready.notified().await;
                }
            }
        }
        debug!("Signal dispatch loop terminated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castmate_core::CastmateError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    async fn settle<T: Send + 'static>(signal: &PodSignal<T>) {
        for _ in 0..100 {
            if signal.pending() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // One extra yield so the in-flight payload finishes dispatching.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn subscribers_fire_in_subscription_order() {
        let signal = PodSignal::new(SignalConfig::default());
        let order = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            let order = Arc::clone(&order);
            signal.subscribe(move |_: &u32| {
                order.lock().push(id);
                Ok(())
            });
        }

        signal.trigger(7).await;
        settle(&signal).await;

        assert_eq!(*order.lock(), vec![0, 1, 2]);
        signal.close().await;
    }

    #[tokio::test]
    async fn payloads_are_dispatched_in_trigger_order() {
        let signal = PodSignal::new(SignalConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        signal.subscribe(move |value: &u32| {
            sink.lock().push(*value);
            Ok(())
        });

        for value in 0..50 {
            signal.trigger(value).await;
        }
        settle(&signal).await;

        assert_eq!(*seen.lock(), (0..50).collect::<Vec<_>>());
        signal.close().await;
    }

    #[tokio::test]
    async fn earlier_triggers_are_not_replayed_to_new_subscribers() {
        let signal = PodSignal::new(SignalConfig::default());

        signal.trigger(1).await;
        settle(&signal).await;

        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        signal.subscribe(move |_: &u32| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        signal.trigger(2).await;
        settle(&signal).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        signal.close().await;
    }

    #[tokio::test]
    async fn a_failing_subscriber_does_not_break_the_others() {
        let signal = PodSignal::new(SignalConfig::default());
        let delivered = Arc::new(AtomicUsize::new(0));

        signal.subscribe(|_: &u32| Err(CastmateError::Unknown("boom".to_string())));
        let sink = Arc::clone(&delivered);
        signal.subscribe(move |_: &u32| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        signal.trigger(1).await;
        signal.trigger(2).await;
        settle(&signal).await;

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        signal.close().await;
    }

    #[tokio::test]
    async fn drop_oldest_keeps_the_newest_payloads() {
        let signal = PodSignal::new(SignalConfig {
            capacity: 2,
            overflow: OverflowPolicy::DropOldest,
        });
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        signal.subscribe(move |value: &u32| {
            sink.lock().push(*value);
            Ok(())
        });

        // On the current-thread test runtime none of these enqueues
        // yields, so the dispatcher only runs once all ten are in and
        // the two-slot queue has shed everything but the newest pair.
        for value in 0..10 {
            signal.trigger(value).await;
        }
        settle(&signal).await;

        assert_eq!(*seen.lock(), vec![8, 9]);
        signal.close().await;
    }

    #[tokio::test]
    async fn close_drains_enqueued_payloads() {
        let signal = PodSignal::new(SignalConfig::default());
        let count = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&count);
        signal.subscribe(move |_: &u32| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        for value in 0..20 {
            signal.trigger(value).await;
        }
        signal.close().await;

        assert_eq!(count.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn triggers_after_close_are_ignored() {
        let signal = PodSignal::new(SignalConfig::default());
        let count = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&count);
        signal.subscribe(move |_: &u32| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        signal.close().await;
        signal.trigger(1).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
