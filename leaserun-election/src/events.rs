//! Notifications raised by the election engine
//!
//! Handlers run synchronously on the engine's task. A slow handler delays the
//! engine itself, so anything expensive should be handed off (see the channel
//! adapter on [`ElectionHandler`] for `UnboundedSender<ElectionEvent>`).

use tokio::sync::mpsc::UnboundedSender;

/// Receiver of leadership notifications
pub trait ElectionHandler: Send + Sync {
    /// This participant became the leader
    fn on_started_leading(&self) {}

    /// This participant stopped leading. Fires once per run that started leading.
    fn on_stopped_leading(&self) {}

    /// A different holder identity was observed
    fn on_new_leader(&self, identity: &str) {
        let _ = identity;
    }
}

/// Handler that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl ElectionHandler for NoopHandler {}

/// Leadership notification as a value, for channel-based consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionEvent {
    StartedLeading,
    StoppedLeading,
    NewLeader(String),
}

impl ElectionHandler for UnboundedSender<ElectionEvent> {
    fn on_started_leading(&self) {
        let _ = self.send(ElectionEvent::StartedLeading);
    }

    fn on_stopped_leading(&self) {
        let _ = self.send(ElectionEvent::StoppedLeading);
    }

    fn on_new_leader(&self, identity: &str) {
        let _ = self.send(ElectionEvent::NewLeader(identity.to_string()));
    }
}

type Callback = Box<dyn Fn() + Send + Sync>;
type LeaderCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Handler assembled from closures
///
/// ```
/// use leaserun_election::{Callbacks, ElectionHandler};
///
/// let handler = Callbacks::new()
///     .with_started_leading(|| println!("leading"))
///     .with_new_leader(|id| println!("leader is {}", id));
/// handler.on_stopped_leading(); // not set, ignored
/// ```
#[derive(Default)]
pub struct Callbacks {
    started: Option<Callback>,
    stopped: Option<Callback>,
    new_leader: Option<LeaderCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_started_leading(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.started = Some(Box::new(f));
        self
    }

    pub fn with_stopped_leading(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.stopped = Some(Box::new(f));
        self
    }

    pub fn with_new_leader(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.new_leader = Some(Box::new(f));
        self
    }
}

impl ElectionHandler for Callbacks {
    fn on_started_leading(&self) {
        if let Some(f) = &self.started {
            f();
        }
    }

    fn on_stopped_leading(&self) {
        if let Some(f) = &self.stopped {
            f();
        }
    }

    fn on_new_leader(&self, identity: &str) {
        if let Some(f) = &self.new_leader {
            f(identity);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("started", &self.started.is_some())
            .field("stopped", &self.stopped.is_some())
            .field("new_leader", &self.new_leader.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    #[test]
    fn test_channel_adapter() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tx.on_new_leader("a");
        tx.on_started_leading();
        tx.on_stopped_leading();

        assert_eq!(rx.try_recv().unwrap(), ElectionEvent::NewLeader("a".to_string()));
        assert_eq!(rx.try_recv().unwrap(), ElectionEvent::StartedLeading);
        assert_eq!(rx.try_recv().unwrap(), ElectionEvent::StoppedLeading);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_adapter_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel::<ElectionEvent>();
        drop(rx);
        tx.on_started_leading();
    }

    #[test]
    fn test_callbacks() {
        let started = Arc::new(AtomicUsize::new(0));
        let leaders = Arc::new(Mutex::new(Vec::new()));

        let handler = Callbacks::new()
            .with_started_leading({
                let started = started.clone();
                move || {
                    started.fetch_add(1, Ordering::SeqCst);
                }
            })
            .with_new_leader({
                let leaders = leaders.clone();
                move |id| leaders.lock().unwrap().push(id.to_string())
            });

        handler.on_started_leading();
        handler.on_stopped_leading();
        handler.on_new_leader("b");

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(*leaders.lock().unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn test_callbacks_dispatch_through_handler_methods() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let handler = Callbacks::new().with_stopped_leading({
            let stopped = stopped.clone();
            move || {
                stopped.fetch_add(1, Ordering::SeqCst);
            }
        });

        handler.on_started_leading();
        handler.on_stopped_leading();
        handler.on_new_leader("a");

        let shared: Arc<dyn ElectionHandler> = Arc::new(handler);
        shared.on_stopped_leading();

        assert_eq!(stopped.load(Ordering::SeqCst), 2);
    }
}
