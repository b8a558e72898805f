//! Player events and a small typed event bus
//!
//! Listeners run synchronously, in the order they were registered. The bus
//! is a cheap shared handle: cloning it yields another handle onto the same
//! listener list, which is how a launch hands its bus back to the caller.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;

use crate::sim::{Collision, SearchStats};

/// Whether a launch cleared the track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchOutcome {
    Success,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PlayerEvent {
    Start(LaunchOutcome),
    Finish(LaunchOutcome),
    /// Collisions of the frames just played
    Collision(Vec<Collision>),
    /// A launch velocity was found
    Find(SearchStats),
    /// Prize section index the ball landed in
    Reward(usize),
    /// No admissible velocity; the round was aborted
    Error,
    /// The queued ball is loaded and can be launched
    Ready,
    /// Spring compression length changed
    Compress(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Finish,
    Collision,
    Find,
    Reward,
    Error,
    Ready,
    Compress,
}

impl PlayerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PlayerEvent::Start(_) => EventKind::Start,
            PlayerEvent::Finish(_) => EventKind::Finish,
            PlayerEvent::Collision(_) => EventKind::Collision,
            PlayerEvent::Find(_) => EventKind::Find,
            PlayerEvent::Reward(_) => EventKind::Reward,
            PlayerEvent::Error => EventKind::Error,
            PlayerEvent::Ready => EventKind::Ready,
            PlayerEvent::Compress(_) => EventKind::Compress,
        }
    }
}

/// Handle returned by `on`/`once`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Rc<dyn Fn(&PlayerEvent)>;

#[derive(Clone)]
struct Listener {
    id: ListenerId,
    /// `None` listens to every event
    kind: Option<EventKind>,
    once: bool,
    callback: Callback,
}

#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Rc<RefCell<Vec<Listener>>>,
    next_id: Rc<Cell<u64>>,
}

/// Event bus scoped to a single launch
pub type BallEvents = EventBus;

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, kind: Option<EventKind>, once: bool, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push(Listener {
            id,
            kind,
            once,
            callback,
        });
        id
    }

    pub fn on(&self, kind: EventKind, callback: impl Fn(&PlayerEvent) + 'static) -> ListenerId {
        self.register(Some(kind), false, Rc::new(callback))
    }

    pub fn once(&self, kind: EventKind, callback: impl Fn(&PlayerEvent) + 'static) -> ListenerId {
        self.register(Some(kind), true, Rc::new(callback))
    }

    /// Listen to every event kind
    pub fn on_any(&self, callback: impl Fn(&PlayerEvent) + 'static) -> ListenerId {
        self.register(None, false, Rc::new(callback))
    }

    /// Remove a listener; returns whether it was registered
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Deliver `event` to its listeners in registration order
    ///
    /// Listeners may register or remove listeners while being called; those
    /// changes apply from the next emit.
    pub fn emit(&self, event: &PlayerEvent) {
        let kind = event.kind();
        let matching: Vec<Listener> = {
            let mut listeners = self.listeners.borrow_mut();
            let matching: Vec<Listener> = listeners
                .iter()
                .filter(|l| l.kind.is_none_or(|k| k == kind))
                .cloned()
                .collect();
            listeners.retain(|l| !(l.once && l.kind == Some(kind)));
            matching
        };
        for listener in matching {
            (listener.callback)(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(bus: &EventBus, kind: EventKind, log: &Rc<RefCell<Vec<String>>>, tag: &str) -> ListenerId {
        let log = Rc::clone(log);
        let tag = tag.to_string();
        bus.on(kind, move |_| log.borrow_mut().push(tag.clone()))
    }

    #[test]
    fn test_registration_order() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        recorder(&bus, EventKind::Ready, &log, "a");
        recorder(&bus, EventKind::Ready, &log, "b");
        recorder(&bus, EventKind::Error, &log, "x");
        bus.emit(&PlayerEvent::Ready);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn test_once_and_off() {
        let bus = EventBus::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        bus.once(EventKind::Reward, move |_| c.set(c.get() + 1));
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = recorder(&bus, EventKind::Reward, &log, "r");

        bus.emit(&PlayerEvent::Reward(3));
        bus.emit(&PlayerEvent::Reward(3));
        assert_eq!(count.get(), 1);
        assert_eq!(log.borrow().len(), 2);

        assert!(bus.off(id));
        assert!(!bus.off(id));
        bus.emit(&PlayerEvent::Reward(3));
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_reentrant_emit() {
        let bus = EventBus::new();
        let inner = bus.clone();
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        bus.on(EventKind::Start, move |_| inner.emit(&PlayerEvent::Ready));
        bus.on(EventKind::Ready, move |_| s.set(s.get() + 1));
        bus.emit(&PlayerEvent::Start(LaunchOutcome::Success));
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&PlayerEvent::Start(LaunchOutcome::Fail)).unwrap();
        assert_eq!(json, r#"{"event":"start","data":"fail"}"#);
    }
}
