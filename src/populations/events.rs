//! Synchronous publish/subscribe notifications for generation lifecycle
//! milestones. External collaborators (persistence, run tracking, UI)
//! observe the engine through this bus without the engine knowing them.

use ahash::AHashMap;

/// The closed vocabulary of lifecycle events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Every genome's fitness has been written for this generation.
    Evaluated,
    /// Selection and culling are done; variation operators are about to
    /// run. A hook point for releasing resources tied to the
    /// pre-operator state.
    StartOperators,
    /// All variation operators have run.
    FinishOperators,
    /// The generation cycle completed and the new population is in
    /// place. Carries the completed-generation count.
    Evolved,
}

/// Payload delivered to listeners.
#[derive(Clone, Copy, Debug)]
pub struct GenerationEvent {
    pub kind: EventKind,
    pub generation: usize,
    pub population_size: usize,
    pub species_count: usize,
}

/// A lifecycle-event observer.
///
/// Implemented for free by any `FnMut(&GenerationEvent)` closure.
pub trait EventListener {
    fn notify(&mut self, event: &GenerationEvent);
}

impl<F: FnMut(&GenerationEvent)> EventListener for F {
    fn notify(&mut self, event: &GenerationEvent) {
        self(event)
    }
}

/// Dispatches lifecycle events to registered listeners, synchronously
/// and in registration order, on the orchestrating thread.
#[derive(Default)]
pub struct EventManager {
    listeners: AHashMap<EventKind, Vec<Box<dyn EventListener>>>,
}

impl EventManager {
    pub fn new() -> EventManager {
        EventManager::default()
    }

    /// Registers a listener for one event kind.
    pub fn add_listener(&mut self, kind: EventKind, listener: impl EventListener + 'static) {
        self.listeners
            .entry(kind)
            .or_default()
            .push(Box::new(listener));
    }

    /// Returns how many listeners are registered for a kind.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    pub(crate) fn fire(&mut self, event: &GenerationEvent) {
        if let Some(listeners) = self.listeners.get_mut(&event.kind) {
            for listener in listeners.iter_mut() {
                listener.notify(event);
            }
        }
    }
}
