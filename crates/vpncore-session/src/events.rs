//! Transition Event Dispatch
//!
//! An explicit registration table mapping (state, phase) to an ordered
//! list of handlers. The FSM consults it on every transition: Leave
//! handlers for the old state, then Enter handlers for the new state,
//! then, if the transition was handled, Wait handlers which may block
//! until a cookie reply arrives.

use crate::payload::Payload;
use crate::state::StateId;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Which handler set runs, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Runs for the old state before the state commits. Must not block.
    Leave,
    /// Runs for the new state; decides whether the transition is handled.
    Enter,
    /// Runs for the new state after Enter; may block on a cookie reply.
    Wait,
}

/// What an Enter handler says about a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The handler accepted the transition.
    Handled,
    /// The handler does not apply to this transition.
    NotApplicable,
}

/// What a handler returns. Leave and Wait handlers' outcomes are
/// ignored; errors are surfaced from every phase.
pub type HandlerResult = Result<HandlerOutcome, Box<dyn std::error::Error + Send + Sync>>;

/// A registered handler: called with the state on the other side of the
/// transition and the payload.
pub type Handler = Arc<dyn Fn(StateId, &Payload) -> HandlerResult + Send + Sync>;

/// Identifies one registration, for [`Dispatcher::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// The (state, phase) → handlers table.
#[derive(Default)]
pub struct Dispatcher {
    table: Mutex<HashMap<(StateId, Phase), Vec<(HandlerId, Handler)>>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, appended after existing ones for the same
    /// (state, phase). Returns the id to deregister with.
    pub fn on<F>(&self, state: StateId, phase: Phase, handler: F) -> HandlerId
    where
        F: Fn(StateId, &Payload) -> HandlerResult + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry((state, phase))
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a registration. Returns whether it was present.
    pub fn off(&self, state: StateId, phase: Phase, id: HandlerId) -> bool {
        let mut table = self.lock();
        let Some(handlers) = table.get_mut(&(state, phase)) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            table.remove(&(state, phase));
        }
        removed
    }

    /// Run all handlers for (state, phase) in registration order,
    /// passing `other` (the state across the transition) and `payload`.
    ///
    /// Returns whether at least one handler reported
    /// [`HandlerOutcome::Handled`]; with no registrations this is
    /// `false`. Stops at the first failing or panicking handler.
    pub(crate) fn run(
        &self,
        state: StateId,
        phase: Phase,
        other: StateId,
        payload: &Payload,
    ) -> Result<bool, DispatchError> {
        // Snapshot outside the lock so handlers can call on/off.
        let handlers: Vec<Handler> = {
            let table = self.lock();
            match table.get(&(state, phase)) {
                Some(hs) => hs.iter().map(|(_, h)| h.clone()).collect(),
                None => return Ok(false),
            }
        };

        debug!("running {} {phase:?} handler(s) for {state}", handlers.len());
        let mut handled = false;
        for handler in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(other, payload)))
                .map_err(|_| DispatchError::HandlerPanicked { state, phase })?
                .map_err(|source| DispatchError::HandlerFailed {
                    state,
                    phase,
                    message: source.to_string(),
                })?;
            handled |= outcome == HandlerOutcome::Handled;
        }
        Ok(handled)
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<(StateId, Phase), Vec<(HandlerId, Handler)>>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handler invocation failures. The FSM reports these without rolling
/// back the committed state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("a {phase:?} handler for {state} failed: {message}")]
    HandlerFailed {
        state: StateId,
        phase: Phase,
        message: String,
    },

    #[error("a {phase:?} handler for {state} panicked")]
    HandlerPanicked { state: StateId, phase: Phase },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn accept(_: StateId, _: &Payload) -> HandlerResult {
        Ok(HandlerOutcome::Handled)
    }

    #[test]
    fn test_no_handlers_is_unhandled() {
        let dispatcher = Dispatcher::new();
        let ran = dispatcher
            .run(StateId::Main, Phase::Enter, StateId::Deregistered, &Payload::None)
            .unwrap();
        assert!(!ran);
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let dispatcher = Dispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            dispatcher.on(StateId::Main, Phase::Enter, move |_, _| {
                order.lock().unwrap().push(tag);
                Ok(HandlerOutcome::Handled)
            });
        }

        dispatcher
            .run(StateId::Main, Phase::Enter, StateId::Deregistered, &Payload::None)
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_not_applicable_does_not_handle() {
        let dispatcher = Dispatcher::new();
        dispatcher.on(StateId::Main, Phase::Enter, |_, _| {
            Ok(HandlerOutcome::NotApplicable)
        });

        let handled = dispatcher
            .run(StateId::Main, Phase::Enter, StateId::Deregistered, &Payload::None)
            .unwrap();
        assert!(!handled);

        // One applicable handler is enough.
        dispatcher.on(StateId::Main, Phase::Enter, accept);
        let handled = dispatcher
            .run(StateId::Main, Phase::Enter, StateId::Deregistered, &Payload::None)
            .unwrap();
        assert!(handled);
    }

    #[test]
    fn test_off_removes_only_that_registration() {
        let dispatcher = Dispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = count.clone();
        let keep = dispatcher.on(StateId::Connected, Phase::Enter, move |_, _| {
            c1.fetch_add(1, Ordering::Relaxed);
            Ok(HandlerOutcome::Handled)
        });
        let c2 = count.clone();
        let drop_me = dispatcher.on(StateId::Connected, Phase::Enter, move |_, _| {
            c2.fetch_add(10, Ordering::Relaxed);
            Ok(HandlerOutcome::Handled)
        });

        assert!(dispatcher.off(StateId::Connected, Phase::Enter, drop_me));
        assert!(!dispatcher.off(StateId::Connected, Phase::Enter, drop_me));

        dispatcher
            .run(StateId::Connected, Phase::Enter, StateId::Connecting, &Payload::None)
            .unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 1);

        assert!(dispatcher.off(StateId::Connected, Phase::Enter, keep));
        let ran = dispatcher
            .run(StateId::Connected, Phase::Enter, StateId::Connecting, &Payload::None)
            .unwrap();
        assert!(!ran);
    }

    #[test]
    fn test_handler_error_and_panic_are_typed() {
        let dispatcher = Dispatcher::new();
        dispatcher.on(StateId::Main, Phase::Enter, |_, _| Err("boom".into()));

        let err = dispatcher
            .run(StateId::Main, Phase::Enter, StateId::Deregistered, &Payload::None)
            .unwrap_err();
        assert!(matches!(err, DispatchError::HandlerFailed { .. }));

        let dispatcher = Dispatcher::new();
        dispatcher.on(StateId::Main, Phase::Enter, |_, _| panic!("bad handler"));
        let err = dispatcher
            .run(StateId::Main, Phase::Enter, StateId::Deregistered, &Payload::None)
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::HandlerPanicked {
                state: StateId::Main,
                phase: Phase::Enter,
            }
        );
    }
}
