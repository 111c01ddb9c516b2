//! Session State Machine
//!
//! Gates which lifecycle operations are legal and drives the handler
//! phases on every transition: Leave handlers for the old state, the
//! state commit, Enter handlers for the new state, and, when handled,
//! Wait handlers that may block for external input.
//!
//! # Concurrency
//!
//! Transitions do not queue: while one is in flight (possibly blocked
//! in a Wait handler) a second concurrent call fails fast with
//! [`FsmError::TransitionInProgress`]. Cancellation travels through the
//! cookie jar, which no transition ever holds, so a blocked Wait can
//! always be unblocked from another thread. `current_state` stays
//! readable throughout.

use crate::events::{Dispatcher, DispatchError, Phase};
use crate::payload::Payload;
use crate::state::StateId;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// The session state machine.
pub struct SessionFsm {
    current: Mutex<StateId>,
    in_flight: Mutex<()>,
    dispatcher: Dispatcher,
}

impl SessionFsm {
    /// A machine starting in `initial` with an empty handler table.
    pub fn new(initial: StateId) -> Self {
        Self {
            current: Mutex::new(initial),
            in_flight: Mutex::new(()),
            dispatcher: Dispatcher::new(),
        }
    }

    /// The current state.
    pub fn current_state(&self) -> StateId {
        *self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the machine is in `state`.
    pub fn in_state(&self, state: StateId) -> bool {
        self.current_state() == state
    }

    /// The handler registration table.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Attempt a transition to `new_state`.
    ///
    /// Returns whether the transition was handled: `Ok(false)` means no
    /// Enter handler accepted it, and from the caller's perspective the
    /// move is a logical no-op even though the state did change.
    ///
    /// The state commits before Enter handlers run and is never rolled
    /// back; a failing handler surfaces as [`FsmError::Dispatch`] with
    /// the new state already in place.
    pub fn transition(&self, new_state: StateId, payload: Payload) -> Result<bool, FsmError> {
        let Ok(_in_flight) = self.in_flight.try_lock() else {
            return Err(FsmError::TransitionInProgress);
        };

        let old_state = self.current_state();
        if !old_state.can_transition(new_state) {
            return Err(FsmError::InvalidTransition {
                from: old_state,
                to: new_state,
            });
        }

        debug!("transition {old_state} -> {new_state}");
        let leave = self.dispatcher.run(old_state, Phase::Leave, new_state, &payload);

        *self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = new_state;
        leave?;

        let handled = self
            .dispatcher
            .run(new_state, Phase::Enter, old_state, &payload)?;

        if handled {
            self.dispatcher
                .run(new_state, Phase::Wait, old_state, &payload)?;
        }

        Ok(handled)
    }

    /// Like [`SessionFsm::transition`], but an unhandled transition is
    /// an error. For moves the caller cannot proceed without.
    pub fn transition_required(
        &self,
        new_state: StateId,
        payload: Payload,
    ) -> Result<(), FsmError> {
        let old_state = self.current_state();
        if !self.transition(new_state, payload)? {
            return Err(FsmError::NotHandled {
                from: old_state,
                to: new_state,
            });
        }
        Ok(())
    }
}

/// Transition failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsmError {
    #[error("invalid transition attempt from '{from}' to '{to}'")]
    InvalidTransition { from: StateId, to: StateId },

    #[error("required transition from '{from}' to '{to}' was not handled")]
    NotHandled { from: StateId, to: StateId },

    #[error("another transition is already in progress")]
    TransitionInProgress,

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
