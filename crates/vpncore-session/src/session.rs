//! Session Handle
//!
//! One owned value per provisioning session, tying together the state
//! machine, the handler table, the cookie jar and the failover monitor.
//! Every boundary call goes through the handle; there is no global
//! registry of live sessions.

use crate::cookie::{CookieError, CookieId, CookieJar};
use crate::events::{HandlerResult, HandlerId, Phase};
use crate::failover::{DroppedMonitor, FailoverError, Prober, Verdict};
use crate::fsm::{FsmError, SessionFsm};
use crate::payload::Payload;
use crate::state::StateId;
use std::io;
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// A provisioning session. Cheap to share behind an `Arc`; all methods
/// take `&self` and are safe to call from any thread.
pub struct Session {
    fsm: SessionFsm,
    jar: CookieJar,
    monitor: DroppedMonitor,
    failover_cookie: Mutex<Option<CookieId>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A fresh session in the `Deregistered` state.
    pub fn new() -> Self {
        Self::with_monitor(DroppedMonitor::default())
    }

    /// A session with a custom failover monitor configuration.
    pub fn with_monitor(monitor: DroppedMonitor) -> Self {
        info!("new session registered");
        Self {
            fsm: SessionFsm::new(StateId::Deregistered),
            jar: CookieJar::new(),
            monitor,
            failover_cookie: Mutex::new(None),
        }
    }

    // --- FSM surface ---

    /// The current lifecycle state.
    pub fn current_state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// Whether the session is in `state`.
    pub fn in_state(&self, state: StateId) -> bool {
        self.fsm.in_state(state)
    }

    /// Request a transition; see [`SessionFsm::transition`].
    pub fn transition(&self, new_state: StateId, payload: Payload) -> Result<bool, FsmError> {
        self.fsm.transition(new_state, payload)
    }

    /// Request a transition that the caller must handle; see
    /// [`SessionFsm::transition_required`].
    pub fn transition_required(
        &self,
        new_state: StateId,
        payload: Payload,
    ) -> Result<(), FsmError> {
        self.fsm.transition_required(new_state, payload)
    }

    /// Register a transition handler.
    pub fn on<F>(&self, state: StateId, phase: Phase, handler: F) -> HandlerId
    where
        F: Fn(StateId, &Payload) -> HandlerResult + Send + Sync + 'static,
    {
        self.fsm.dispatcher().on(state, phase, handler)
    }

    /// Deregister a transition handler.
    pub fn off(&self, state: StateId, phase: Phase, id: HandlerId) -> bool {
        self.fsm.dispatcher().off(state, phase, id)
    }

    // --- cookie surface ---

    /// Open a cookie for a new cancellable operation.
    pub fn cookie_new(&self) -> CookieId {
        self.jar.new_cookie()
    }

    /// Deliver external data (e.g. a chosen profile id) to the
    /// operation blocked on this cookie.
    pub fn cookie_reply(&self, id: CookieId, data: impl Into<String>) -> Result<(), CookieError> {
        self.jar.reply(id, data)
    }

    /// Cancel the operation behind this cookie.
    pub fn cookie_cancel(&self, id: CookieId) -> Result<(), CookieError> {
        self.jar.cancel(id)
    }

    /// Drop a cookie's bookkeeping.
    pub fn cookie_delete(&self, id: CookieId) -> Result<(), CookieError> {
        self.jar.delete(id)
    }

    /// The jar itself, for Wait handlers that need to block on a reply.
    pub fn cookies(&self) -> &CookieJar {
        &self.jar
    }

    // --- failover surface ---

    /// Run the failover monitor against the current connection.
    ///
    /// Blocks the calling thread until a verdict, a probe/sampling
    /// failure, or a [`Session::cancel_failover`] call from another
    /// thread. Only one monitor runs at a time.
    pub fn start_failover<P, S>(
        &self,
        gateway: IpAddr,
        mtu: u16,
        prober: &mut P,
        sample_rx: S,
    ) -> Result<Verdict, FailoverError>
    where
        P: Prober + ?Sized,
        S: FnMut() -> io::Result<u64>,
    {
        let cookie = self.jar.new_cookie();
        {
            let mut slot = self.failover_slot();
            if slot.is_some() {
                let _ = self.jar.delete(cookie);
                return Err(FailoverError::AlreadyRunning);
            }
            *slot = Some(cookie);
        }

        // The jar entry exists until we delete it below.
        let cancel = self
            .jar
            .cancelled(cookie)
            .expect("freshly opened cookie is in the jar");
        let verdict = self.monitor.start(&cancel, gateway, mtu, prober, sample_rx);

        *self.failover_slot() = None;
        let _ = self.jar.delete(cookie);
        verdict
    }

    /// Cancel a running failover monitor. A no-op when none is running.
    pub fn cancel_failover(&self) -> Result<(), CookieError> {
        let slot = self.failover_slot();
        match *slot {
            Some(cookie) => self.jar.cancel(cookie),
            None => Ok(()),
        }
    }

    fn failover_slot(&self) -> std::sync::MutexGuard<'_, Option<CookieId>> {
        self.failover_cookie
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
