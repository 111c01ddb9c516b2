//! vpncore-session - Client-Side Session Orchestration
//!
//! The session state machine a VPN provisioning client drives: a
//! fourteen-state lifecycle FSM with Leave/Enter/Wait handler phases,
//! per-state transition payloads, a cancellable cookie registry for
//! operations that block on external input, and a probe-based failover
//! monitor that decides whether an established tunnel still passes
//! traffic.
//!
//! [`Session`] is the root handle; one value per provisioning session.

mod cookie;
mod events;
mod failover;
mod fsm;
mod payload;
mod server;
mod session;
mod state;

pub use cookie::{CookieError, CookieId, CookieJar};
pub use events::{
    DispatchError, Dispatcher, Handler, HandlerId, HandlerOutcome, HandlerResult, Phase,
};
pub use failover::{
    DEFAULT_PROBE_BUDGET, DEFAULT_PROBE_INTERVAL, DroppedMonitor, FailoverError, MTU_OVERHEAD,
    Prober, Verdict,
};
pub use fsm::{FsmError, SessionFsm};
pub use payload::{Payload, PayloadError};
pub use server::{Profile, ProfileList, Protocol, Server, Token, VpnConfig};
pub use session::Session;
pub use state::StateId;
