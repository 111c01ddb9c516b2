//! Transition Payloads
//!
//! Each state that carries data across a transition has exactly one
//! payload shape; [`Payload::decode`] is the single exhaustive match
//! from state to structured type, replacing any duck typing on the
//! payload bytes.

use crate::server::{ProfileList, Server};
use crate::state::StateId;
use serde::{Deserialize, Serialize};
use vpncore_discovery::ServerList;

/// Typed data attached to a transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// No data.
    #[default]
    None,
    /// Authorization URL to open in a browser (`OAuthStarted`).
    Url(String),
    /// The known provider catalogue (`Main`).
    Servers(ServerList),
    /// Selectable country codes (`AskLocation`).
    Locations(Vec<String>),
    /// Profiles to choose from (`AskProfile`).
    Profiles(ProfileList),
    /// The server a connection state refers to (`Disconnected`,
    /// `Disconnecting`, `Connecting`, `Connected`).
    Server(Server),
}

impl Payload {
    /// Decode raw payload bytes for a transition into `state`.
    ///
    /// Empty input is [`Payload::None`] for every state. The OAuth URL
    /// is plain UTF-8; everything else is JSON.
    pub fn decode(state: StateId, data: &[u8]) -> Result<Payload, PayloadError> {
        if data.is_empty() {
            return Ok(Payload::None);
        }
        match state {
            StateId::OAuthStarted => {
                let url = std::str::from_utf8(data)
                    .map_err(|_| PayloadError::NotUtf8 { state })?
                    .to_string();
                Ok(Payload::Url(url))
            }
            StateId::Main => Ok(Payload::Servers(Self::json(state, data)?)),
            StateId::AskLocation => Ok(Payload::Locations(Self::json(state, data)?)),
            StateId::AskProfile => Ok(Payload::Profiles(Self::json(state, data)?)),
            StateId::Disconnected
            | StateId::Disconnecting
            | StateId::Connecting
            | StateId::Connected => Ok(Payload::Server(Self::json(state, data)?)),
            StateId::Deregistered
            | StateId::SearchServer
            | StateId::LoadingServer
            | StateId::ChosenServer
            | StateId::Authorized
            | StateId::RequestConfig => Err(PayloadError::Unexpected { state }),
        }
    }

    fn json<'a, T: Deserialize<'a>>(state: StateId, data: &'a [u8]) -> Result<T, PayloadError> {
        serde_json::from_slice(data).map_err(|source| PayloadError::Malformed { state, source })
    }
}

/// Payload decode failures.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("malformed payload for {state}: {source}")]
    Malformed {
        state: StateId,
        source: serde_json::Error,
    },

    #[error("payload for {state} is not valid UTF-8")]
    NotUtf8 { state: StateId },

    #[error("{state} does not take a payload")]
    Unexpected { state: StateId },
}
