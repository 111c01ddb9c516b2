//! Session States
//!
//! The provisioning/connection lifecycle as a fixed state graph. The
//! legality table is static: a transition is only accepted if the
//! destination is listed for the current state, with `Deregistered`
//! (teardown) reachable from everywhere.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One node of the session lifecycle graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateId {
    /// No session is registered.
    Deregistered,
    /// The main screen: a provider may or may not be configured yet.
    Main,
    /// A secure internet server was picked but needs a location.
    AskLocation,
    /// The user is searching for a provider in the UI.
    SearchServer,
    /// Provider details are being loaded.
    LoadingServer,
    /// A provider has been chosen.
    ChosenServer,
    /// OAuth authorization is in progress.
    OAuthStarted,
    /// Authorization finished; tokens are available.
    Authorized,
    /// A tunnel configuration is being requested.
    RequestConfig,
    /// The caller must pick a profile.
    AskProfile,
    /// A configuration exists but no tunnel is up.
    Disconnected,
    /// The OS is tearing the tunnel down.
    Disconnecting,
    /// The OS is establishing the tunnel.
    Connecting,
    /// The tunnel is up.
    Connected,
}

impl StateId {
    /// Destinations that are legal from this state, teardown aside.
    pub fn allowed(self) -> &'static [StateId] {
        use StateId::*;
        match self {
            Deregistered => &[Main],
            Main => &[
                Main, // reload the provider list
                LoadingServer,
                ChosenServer,
                SearchServer,
                Connected,
                AskLocation,
            ],
            SearchServer => &[LoadingServer, Main],
            AskLocation => &[ChosenServer, Main, SearchServer],
            LoadingServer => &[ChosenServer, AskLocation, Main],
            ChosenServer => &[Authorized, OAuthStarted],
            OAuthStarted => &[Authorized, Main, SearchServer],
            Authorized => &[OAuthStarted, RequestConfig, Main],
            RequestConfig => &[AskProfile, Disconnected, Main, OAuthStarted],
            AskProfile => &[Disconnected, Main, SearchServer],
            Disconnected => &[Connecting, RequestConfig, Main, OAuthStarted],
            Disconnecting => &[Disconnected],
            Connecting => &[Disconnected, Connected],
            Connected => &[Disconnecting],
        }
    }

    /// Whether a transition to `to` is legal from here.
    ///
    /// `Deregistered` is always reachable: it is the cancel/teardown
    /// path. Everything else, including self-loops, must be listed in
    /// the table.
    pub fn can_transition(self, to: StateId) -> bool {
        to == StateId::Deregistered || self.allowed().contains(&to)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateId::Deregistered => "Deregistered",
            StateId::Main => "Main",
            StateId::AskLocation => "Ask_Location",
            StateId::SearchServer => "Search_Server",
            StateId::LoadingServer => "Loading_Server",
            StateId::ChosenServer => "Chosen_Server",
            StateId::OAuthStarted => "OAuth_Started",
            StateId::Authorized => "Authorized",
            StateId::RequestConfig => "Request_Config",
            StateId::AskProfile => "Ask_Profile",
            StateId::Disconnected => "Disconnected",
            StateId::Disconnecting => "Disconnecting",
            StateId::Connecting => "Connecting",
            StateId::Connected => "Connected",
        };
        f.write_str(name)
    }
}
