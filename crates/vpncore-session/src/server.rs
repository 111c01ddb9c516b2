//! Provisioning Entities
//!
//! The value types a provisioning flow produces: servers and their
//! profiles, OAuth tokens, and the materialized tunnel configuration.
//! A [`VpnConfig`] is handed to the caller exactly once per successful
//! config request and never retained by the core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported tunnel protocols.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Unknown,
    OpenVpn,
    WireGuard,
}

impl Protocol {
    /// Parse the wire form, `Unknown` for anything unrecognized.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "openvpn" => Protocol::OpenVpn,
            "wireguard" => Protocol::WireGuard,
            _ => Protocol::Unknown,
        }
    }

    /// The wire string.
    pub fn as_wire(self) -> &'static str {
        match self {
            Protocol::OpenVpn => "openvpn",
            Protocol::WireGuard => "wireguard",
            Protocol::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One VPN profile a server offers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile identifier, passed back when requesting a config.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Whether this profile routes all traffic through the tunnel.
    pub default_gateway: bool,
}

/// The profiles of a server plus the currently selected one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileList {
    /// All profiles, in the server's order.
    pub profiles: Vec<Profile>,
    /// Index of the selected profile, if one was chosen.
    pub current: Option<usize>,
}

impl ProfileList {
    /// The currently selected profile, if any.
    pub fn current_profile(&self) -> Option<&Profile> {
        self.current.and_then(|i| self.profiles.get(i))
    }

    /// Look up a profile by id.
    pub fn find(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == id)
    }
}

/// A provisioned VPN server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Base URL or organization id, the server's identifier.
    pub identifier: String,
    /// Human-readable name.
    pub display_name: String,
    /// Known profiles, possibly empty before the first config request.
    #[serde(default)]
    pub profiles: ProfileList,
}

/// OAuth tokens for a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Bearer access token.
    pub access: String,
    /// Refresh token.
    pub refresh: String,
    /// UNIX time at which the access token expires.
    pub expires: i64,
}

/// A materialized tunnel configuration, owned by the caller on return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnConfig {
    /// The configuration text (OpenVPN config or WireGuard ini).
    pub config: String,
    /// Which protocol the configuration is for.
    pub protocol: Protocol,
    /// Refreshed tokens, when authorization was renewed along the way.
    #[serde(default)]
    pub token: Option<Token>,
}
