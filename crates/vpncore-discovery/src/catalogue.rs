//! Discovery Catalogue Documents
//!
//! The versioned server and organization lists published by the
//! provisioning provider. Fetching them is an external concern; this
//! module only models and parses the signed JSON documents.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The two recognized catalogue document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    /// `server_list.json`
    ServerList,
    /// `organization_list.json`
    OrganizationList,
}

impl DocumentKind {
    /// Parse from the canonical file name, `None` for anything else.
    pub fn from_file_name(name: &str) -> Option<Self> {
        match name {
            "server_list.json" => Some(DocumentKind::ServerList),
            "organization_list.json" => Some(DocumentKind::OrganizationList),
            _ => None,
        }
    }

    /// The canonical file name.
    pub fn file_name(self) -> &'static str {
        match self {
            DocumentKind::ServerList => "server_list.json",
            DocumentKind::OrganizationList => "organization_list.json",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// A display name: upstream publishes either a plain string or a map
/// from language tags to names. Always normalized to a map, with plain
/// strings filed under `en`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisplayName(pub HashMap<String, String>);

impl DisplayName {
    /// Best-effort English name, falling back to any entry.
    pub fn preferred(&self) -> Option<&str> {
        self.0
            .get("en")
            .or_else(|| self.0.values().next())
            .map(String::as_str)
    }
}

impl<'de> Deserialize<'de> for DisplayName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Map(HashMap<String, String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(name) => DisplayName(HashMap::from([("en".to_string(), name)])),
            Raw::Map(map) => DisplayName(map),
        })
    }
}

/// One entry of the server list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoServer {
    /// Base URL, the server's identifier.
    pub base_url: String,
    /// Localized display names.
    #[serde(default)]
    pub display_name: DisplayName,
    /// `secure_internet` or `institute_access`.
    #[serde(rename = "server_type", default)]
    pub server_type: String,
    /// Country code for secure internet servers, e.g. `nl`.
    #[serde(default)]
    pub country_code: Option<String>,
}

/// One entry of the organization list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoOrganization {
    /// Organization identifier.
    pub org_id: String,
    /// Localized display names.
    #[serde(default)]
    pub display_name: DisplayName,
    /// The organization's secure internet home server, if any.
    #[serde(default)]
    pub secure_internet_home: Option<String>,
}

/// The versioned `server_list.json` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerList {
    /// Monotonically increasing document version (a UNIX timestamp).
    #[serde(rename = "v")]
    pub version: u64,
    /// The servers, omitted upstream when empty.
    #[serde(rename = "server_list", default)]
    pub list: Vec<DiscoServer>,
}

/// The versioned `organization_list.json` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationList {
    /// Monotonically increasing document version (a UNIX timestamp).
    #[serde(rename = "v")]
    pub version: u64,
    /// The organizations, omitted upstream when empty.
    #[serde(rename = "organization_list", default)]
    pub list: Vec<DiscoOrganization>,
}

/// A parsed catalogue of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Catalogue {
    Servers(ServerList),
    Organizations(OrganizationList),
}

impl Catalogue {
    /// Parse `document` as the given kind. One exhaustive match from
    /// kind to structure; there is no duck typing on the payload.
    pub fn parse(kind: DocumentKind, document: &[u8]) -> Result<Self, CatalogueError> {
        Ok(match kind {
            DocumentKind::ServerList => Catalogue::Servers(serde_json::from_slice(document)?),
            DocumentKind::OrganizationList => {
                Catalogue::Organizations(serde_json::from_slice(document)?)
            }
        })
    }

    /// The document kind this catalogue was parsed as.
    pub fn kind(&self) -> DocumentKind {
        match self {
            Catalogue::Servers(_) => DocumentKind::ServerList,
            Catalogue::Organizations(_) => DocumentKind::OrganizationList,
        }
    }

    /// The document version.
    pub fn version(&self) -> u64 {
        match self {
            Catalogue::Servers(s) => s.version,
            Catalogue::Organizations(o) => o.version,
        }
    }
}

/// Catalogue parse failures.
#[derive(Debug, thiserror::Error)]
pub enum CatalogueError {
    #[error("malformed catalogue document: {0}")]
    Parse(#[from] serde_json::Error),
}
