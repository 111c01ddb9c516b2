//! Discovery Front Door
//!
//! Ties the verifier, the trusted key set and the rollback watermark
//! together: hand it the raw bytes of a catalogue document and its
//! signature file, get back the parsed catalogue, with the watermark
//! advanced only on success.

use crate::catalogue::{Catalogue, CatalogueError, DocumentKind};
use crate::keys::TrustedKeys;
use crate::verify::{VerifyError, verify};
use crate::watermark::{WatermarkError, WatermarkStore};
use std::collections::HashMap;
use tracing::{info, warn};

/// Rollback-protected catalogue acceptance.
pub struct Discovery {
    keys: TrustedKeys,
    store: WatermarkStore,
    /// Last accepted document version per kind, session-local.
    versions: HashMap<DocumentKind, u64>,
}

impl Discovery {
    /// Create with an explicit key set and watermark store.
    pub fn new(keys: TrustedKeys, store: WatermarkStore) -> Self {
        Self {
            keys,
            store,
            versions: HashMap::new(),
        }
    }

    /// Verify and parse one catalogue document.
    ///
    /// Order of operations is part of the contract: the watermark is
    /// read before verification and committed only after both the
    /// signature and the document version checked out.
    pub fn verify_and_parse(
        &mut self,
        kind: DocumentKind,
        document: &[u8],
        signature: &str,
    ) -> Result<Catalogue, DiscoveryError> {
        let min_sign_time = self.store.min_sign_time(kind);
        let sign_time = verify(signature, document, kind.file_name(), min_sign_time, &self.keys)
            .inspect_err(|e| warn!("rejected {kind} signature: {e}"))?;

        let catalogue = Catalogue::parse(kind, document)?;

        let previous = self.versions.get(&kind).copied().unwrap_or(0);
        if catalogue.version() < previous {
            warn!(
                "rejected {kind}: version {} rolls back past {previous}",
                catalogue.version()
            );
            return Err(DiscoveryError::VersionRollback {
                got: catalogue.version(),
                seen: previous,
            });
        }

        self.versions.insert(kind, catalogue.version());
        self.store.commit(kind, sign_time.max(min_sign_time))?;
        info!(
            "accepted {kind} version {} signed at {sign_time}",
            catalogue.version()
        );
        Ok(catalogue)
    }

    /// The current minimum acceptable signing time for `kind`.
    pub fn min_sign_time(&self, kind: DocumentKind) -> u64 {
        self.store.min_sign_time(kind)
    }
}

/// Failures while accepting a catalogue document.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Parse(#[from] CatalogueError),

    #[error("document version {got} is older than previously accepted {seen}")]
    VersionRollback { got: u64, seen: u64 },

    #[error(transparent)]
    Watermark(#[from] WatermarkError),
}
