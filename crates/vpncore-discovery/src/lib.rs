//! vpncore-discovery - Rollback-Protected Catalogue Verification
//!
//! Verification and parsing of the signed discovery catalogues
//! (server and organization lists) a VPN provisioning client consumes.
//!
//! # Security
//!
//! - Ed25519 minisign-style signatures, legacy (`Ed`) and
//!   BLAKE2b-512 prehashed (`ED`) forms
//! - The algorithm tag is bound into the verified bytes, so a tag flip
//!   on an otherwise valid signature fails
//! - Rollback protection: a cryptographically valid but stale document
//!   is rejected against a durable per-kind signing-time watermark

mod catalogue;
mod discovery;
mod keys;
mod signature;
mod verify;
mod watermark;

pub use catalogue::{
    Catalogue, CatalogueError, DiscoOrganization, DiscoServer, DisplayName, DocumentKind,
    OrganizationList, ServerList,
};
pub use discovery::{Discovery, DiscoveryError};
pub use keys::TrustedKeys;
pub use signature::{
    KeyId, PublicKey, SignatureAlgorithm, SignatureContainer, SignatureError, TrustedComment,
};
pub use verify::{VerifyError, verify};
pub use watermark::{WatermarkError, WatermarkStore};
