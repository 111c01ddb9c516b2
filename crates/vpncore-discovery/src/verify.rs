//! Catalogue Signature Verification
//!
//! Rollback-protected verification of signed discovery documents. The
//! checks run in a fixed order so nothing about key or signature
//! validity leaks to a caller holding an unsupported document kind, and
//! the staleness (`TooOld`) verdict is only reachable with a signature
//! that is already cryptographically valid.
//!
//! The caller owns the rollback watermark: read it before calling
//! [`verify`] (as `min_sign_time`) and persist
//! `max(min_sign_time, returned sign time)` only after success. See
//! [`crate::watermark`].

use crate::catalogue::DocumentKind;
use crate::keys::TrustedKeys;
use crate::signature::{SignatureAlgorithm, SignatureContainer, TrustedComment};
use blake2::{Blake2b512, Digest};
use ed25519_dalek::Signature;
use tracing::debug;

/// Verify `signature` (four-line minisign container text) over `document`.
///
/// `expected_file_name` must be a recognized catalogue kind, see
/// [`DocumentKind`]. `min_sign_time` is the rollback watermark: a
/// signature older than it is rejected with [`VerifyError::TooOld`] even
/// though it is cryptographically valid.
///
/// On success, returns the signing timestamp from the trusted comment.
pub fn verify(
    signature: &str,
    document: &[u8],
    expected_file_name: &str,
    min_sign_time: u64,
    keys: &TrustedKeys,
) -> Result<u64, VerifyError> {
    // Kind gate runs before any parsing or crypto.
    let kind = DocumentKind::from_file_name(expected_file_name)
        .ok_or(VerifyError::UnknownExpectedFileName)?;

    let container = SignatureContainer::parse(signature).map_err(|e| {
        debug!("malformed signature container: {e}");
        VerifyError::InvalidSignature
    })?;

    let key = keys
        .find(container.key_id)
        .ok_or(VerifyError::InvalidSignatureUnknownKey)?;

    // The document signature covers what the tag declares.
    let sig = Signature::from_bytes(&container.signature);
    let valid = match container.algorithm {
        SignatureAlgorithm::Legacy => key.verifying_key().verify_strict(document, &sig),
        SignatureAlgorithm::Prehashed => {
            let digest = Blake2b512::digest(document);
            key.verifying_key().verify_strict(&digest, &sig)
        }
    };
    if valid.is_err() {
        return Err(VerifyError::InvalidSignature);
    }

    // The global signature covers the trusted comment and the full
    // decoded second line, so a flipped algorithm tag or spliced key id
    // also breaks here.
    let mut bound = Vec::with_capacity(container.trusted_comment.len() + 74);
    bound.extend_from_slice(container.trusted_comment.as_bytes());
    bound.extend_from_slice(&container.signed_block());
    let global = Signature::from_bytes(&container.global_signature);
    if key.verifying_key().verify_strict(&bound, &global).is_err() {
        return Err(VerifyError::InvalidSignature);
    }

    let trusted = TrustedComment::parse(&container.trusted_comment).map_err(|e| {
        debug!("malformed trusted comment: {e}");
        VerifyError::InvalidSignature
    })?;

    if trusted.file != kind.file_name() {
        debug!(
            "signature is for '{}', expected '{}'",
            trusted.file,
            kind.file_name()
        );
        return Err(VerifyError::InvalidSignature);
    }

    // Rollback protection, checked only after the signature is known good.
    if trusted.timestamp < min_sign_time {
        return Err(VerifyError::TooOld);
    }

    Ok(trusted.timestamp)
}

/// Verification failures, in the order the checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// The expected file name is not a recognized catalogue kind.
    #[error("unknown expected file name")]
    UnknownExpectedFileName,

    /// The container is malformed, the signature does not verify, or the
    /// trusted comment does not match the document it claims to sign.
    #[error("invalid signature")]
    InvalidSignature,

    /// No trusted key matches the signature's key id.
    #[error("signature was created with an unknown key")]
    InvalidSignatureUnknownKey,

    /// The signature is valid but older than the rollback watermark.
    #[error("signature timestamp is older than the rollback watermark")]
    TooOld,
}

impl VerifyError {
    /// Stable numeric code for the foreign-function boundary.
    pub fn code(self) -> u8 {
        match self {
            VerifyError::UnknownExpectedFileName => 1,
            VerifyError::InvalidSignature => 2,
            VerifyError::InvalidSignatureUnknownKey => 3,
            VerifyError::TooOld => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::PublicKey;
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use ed25519_dalek::{Signer, SigningKey};

    const SERVER_LIST: &[u8] = br#"{"v": 1658243069, "server_list": []}"#;

    struct TestSigner {
        sk: SigningKey,
        key_id: [u8; 8],
    }

    impl TestSigner {
        fn new(seed: u8, key_id: [u8; 8]) -> Self {
            Self {
                sk: SigningKey::from_bytes(&[seed; 32]),
                key_id,
            }
        }

        fn public_key(&self) -> PublicKey {
            let mut bytes = Vec::new();
            bytes.extend_from_slice(b"Ed");
            bytes.extend_from_slice(&self.key_id);
            bytes.extend_from_slice(self.sk.verifying_key().as_bytes());
            PublicKey::from_base64(&BASE64.encode(bytes)).unwrap()
        }

        /// Produce a well-formed container over `document`.
        fn sign(
            &self,
            document: &[u8],
            algorithm: SignatureAlgorithm,
            timestamp: u64,
            file: &str,
        ) -> String {
            let message = match algorithm {
                SignatureAlgorithm::Legacy => document.to_vec(),
                SignatureAlgorithm::Prehashed => Blake2b512::digest(document).to_vec(),
            };
            let sig = self.sk.sign(&message);

            let mut block = Vec::new();
            block.extend_from_slice(&algorithm.tag());
            block.extend_from_slice(&self.key_id);
            block.extend_from_slice(&sig.to_bytes());

            let trusted = format!("timestamp:{timestamp}\tfile:{file}");
            let mut bound = trusted.as_bytes().to_vec();
            bound.extend_from_slice(&block);
            let global = self.sk.sign(&bound);

            format!(
                "untrusted comment: signed by test key\n{}\ntrusted comment: {}\n{}\n",
                BASE64.encode(&block),
                trusted,
                BASE64.encode(global.to_bytes()),
            )
        }
    }

    fn trusted(signer: &TestSigner) -> TrustedKeys {
        TrustedKeys::from_keys(vec![signer.public_key()])
    }

    /// Re-encode the second line of a container with a different tag or
    /// key id while keeping the signature bytes, like the upstream
    /// forged fixtures.
    fn splice_line2(container: &str, tag: Option<&[u8; 2]>, key_id: Option<&[u8; 8]>) -> String {
        let mut lines: Vec<String> = container.lines().map(str::to_string).collect();
        let mut block = BASE64.decode(&lines[1]).unwrap();
        if let Some(t) = tag {
            block[0..2].copy_from_slice(t);
        }
        if let Some(k) = key_id {
            block[2..10].copy_from_slice(k);
        }
        lines[1] = BASE64.encode(&block);
        lines.join("\n") + "\n"
    }

    #[test]
    fn test_valid_signature_both_algorithms() {
        let signer = TestSigner::new(1, [1, 2, 3, 4, 5, 6, 7, 8]);
        let keys = trusted(&signer);

        for alg in [SignatureAlgorithm::Legacy, SignatureAlgorithm::Prehashed] {
            let sig = signer.sign(SERVER_LIST, alg, 1658243069, "server_list.json");
            let ts = verify(&sig, SERVER_LIST, "server_list.json", 0, &keys).unwrap();
            assert_eq!(ts, 1658243069);
        }
    }

    #[test]
    fn test_unknown_expected_file_name_checked_first() {
        let signer = TestSigner::new(1, [1; 8]);
        let keys = trusted(&signer);

        // Even total garbage for a signature must not be inspected.
        let err = verify("garbage", SERVER_LIST, "other_list.json", 0, &keys).unwrap_err();
        assert_eq!(err, VerifyError::UnknownExpectedFileName);
        assert_eq!(err.code(), 1);
    }

    #[test]
    fn test_forged_algorithm_tag_rejected() {
        let signer = TestSigner::new(1, [1; 8]);
        let keys = trusted(&signer);

        let sig = signer.sign(
            SERVER_LIST,
            SignatureAlgorithm::Prehashed,
            100,
            "server_list.json",
        );
        let forged = splice_line2(&sig, Some(b"Ed"), None);

        assert_eq!(
            verify(&forged, SERVER_LIST, "server_list.json", 0, &keys).unwrap_err(),
            VerifyError::InvalidSignature
        );

        // The prehash flip must fail even when the attacker supplies the
        // digest as the document, because the tag is bound by the global
        // signature.
        let digest = Blake2b512::digest(SERVER_LIST).to_vec();
        assert_eq!(
            verify(&forged, &digest, "server_list.json", 0, &keys).unwrap_err(),
            VerifyError::InvalidSignature
        );
    }

    #[test]
    fn test_wrong_key_id_rejected() {
        let signer = TestSigner::new(1, [1; 8]);
        let other = TestSigner::new(2, [2; 8]);
        let keys = trusted(&signer);

        // Signature made by an untrusted key, key id spliced to the
        // trusted one: the document signature no longer verifies.
        let sig = other.sign(
            SERVER_LIST,
            SignatureAlgorithm::Prehashed,
            100,
            "server_list.json",
        );
        let spliced = splice_line2(&sig, None, Some(&signer.key_id));
        assert_eq!(
            verify(&spliced, SERVER_LIST, "server_list.json", 0, &keys).unwrap_err(),
            VerifyError::InvalidSignature
        );

        // Valid signature pointed at an id nobody trusts.
        let sig = signer.sign(
            SERVER_LIST,
            SignatureAlgorithm::Prehashed,
            100,
            "server_list.json",
        );
        let unknown = splice_line2(&sig, None, Some(&[9; 8]));
        let err = verify(&unknown, SERVER_LIST, "server_list.json", 0, &keys).unwrap_err();
        assert_eq!(err, VerifyError::InvalidSignatureUnknownKey);
        assert_eq!(err.code(), 3);
    }

    #[test]
    fn test_rollback_watermark() {
        let signer = TestSigner::new(1, [1; 8]);
        let keys = trusted(&signer);
        let sig = signer.sign(
            SERVER_LIST,
            SignatureAlgorithm::Prehashed,
            1658243069,
            "server_list.json",
        );

        // Equal to the watermark is still acceptable.
        assert!(verify(&sig, SERVER_LIST, "server_list.json", 1658243069, &keys).is_ok());

        let err = verify(&sig, SERVER_LIST, "server_list.json", 1 << 31, &keys).unwrap_err();
        assert_eq!(err, VerifyError::TooOld);
        assert_eq!(err.code(), 4);
    }

    #[test]
    fn test_too_old_only_after_valid_signature() {
        let signer = TestSigner::new(1, [1; 8]);
        let keys = trusted(&signer);

        // Stale AND tampered must report the signature failure, not the
        // staleness, so error order leaks nothing to a forger.
        let sig = signer.sign(
            SERVER_LIST,
            SignatureAlgorithm::Prehashed,
            10,
            "server_list.json",
        );
        let forged = splice_line2(&sig, Some(b"Ed"), None);
        assert_eq!(
            verify(&forged, SERVER_LIST, "server_list.json", 1 << 31, &keys).unwrap_err(),
            VerifyError::InvalidSignature
        );
    }

    #[test]
    fn test_wrong_file_in_trusted_comment() {
        let signer = TestSigner::new(1, [1; 8]);
        let keys = trusted(&signer);

        let sig = signer.sign(
            SERVER_LIST,
            SignatureAlgorithm::Prehashed,
            100,
            "organization_list.json",
        );
        assert_eq!(
            verify(&sig, SERVER_LIST, "server_list.json", 0, &keys).unwrap_err(),
            VerifyError::InvalidSignature
        );
    }

    #[test]
    fn test_tampered_document() {
        let signer = TestSigner::new(1, [1; 8]);
        let keys = trusted(&signer);

        let sig = signer.sign(
            SERVER_LIST,
            SignatureAlgorithm::Prehashed,
            100,
            "server_list.json",
        );
        assert_eq!(
            verify(&sig, b"{\"v\": 2}", "server_list.json", 0, &keys).unwrap_err(),
            VerifyError::InvalidSignature
        );
    }
}
