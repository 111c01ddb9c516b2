//! Minisign Signature Containers
//!
//! Parses the four-line signature files that accompany discovery
//! documents:
//!
//! 1. untrusted comment
//! 2. base64(2-byte algorithm tag ∥ 8-byte key id ∥ 64-byte Ed25519 signature)
//! 3. trusted comment (authenticated, carries the signing timestamp)
//! 4. base64(64-byte global signature binding line 3 to line 2)
//!
//! Parsing never touches key material; cryptographic checks live in
//! [`crate::verify`].

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::VerifyingKey;
use std::fmt;

/// Prefix required on the first (untrusted) comment line.
pub const UNTRUSTED_COMMENT_PREFIX: &str = "untrusted comment: ";

/// Prefix required on the third (trusted) comment line.
pub const TRUSTED_COMMENT_PREFIX: &str = "trusted comment: ";

/// Decoded length of line 2: tag (2) + key id (8) + signature (64).
const SIGNATURE_BLOCK_LEN: usize = 74;

/// Decoded length of a public key: tag (2) + key id (8) + key (32).
const PUBLIC_KEY_LEN: usize = 42;

/// Signature algorithm tag from the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// `Ed`: the Ed25519 signature covers the raw document.
    Legacy,
    /// `ED`: the Ed25519 signature covers the BLAKE2b-512 digest of the
    /// document.
    Prehashed,
}

impl SignatureAlgorithm {
    /// Parse a two-byte tag.
    pub fn from_tag(tag: [u8; 2]) -> Option<Self> {
        match &tag {
            b"Ed" => Some(SignatureAlgorithm::Legacy),
            b"ED" => Some(SignatureAlgorithm::Prehashed),
            _ => None,
        }
    }

    /// The two-byte wire tag.
    pub fn tag(self) -> [u8; 2] {
        match self {
            SignatureAlgorithm::Legacy => *b"Ed",
            SignatureAlgorithm::Prehashed => *b"ED",
        }
    }
}

/// Eight-byte key identifier shared by a key pair and its signatures.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId([u8; 8]);

impl KeyId {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Raw bytes, little-endian as found on the wire.
    pub fn to_bytes(self) -> [u8; 8] {
        self.0
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId(")?;
        for b in self.0 {
            write!(f, "{b:02X}")?;
        }
        write!(f, ")")
    }
}

/// A parsed signature container.
#[derive(Debug, Clone)]
pub struct SignatureContainer {
    /// Untrusted comment text, informational only.
    pub untrusted_comment: String,
    /// Declared signature algorithm.
    pub algorithm: SignatureAlgorithm,
    /// Id of the key that allegedly produced the signature.
    pub key_id: KeyId,
    /// Ed25519 signature over the document (or its digest, see
    /// [`SignatureAlgorithm`]).
    pub signature: [u8; 64],
    /// Trusted comment text (without its line prefix).
    pub trusted_comment: String,
    /// Global signature over trusted-comment bytes ∥ decoded line 2.
    pub global_signature: [u8; 64],
}

impl SignatureContainer {
    /// Parse the four-line `.minisig` text form.
    pub fn parse(text: &str) -> Result<Self, SignatureError> {
        let mut lines = text.lines();
        let comment_line = lines.next().ok_or(SignatureError::Truncated)?;
        let signature_line = lines.next().ok_or(SignatureError::Truncated)?;
        let trusted_line = lines.next().ok_or(SignatureError::Truncated)?;
        let global_line = lines.next().ok_or(SignatureError::Truncated)?;

        let untrusted_comment = comment_line
            .strip_prefix(UNTRUSTED_COMMENT_PREFIX)
            .ok_or(SignatureError::BadUntrustedComment)?
            .to_string();

        let block = BASE64
            .decode(signature_line.trim())
            .map_err(|_| SignatureError::InvalidBase64)?;
        if block.len() != SIGNATURE_BLOCK_LEN {
            return Err(SignatureError::BadLength {
                what: "signature block",
                got: block.len(),
                want: SIGNATURE_BLOCK_LEN,
            });
        }

        let tag = [block[0], block[1]];
        let algorithm =
            SignatureAlgorithm::from_tag(tag).ok_or(SignatureError::UnknownAlgorithm(tag))?;

        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&block[2..10]);

        let mut signature = [0u8; 64];
        signature.copy_from_slice(&block[10..74]);

        let trusted_comment = trusted_line
            .strip_prefix(TRUSTED_COMMENT_PREFIX)
            .ok_or(SignatureError::BadTrustedComment)?
            .to_string();

        let global = BASE64
            .decode(global_line.trim())
            .map_err(|_| SignatureError::InvalidBase64)?;
        if global.len() != 64 {
            return Err(SignatureError::BadLength {
                what: "global signature",
                got: global.len(),
                want: 64,
            });
        }
        let mut global_signature = [0u8; 64];
        global_signature.copy_from_slice(&global);

        Ok(Self {
            untrusted_comment,
            algorithm,
            key_id: KeyId::from_bytes(key_id),
            signature,
            trusted_comment,
            global_signature,
        })
    }

    /// The decoded second line: tag ∥ key id ∥ signature.
    ///
    /// This is the block the global signature covers (together with the
    /// trusted comment), so the algorithm tag is bound into verification.
    pub fn signed_block(&self) -> [u8; SIGNATURE_BLOCK_LEN] {
        let mut block = [0u8; SIGNATURE_BLOCK_LEN];
        block[0..2].copy_from_slice(&self.algorithm.tag());
        block[2..10].copy_from_slice(&self.key_id.to_bytes());
        block[10..74].copy_from_slice(&self.signature);
        block
    }
}

/// Timestamp and file name carried by the trusted comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedComment {
    /// Signing time, UNIX seconds.
    pub timestamp: u64,
    /// Name of the signed file.
    pub file: String,
}

impl TrustedComment {
    /// Parse `timestamp:<u64>\tfile:<name>`, tolerating extra
    /// tab-separated fields (e.g. a trailing `hashed` marker).
    pub fn parse(comment: &str) -> Result<Self, SignatureError> {
        let mut fields = comment.split('\t');

        let timestamp = fields
            .next()
            .and_then(|f| f.strip_prefix("timestamp:"))
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or(SignatureError::BadTrustedComment)?;

        let file = fields
            .next()
            .and_then(|f| f.strip_prefix("file:"))
            .filter(|v| !v.is_empty() && !v.contains(' '))
            .ok_or(SignatureError::BadTrustedComment)?;

        Ok(Self {
            timestamp,
            file: file.to_string(),
        })
    }
}

/// A trusted Ed25519 public key in minisign form.
#[derive(Clone)]
pub struct PublicKey {
    key_id: KeyId,
    key: VerifyingKey,
}

impl PublicKey {
    /// Decode from the standard base64 form: `Ed` tag ∥ key id ∥ key bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, SignatureError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|_| SignatureError::InvalidBase64)?;
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(SignatureError::BadLength {
                what: "public key",
                got: bytes.len(),
                want: PUBLIC_KEY_LEN,
            });
        }
        if &bytes[0..2] != b"Ed" {
            return Err(SignatureError::UnknownAlgorithm([bytes[0], bytes[1]]));
        }

        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&bytes[2..10]);

        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&bytes[10..42]);
        let key =
            VerifyingKey::from_bytes(&key_bytes).map_err(|_| SignatureError::InvalidKeyBytes)?;

        Ok(Self {
            key_id: KeyId::from_bytes(key_id),
            key,
        })
    }

    /// The key's eight-byte identifier.
    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    /// The verifying half for crypto operations.
    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({:?})", self.key_id)
    }
}

/// Container and key parse errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature container has fewer than four lines")]
    Truncated,

    #[error("first line is not an untrusted comment")]
    BadUntrustedComment,

    #[error("trusted comment line is malformed")]
    BadTrustedComment,

    #[error("invalid base64 in signature container")]
    InvalidBase64,

    #[error("{what} has length {got}, expected {want}")]
    BadLength {
        what: &'static str,
        got: usize,
        want: usize,
    },

    #[error("unknown signature algorithm tag {0:?}")]
    UnknownAlgorithm([u8; 2]),

    #[error("public key bytes are not a valid Ed25519 point")]
    InvalidKeyBytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_container(tag: &[u8; 2], key_id: &[u8; 8], ts_line: &str) -> String {
        let mut block = Vec::new();
        block.extend_from_slice(tag);
        block.extend_from_slice(key_id);
        block.extend_from_slice(&[7u8; 64]);
        format!(
            "untrusted comment: test\n{}\ntrusted comment: {}\n{}\n",
            BASE64.encode(&block),
            ts_line,
            BASE64.encode([9u8; 64]),
        )
    }

    #[test]
    fn test_parse_container() {
        let text = encode_container(b"ED", &[1, 2, 3, 4, 5, 6, 7, 8], "timestamp:10\tfile:a.json");
        let sig = SignatureContainer::parse(&text).unwrap();

        assert_eq!(sig.algorithm, SignatureAlgorithm::Prehashed);
        assert_eq!(sig.key_id.to_bytes(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(sig.signature, [7u8; 64]);
        assert_eq!(sig.trusted_comment, "timestamp:10\tfile:a.json");
    }

    #[test]
    fn test_signed_block_round_trip() {
        let text = encode_container(b"Ed", &[8; 8], "timestamp:1\tfile:b.json");
        let sig = SignatureContainer::parse(&text).unwrap();

        let block = sig.signed_block();
        assert_eq!(&block[0..2], b"Ed");
        assert_eq!(&block[2..10], &[8u8; 8]);
        assert_eq!(&block[10..74], &[7u8; 64]);
    }

    #[test]
    fn test_unknown_algorithm_tag() {
        let text = encode_container(b"XX", &[0; 8], "timestamp:1\tfile:b.json");
        assert_eq!(
            SignatureContainer::parse(&text).unwrap_err(),
            SignatureError::UnknownAlgorithm(*b"XX")
        );
    }

    #[test]
    fn test_truncated_and_bad_base64() {
        assert_eq!(
            SignatureContainer::parse("untrusted comment: only\n").unwrap_err(),
            SignatureError::Truncated
        );

        let text = "untrusted comment: x\n!!!\ntrusted comment: y\nAAAA\n";
        assert_eq!(
            SignatureContainer::parse(text).unwrap_err(),
            SignatureError::InvalidBase64
        );
    }

    #[test]
    fn test_trusted_comment_parse() {
        let tc = TrustedComment::parse("timestamp:1658243069\tfile:server_list.json").unwrap();
        assert_eq!(tc.timestamp, 1658243069);
        assert_eq!(tc.file, "server_list.json");

        // trailing fields are tolerated
        let tc =
            TrustedComment::parse("timestamp:5\tfile:organization_list.json\thashed").unwrap();
        assert_eq!(tc.file, "organization_list.json");

        assert!(TrustedComment::parse("timestamp:nope\tfile:a").is_err());
        assert!(TrustedComment::parse("file:a\ttimestamp:5").is_err());
        assert!(TrustedComment::parse("timestamp:5").is_err());
    }
}
