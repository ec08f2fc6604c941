//! EC public key JWK and thumbprint computation (RFC 7638).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::codec::base64url;

/// EC public key in JWK format (P-256/ES256).
///
/// Fields are declared in lexicographic order; the DPoP proof header embeds
/// this struct and serializes members as declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcPublicJwk {
    /// Curve name (always "P-256").
    pub crv: String,
    /// Key type (always "EC").
    pub kty: String,
    /// X coordinate, unpadded base64url of the 32-byte value.
    pub x: String,
    /// Y coordinate, unpadded base64url of the 32-byte value.
    pub y: String,
}

impl EcPublicJwk {
    /// Build a P-256 JWK from base64url-encoded coordinates.
    pub fn new(x: String, y: String) -> Self {
        Self {
            crv: "P-256".to_string(),
            kty: "EC".to_string(),
            x,
            y,
        }
    }

    /// Canonical JWK byte form: members in lexicographic order, no whitespace.
    ///
    /// The thumbprint and the App-Attest client-data hash are both computed
    /// over this exact string, and the server recomputes both.
    pub fn canonical_json(&self) -> String {
        format!(
            r#"{{"crv":"P-256","kty":"EC","x":"{}","y":"{}"}}"#,
            self.x, self.y
        )
    }

    /// JWK thumbprint per RFC 7638: base64url(SHA-256(canonical JWK)).
    pub fn thumbprint(&self) -> String {
        let hash = Sha256::digest(self.canonical_json().as_bytes());
        base64url::encode(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_json_member_order() {
        let jwk = EcPublicJwk::new("abc".to_string(), "def".to_string());
        assert_eq!(
            jwk.canonical_json(),
            r#"{"crv":"P-256","kty":"EC","x":"abc","y":"def"}"#
        );
    }

    #[test]
    fn test_serde_emits_sorted_members() {
        let jwk = EcPublicJwk::new("abc".to_string(), "def".to_string());
        // serde serializes fields as declared, which must match the canonical
        // form for the DPoP signing input.
        assert_eq!(serde_json::to_string(&jwk).unwrap(), jwk.canonical_json());
    }

    #[test]
    fn test_thumbprint_is_deterministic() {
        let jwk = EcPublicJwk::new("abc".to_string(), "def".to_string());
        assert_eq!(jwk.thumbprint(), jwk.thumbprint());
    }

    #[test]
    fn test_thumbprint_format() {
        let jwk = EcPublicJwk::new("abc".to_string(), "def".to_string());
        let thumb = jwk.thumbprint();

        // SHA-256 = 32 bytes = 43 base64url chars (no padding)
        assert_eq!(thumb.len(), 43);
        assert!(thumb
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_different_keys_different_thumbprints() {
        let a = EcPublicJwk::new("abc".to_string(), "def".to_string());
        let b = EcPublicJwk::new("abd".to_string(), "def".to_string());
        assert_ne!(a.thumbprint(), b.thumbprint());
    }
}
