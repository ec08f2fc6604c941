//! DPoP proof generation (RFC 9449).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::codec::{base64url, ecdsa, CodecError};
use crate::crypto::device_key::{DeviceKey, DeviceKeyError, DeviceKeyMaterial};
use crate::crypto::jwk::EcPublicJwk;

/// P-256 coordinate width; raw signatures are two of these.
const COORD_OCTETS: usize = 32;

/// DPoP proof claims per RFC 9449.
///
/// Fields are declared in lexicographic order; serde serializes them as
/// declared, which keeps the signing input in sorted-key form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpopClaims {
    /// Uppercase HTTP method token.
    pub htm: String,
    /// Target URI, exactly as supplied by the caller.
    pub htu: String,
    /// Issued-at, seconds since the unix epoch.
    pub iat: i64,
    /// Fresh 128-bit identifier, unique per proof.
    pub jti: String,
    /// Server-provided nonce, echoed on challenge retries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

// Header members likewise sorted: alg < jwk < typ.
#[derive(Serialize)]
struct ProofHeader<'a> {
    alg: &'static str,
    jwk: &'a EcPublicJwk,
    typ: &'static str,
}

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("device key signing failed: {0}")]
    Signing(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed signature from device key: {0}")]
    Signature(#[from] CodecError),

    #[error("clock error")]
    Clock,
}

/// Builds and signs DPoP proofs with the device key.
///
/// Stateless apart from the borrowed key handle; safe to share across tasks.
#[derive(Clone)]
pub struct ProofBuilder {
    key: Arc<dyn DeviceKey>,
    jwk: EcPublicJwk,
}

impl ProofBuilder {
    pub fn new(material: &DeviceKeyMaterial) -> Self {
        Self {
            key: Arc::clone(material.key()),
            jwk: material.jwk().clone(),
        }
    }

    /// Build a proof for `(method, url)`, optionally echoing a server nonce.
    ///
    /// Every call produces a fresh `jti` and a current `iat`.
    pub fn proof(&self, method: &str, url: &str, nonce: Option<&str>) -> Result<String, ProofError> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| ProofError::Clock)?
            .as_secs() as i64;
        self.proof_at(method, url, nonce, iat, &Uuid::new_v4().to_string())
    }

    /// Variant with explicit `iat` and `jti` for callers that manage both.
    pub fn proof_at(
        &self,
        method: &str,
        url: &str,
        nonce: Option<&str>,
        iat: i64,
        jti: &str,
    ) -> Result<String, ProofError> {
        let header = ProofHeader {
            alg: "ES256",
            jwk: &self.jwk,
            typ: "dpop+jwt",
        };
        let claims = DpopClaims {
            htm: method.to_ascii_uppercase(),
            htu: url.to_string(),
            iat,
            jti: jti.to_string(),
            nonce: nonce.map(String::from),
        };

        let header_b64 = base64url::encode(serde_json::to_string(&header)?);
        let claims_b64 = base64url::encode(serde_json::to_string(&claims)?);
        let message = format!("{header_b64}.{claims_b64}");

        let der = self.key.sign(message.as_bytes()).map_err(|e| match e {
            DeviceKeyError::Signing(detail) => ProofError::Signing(detail),
            other => ProofError::Signing(other.to_string()),
        })?;
        let raw = ecdsa::der_to_raw(&der, COORD_OCTETS)?;

        Ok(format!("{message}.{}", base64url::encode(raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::device_key::SoftwareDeviceKey;
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::{Signature, VerifyingKey};

    fn builder() -> ProofBuilder {
        let key = SoftwareDeviceKey::generate();
        let sec1 = key.public_key_sec1();
        let material = DeviceKeyMaterial::from_sec1(Arc::new(key), &sec1).unwrap();
        ProofBuilder::new(&material)
    }

    fn decode_part(proof: &str, index: usize) -> Vec<u8> {
        let part = proof.split('.').nth(index).unwrap();
        base64url::decode(part).unwrap()
    }

    #[test]
    fn test_proof_format() {
        let proof = builder()
            .proof("POST", "https://gateway.example.com/token", None)
            .unwrap();

        let parts: Vec<&str> = proof.split('.').collect();
        assert_eq!(parts.len(), 3);
        for part in &parts {
            assert!(base64url::decode(part).is_ok());
        }
    }

    #[test]
    fn test_header_is_sorted_and_typed() {
        let proof = builder()
            .proof("POST", "https://gateway.example.com/token", None)
            .unwrap();

        let header = String::from_utf8(decode_part(&proof, 0)).unwrap();
        // Raw bytes, not just parsed content: key order is part of the
        // signing input the server recomputes.
        assert!(header.starts_with(r#"{"alg":"ES256","jwk":{"crv":"P-256","kty":"EC","x":"#));
        assert!(header.ends_with(r#""typ":"dpop+jwt"}"#));
    }

    #[test]
    fn test_claims_are_sorted() {
        let proof = builder()
            .proof("post", "https://gateway.example.com/v1/x", Some("n-1"))
            .unwrap();

        let claims = String::from_utf8(decode_part(&proof, 1)).unwrap();
        let htm = claims.find(r#""htm""#).unwrap();
        let htu = claims.find(r#""htu""#).unwrap();
        let iat = claims.find(r#""iat""#).unwrap();
        let jti = claims.find(r#""jti""#).unwrap();
        let nonce = claims.find(r#""nonce""#).unwrap();
        assert!(htm < htu && htu < iat && iat < jti && jti < nonce);
    }

    #[test]
    fn test_method_uppercased_url_verbatim() {
        let url = "https://gateway.example.com/v1/responses?stream=true";
        let proof = builder().proof("post", url, None).unwrap();

        let claims: DpopClaims = serde_json::from_slice(&decode_part(&proof, 1)).unwrap();
        assert_eq!(claims.htm, "POST");
        assert_eq!(claims.htu, url);
        assert_eq!(claims.nonce, None);
    }

    #[test]
    fn test_nonce_claim_present_when_supplied() {
        let proof = builder()
            .proof("POST", "https://gateway.example.com/token", Some("N1"))
            .unwrap();

        let claims: DpopClaims = serde_json::from_slice(&decode_part(&proof, 1)).unwrap();
        assert_eq!(claims.nonce.as_deref(), Some("N1"));
    }

    #[test]
    fn test_unique_jti_per_proof() {
        let builder = builder();
        let mut seen = std::collections::HashSet::new();

        for _ in 0..32 {
            let proof = builder
                .proof("GET", "https://gateway.example.com/", None)
                .unwrap();
            let claims: DpopClaims = serde_json::from_slice(&decode_part(&proof, 1)).unwrap();
            assert!(seen.insert(claims.jti));
        }
    }

    #[test]
    fn test_signature_verifies_against_embedded_jwk() {
        let proof = builder()
            .proof("POST", "https://gateway.example.com/token", None)
            .unwrap();

        let parts: Vec<&str> = proof.split('.').collect();
        let header: serde_json::Value = serde_json::from_slice(&decode_part(&proof, 0)).unwrap();

        let x = base64url::decode(header["jwk"]["x"].as_str().unwrap()).unwrap();
        let y = base64url::decode(header["jwk"]["y"].as_str().unwrap()).unwrap();
        let mut sec1 = vec![0x04];
        sec1.extend_from_slice(&x);
        sec1.extend_from_slice(&y);
        let verifying_key = VerifyingKey::from_sec1_bytes(&sec1).unwrap();

        let raw = decode_part(&proof, 2);
        assert_eq!(raw.len(), 64);
        let signature = Signature::from_slice(&raw).unwrap();

        let message = format!("{}.{}", parts[0], parts[1]);
        assert!(verifying_key.verify(message.as_bytes(), &signature).is_ok());

        // Any flipped signing-input byte must break verification.
        let mut tampered = message.into_bytes();
        tampered[10] ^= 0x01;
        assert!(verifying_key.verify(&tampered, &signature).is_err());
    }

    #[test]
    fn test_proof_at_is_deterministic_in_claims() {
        let builder = builder();
        let proof = builder
            .proof_at("POST", "https://g/", None, 1_700_000_000, "fixed-jti")
            .unwrap();

        let claims: DpopClaims = serde_json::from_slice(&decode_part(&proof, 1)).unwrap();
        assert_eq!(claims.iat, 1_700_000_000);
        assert_eq!(claims.jti, "fixed-jti");
    }
}
