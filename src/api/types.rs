//! Wire types for the gateway authentication API.

use serde::{Deserialize, Serialize};

use crate::crypto::jwk::EcPublicJwk;

/// `platform` member of registration and token requests.
pub(crate) const PLATFORM: &str = "ios";

/// `attestation.type` member of registration and token requests.
pub(crate) const ATTESTATION_KIND: &str = "app_attest";

/// Challenge issued by `/attest/challenge`.
#[derive(Debug, Clone, Deserialize)]
pub struct Challenge {
    /// base64url-encoded challenge nonce.
    pub nonce: String,
    /// Expiry as a unix timestamp.
    pub exp: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChallengeRequest {
    pub purpose: &'static str,
}

/// `app` member of registration and token requests.
#[derive(Debug, Clone, Serialize)]
pub struct AppDescriptor {
    pub bundle_id: String,
}

/// `attestation` member of `/attest/register`.
#[derive(Debug, Serialize)]
pub struct RegistrationAttestation {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub key_id: String,
    pub team_id: String,
    /// base64 one-time attestation object.
    pub attestation: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest {
    pub platform: &'static str,
    pub app: AppDescriptor,
    pub device_key_jwk: EcPublicJwk,
    pub attestation: RegistrationAttestation,
    /// Challenge nonce echoed verbatim as received.
    pub nonce: String,
    /// Same proof as the `DPoP` header.
    pub dpop: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub registered: bool,
    #[serde(default)]
    pub key_id: Option<String>,
}

/// `attestation` member of `/token`.
#[derive(Debug, Serialize)]
pub struct TokenAttestation {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub key_id: String,
    pub team_id: String,
    /// base64 per-request assertion.
    pub assertion: String,
}

/// `/token` request body. Carries either `attestation` or `dev_token`,
/// never both.
#[derive(Debug, Serialize)]
pub struct TokenRequest {
    pub platform: &'static str,
    pub app: AppDescriptor,
    pub device_key_jwk: EcPublicJwk,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<TokenAttestation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_token: Option<String>,
    /// Same proof as the `DPoP` header.
    pub dpop: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime of the token in seconds.
    pub expires_in: u64,
    /// Server-reported issuance mode ("prod", "dev", ...). Surfaced, not
    /// acted on.
    #[serde(default)]
    pub mode: Option<String>,
}

/// Error envelope carried by non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_deserialize() {
        let challenge: Challenge =
            serde_json::from_str(r#"{"nonce":"AAAA","exp":1999999999}"#).unwrap();
        assert_eq!(challenge.nonce, "AAAA");
        assert_eq!(challenge.exp, 1_999_999_999);
    }

    #[test]
    fn test_token_request_omits_absent_members() {
        let request = TokenRequest {
            platform: PLATFORM,
            app: AppDescriptor {
                bundle_id: "com.example.app".to_string(),
            },
            device_key_jwk: EcPublicJwk::new("x".to_string(), "y".to_string()),
            attestation: None,
            dev_token: Some("D".to_string()),
            dpop: "proof".to_string(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("attestation").is_none());
        assert_eq!(json["dev_token"], "D");
        assert_eq!(json["platform"], "ios");
    }

    #[test]
    fn test_attestation_member_uses_type_key() {
        let attestation = TokenAttestation {
            kind: ATTESTATION_KIND,
            key_id: "key-1".to_string(),
            team_id: "ABCDE12345".to_string(),
            assertion: "YXNzZXJ0aW9u".to_string(),
        };

        let json = serde_json::to_value(&attestation).unwrap();
        assert_eq!(json["type"], "app_attest");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_token_response_mode_is_optional() {
        let with_mode: TokenResponse =
            serde_json::from_str(r#"{"access_token":"T","expires_in":300,"mode":"dev"}"#).unwrap();
        assert_eq!(with_mode.mode.as_deref(), Some("dev"));

        let without: TokenResponse =
            serde_json::from_str(r#"{"access_token":"T","expires_in":300}"#).unwrap();
        assert_eq!(without.mode, None);
    }

    #[test]
    fn test_error_envelope_description_optional() {
        let envelope: ErrorEnvelope =
            serde_json::from_str(r#"{"error":"rate_limited"}"#).unwrap();
        assert_eq!(envelope.error, "rate_limited");
        assert_eq!(envelope.error_description, None);
    }
}
