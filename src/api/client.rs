//! Typed adapter for the gateway authentication endpoints.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::api::transport::{HttpRequest, HttpTransport};
use crate::api::types::{
    Challenge, ChallengeRequest, ErrorEnvelope, RegisterRequest, RegisterResponse, TokenRequest,
    TokenResponse,
};
use crate::error::{AuthError, ServerError};

/// Client for `/attest/challenge`, `/attest/register`, and `/token`.
///
/// All three calls are JSON POSTs. Non-2xx responses are decoded into the
/// structured error envelope where possible and surfaced together with the
/// status and response headers for the engine to classify.
pub struct AuthApiClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl AuthApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of the token endpoint; the DPoP `htu` for token mints.
    pub fn token_url(&self) -> String {
        format!("{}/token", self.base_url)
    }

    /// Absolute URL of the registration endpoint.
    pub fn register_url(&self) -> String {
        format!("{}/attest/register", self.base_url)
    }

    pub async fn challenge(&self) -> Result<Challenge, AuthError> {
        self.post_json("/attest/challenge", &ChallengeRequest { purpose: "token" }, None)
            .await
    }

    pub async fn register(
        &self,
        request: &RegisterRequest,
        dpop: &str,
    ) -> Result<RegisterResponse, AuthError> {
        self.post_json("/attest/register", request, Some(dpop)).await
    }

    pub async fn token(
        &self,
        request: &TokenRequest,
        dpop: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.post_json("/token", request, Some(dpop)).await
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        dpop: Option<&str>,
    ) -> Result<R, AuthError> {
        let url = format!("{}{}", self.base_url, path);
        let payload = serde_json::to_vec(body)
            .map_err(|e| AuthError::Configuration(format!("request encoding: {e}")))?;

        let mut request = HttpRequest::new("POST", &url)
            .header("Content-Type", "application/json")
            .body(payload);
        if let Some(proof) = dpop {
            request = request.header("DPoP", proof);
        }

        let response = self.transport.execute(request).await?;
        debug!(path, status = response.status, "auth API response");

        if !response.is_success() {
            let error = serde_json::from_slice::<ErrorEnvelope>(&response.body)
                .ok()
                .map(ServerError::from);
            return Err(AuthError::Server {
                status: response.status,
                error,
                headers: response.headers,
            });
        }

        if response.body.is_empty() {
            return Err(AuthError::InvalidResponse);
        }
        serde_json::from_slice(&response.body).map_err(|e| AuthError::Decoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::ResponseHeaders;
    use crate::error::ServerErrorCode;
    use crate::test_support::{json_response, MockTransport};
    use serde_json::json;

    fn client(transport: Arc<MockTransport>) -> AuthApiClient {
        AuthApiClient::new(transport, "https://gateway.test.invalid/auth/")
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = client(Arc::new(MockTransport::new()));
        assert_eq!(client.base_url(), "https://gateway.test.invalid/auth");
        assert_eq!(client.token_url(), "https://gateway.test.invalid/auth/token");
        assert_eq!(
            client.register_url(),
            "https://gateway.test.invalid/auth/attest/register"
        );
    }

    #[tokio::test]
    async fn test_challenge_request_shape() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            "/attest/challenge",
            json_response(200, json!({"nonce": "AAAA", "exp": 1999999999})),
        );

        let challenge = client(transport.clone()).challenge().await.unwrap();
        assert_eq!(challenge.nonce, "AAAA");

        let requests = transport.requests_to("/attest/challenge");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(
            requests[0].header_value("content-type"),
            Some("application/json")
        );
        let body: serde_json::Value =
            serde_json::from_slice(requests[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"purpose": "token"}));
    }

    #[tokio::test]
    async fn test_token_carries_dpop_header() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            "/token",
            json_response(200, json!({"access_token": "T1", "expires_in": 300})),
        );

        let request = crate::api::types::TokenRequest {
            platform: crate::api::types::PLATFORM,
            app: crate::api::types::AppDescriptor {
                bundle_id: "com.example.app".to_string(),
            },
            device_key_jwk: crate::crypto::jwk::EcPublicJwk::new("x".to_string(), "y".to_string()),
            attestation: None,
            dev_token: Some("D".to_string()),
            dpop: "proof".to_string(),
        };
        client(transport.clone())
            .token(&request, "proof")
            .await
            .unwrap();

        let requests = transport.requests_to("/token");
        assert_eq!(requests[0].header_value("dpop"), Some("proof"));
    }

    #[tokio::test]
    async fn test_error_envelope_decoded() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            "/attest/challenge",
            json_response(
                429,
                json!({"error": "rate_limited", "error_description": "slow down"}),
            ),
        );

        let err = client(transport).challenge().await.unwrap_err();
        match err {
            AuthError::Server { status, error, .. } => {
                assert_eq!(status, 429);
                let error = error.unwrap();
                assert_eq!(error.code, ServerErrorCode::RateLimited);
                assert_eq!(error.description.as_deref(), Some("slow down"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_body_surfaces_status_and_headers() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            "/attest/challenge",
            crate::api::transport::HttpResponse {
                status: 503,
                headers: ResponseHeaders::new(vec![(
                    "Retry-After".to_string(),
                    "30".to_string(),
                )]),
                body: b"Service Unavailable".to_vec(),
            },
        );

        let err = client(transport).challenge().await.unwrap_err();
        match err {
            AuthError::Server {
                status,
                error,
                headers,
            } => {
                assert_eq!(status, 503);
                assert!(error.is_none());
                assert_eq!(headers.get("retry-after"), Some("30"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_success_body_is_invalid_response() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            "/attest/challenge",
            crate::api::transport::HttpResponse {
                status: 200,
                headers: ResponseHeaders::default(),
                body: Vec::new(),
            },
        );

        let err = client(transport).challenge().await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse));
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_decoding_error() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/attest/challenge", json_response(200, json!({"nope": 1})));

        let err = client(transport).challenge().await.unwrap_err();
        assert!(matches!(err, AuthError::Decoding(_)));
    }
}
