//! Engine-level error taxonomy and the server error model.

use thiserror::Error;

use crate::api::transport::{ResponseHeaders, TransportError};
use crate::api::types::ErrorEnvelope;
use crate::attestation::AttestationError;
use crate::crypto::device_key::DeviceKeyError;
use crate::crypto::dpop::ProofError;

/// Server-reported error codes consumed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerErrorCode {
    InvalidRequest,
    InvalidToken,
    DeviceBlocked,
    RateLimited,
    NonceExpired,
    AttestationFailed,
    Other(String),
}

impl ServerErrorCode {
    pub fn parse(code: &str) -> Self {
        match code {
            "invalid_request" => Self::InvalidRequest,
            "invalid_token" => Self::InvalidToken,
            "device_blocked" => Self::DeviceBlocked,
            "rate_limited" => Self::RateLimited,
            "nonce_expired" => Self::NonceExpired,
            "attestation_failed" => Self::AttestationFailed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidToken => "invalid_token",
            Self::DeviceBlocked => "device_blocked",
            Self::RateLimited => "rate_limited",
            Self::NonceExpired => "nonce_expired",
            Self::AttestationFailed => "attestation_failed",
            Self::Other(code) => code,
        }
    }
}

/// Structured error decoded from the `{error, error_description}` envelope.
#[derive(Debug, Clone)]
pub struct ServerError {
    pub code: ServerErrorCode,
    pub description: Option<String>,
}

impl From<ErrorEnvelope> for ServerError {
    fn from(envelope: ErrorEnvelope) -> Self {
        Self {
            code: ServerErrorCode::parse(&envelope.error),
            description: envelope.error_description,
        }
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {}", self.code.as_str(), description),
            None => write!(f, "{}", self.code.as_str()),
        }
    }
}

/// Failure categories surfaced by the authentication engine.
///
/// Cloneable so callers coalesced onto one mint observe the same failure.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// Invalid engine input (undecodable nonce, dev-token misuse, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The key store refused hardware-backed storage.
    #[error("hardware-backed key storage is unavailable")]
    SecureEnclaveUnavailable,

    /// The platform does not support attestation at all.
    #[error("attestation is unavailable on this platform")]
    AttestationUnavailable,

    /// The attestation key failed to produce a usable artifact, or
    /// registration was rejected.
    #[error("attestation failed: {0}")]
    AttestationFailed(String),

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx response from the auth API.
    #[error("server rejected the request with status {status}")]
    Server {
        status: u16,
        error: Option<ServerError>,
        headers: ResponseHeaders,
    },

    /// A server response did not match the expected schema.
    #[error("failed to decode server response: {0}")]
    Decoding(String),

    /// A response lacked the expected framing.
    #[error("response lacked the expected framing")]
    InvalidResponse,

    /// A token was read before one was ever acquired.
    #[error("no access token available")]
    TokenMissing,

    /// The device key could not produce a signature.
    #[error("device key signing failed: {0}")]
    SigningFailure(String),
}

impl AuthError {
    /// The nonce demanded by a `401` challenge, if this is one.
    pub(crate) fn dpop_nonce(&self) -> Option<&str> {
        match self {
            AuthError::Server {
                status: 401,
                headers,
                ..
            } => headers.get("DPoP-Nonce"),
            _ => None,
        }
    }

    /// True when the server asks for a fresh registration of the attestation
    /// key.
    pub(crate) fn is_registration_required(&self) -> bool {
        match self {
            AuthError::Server {
                status: 401,
                error: Some(error),
                ..
            } => {
                error.code == ServerErrorCode::AttestationFailed
                    && error
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_ascii_lowercase().contains("registration required"))
            }
            _ => false,
        }
    }
}

impl From<TransportError> for AuthError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(detail) => AuthError::Network(detail),
            TransportError::InvalidRequest(detail) => AuthError::Configuration(detail),
        }
    }
}

impl From<DeviceKeyError> for AuthError {
    fn from(err: DeviceKeyError) -> Self {
        match err {
            DeviceKeyError::SecureEnclaveUnavailable => AuthError::SecureEnclaveUnavailable,
            DeviceKeyError::Signing(detail) => AuthError::SigningFailure(detail),
            other => AuthError::Configuration(other.to_string()),
        }
    }
}

impl From<ProofError> for AuthError {
    fn from(err: ProofError) -> Self {
        AuthError::SigningFailure(err.to_string())
    }
}

impl From<AttestationError> for AuthError {
    fn from(err: AttestationError) -> Self {
        match err {
            AttestationError::Unavailable => AuthError::AttestationUnavailable,
            AttestationError::Failed(message) => AuthError::AttestationFailed(message),
            other => AuthError::AttestationFailed(other.to_string()),
        }
    }
}
