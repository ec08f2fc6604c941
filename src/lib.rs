//! # attest-auth
//!
//! Client SDK that mints device-bound, proof-of-possession (DPoP) access
//! tokens for a gateway service.
//!
//! The core is the authentication session engine: a concurrent state machine
//! that manages a long-lived device keypair, performs one-time device
//! attestation and enrollment, exchanges attestation assertions for
//! short-lived access tokens, signs a fresh DPoP proof for every request, and
//! transparently recovers from server-issued nonce challenges and invalidated
//! attestation keys.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use attest_auth::api::ReqwestTransport;
//! use attest_auth::attestation::UnsupportedAttestation;
//! use attest_auth::storage::KeyringStorage;
//! use attest_auth::{AuthConfig, AuthSession, RuntimeEnvironment};
//!
//! # async fn run() -> Result<(), attest_auth::AuthError> {
//! let config = AuthConfig::load().expect("configuration");
//! config.init_tracing();
//!
//! let session = AuthSession::new(
//!     config,
//!     RuntimeEnvironment::detect(),
//!     Arc::new(ReqwestTransport::new()?),
//!     Arc::new(KeyringStorage::new()),
//!     // Substitute the platform attestation provider where one exists.
//!     Arc::new(UnsupportedAttestation),
//! );
//!
//! // Per-request headers: a shared bearer token and a one-shot DPoP proof.
//! let context = session
//!     .headers("https://gateway.example.com/v1/chat", "POST", None)
//!     .await?;
//! println!("Authorization: Bearer {}", context.bearer);
//! println!("DPoP: {}", context.dpop);
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! [`AuthSession`] may be cloned freely and called from many tasks. At most
//! one token mint is in flight at a time; concurrent callers attach to it and
//! observe the same outcome. Every `headers` call still signs its own DPoP
//! proof with a unique `jti`.
//!
//! ## Secret handling
//!
//! Bearer values, DPoP proofs, assertions, nonces, and development tokens are
//! treated as sensitive: they are never logged, and diagnostic output carries
//! lengths, thumbprints, and statuses instead.

pub mod api;
pub mod attestation;
pub mod clock;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod error;
pub mod session;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{AuthConfig, ConfigError, RuntimeEnvironment};
pub use dispatch::RequestDispatcher;
pub use error::{AuthError, ServerError, ServerErrorCode};
pub use session::{AccessToken, AuthSession, AuthorizationContext};
