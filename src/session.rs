//! The authentication session engine.
//!
//! [`AuthSession`] coordinates the device key, the attestation lifecycle, and
//! the token endpoint into one concurrent state machine: it caches the
//! short-lived access token, coalesces concurrent mints onto a single
//! in-flight operation, recovers from server nonce challenges and invalidated
//! attestation keys, and signs a fresh DPoP proof for every request.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::sync::{watch, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::api::types::{
    AppDescriptor, RegisterRequest, RegistrationAttestation, TokenAttestation, TokenRequest,
    TokenResponse, ATTESTATION_KIND, PLATFORM,
};
use crate::api::transport::HttpTransport;
use crate::api::AuthApiClient;
use crate::attestation::{AttestationError, AttestationProvider};
use crate::clock::{Clock, SystemClock};
use crate::codec::base64url;
use crate::config::{AuthConfig, RuntimeEnvironment};
use crate::crypto::device_key::{DeviceKeyMaterial, DeviceKeyStore};
use crate::crypto::dpop::ProofBuilder;
use crate::crypto::hashing::client_data_hash;
use crate::error::AuthError;
use crate::storage::SecureStorage;

/// A cached token must outlive this margin before reuse.
const FRESHNESS_MARGIN: Duration = Duration::from_secs(60);

/// Bound on the assertion attempt loop: the first try plus one recovery.
const MAX_MINT_ATTEMPTS: u32 = 2;

/// Per-request authorization headers. Produced fresh every time, never
/// cached.
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    /// Value for `Authorization: Bearer <...>`.
    pub bearer: String,
    /// Value for the `DPoP` header, bound to the exact method and URL.
    pub dpop: String,
}

/// Access token held in memory only.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: SystemTime,
    /// Server-reported issuance mode. Surfaced, not acted on.
    pub mode: Option<String>,
}

impl AccessToken {
    fn is_fresh(&self, now: SystemTime) -> bool {
        match self.expires_at.duration_since(now) {
            Ok(remaining) => remaining > FRESHNESS_MARGIN,
            Err(_) => false,
        }
    }
}

type MintOutcome = Result<AccessToken, AuthError>;

struct InFlightMint {
    rx: watch::Receiver<Option<MintOutcome>>,
    abort: AbortHandle,
}

#[derive(Default)]
struct SessionState {
    key: Option<(DeviceKeyMaterial, ProofBuilder)>,
    token: Option<AccessToken>,
    mint: Option<InFlightMint>,
    /// Bumped by `reset()`; a completing mint from an older epoch must not
    /// write its result back.
    epoch: u64,
}

/// The authentication session engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: AuthConfig,
    environment: RuntimeEnvironment,
    api: AuthApiClient,
    key_store: DeviceKeyStore,
    attestation: Arc<dyn AttestationProvider>,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
}

impl AuthSession {
    pub fn new(
        config: AuthConfig,
        environment: RuntimeEnvironment,
        transport: Arc<dyn HttpTransport>,
        storage: Arc<dyn SecureStorage>,
        attestation: Arc<dyn AttestationProvider>,
    ) -> Self {
        Self::with_clock(
            config,
            environment,
            transport,
            storage,
            attestation,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        config: AuthConfig,
        environment: RuntimeEnvironment,
        transport: Arc<dyn HttpTransport>,
        storage: Arc<dyn SecureStorage>,
        attestation: Arc<dyn AttestationProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let api = AuthApiClient::new(transport, &config.base_url);
        let key_store = DeviceKeyStore::new(storage, &config.bundle_identifier);
        Self {
            inner: Arc::new(SessionInner {
                config,
                environment,
                api,
                key_store,
                attestation,
                clock,
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    /// Produce `(bearer, dpop)` for one request.
    ///
    /// Ensures a fresh token (minting if needed, sharing any mint already in
    /// flight), then signs a DPoP proof for exactly this
    /// `(method, url, nonce)`. Token acquisition happens-before proof
    /// construction.
    pub async fn headers(
        &self,
        url: &str,
        method: &str,
        nonce: Option<&str>,
    ) -> Result<AuthorizationContext, AuthError> {
        let token = self.inner.ensure_token().await?;
        let (_, builder) = self.inner.ensure_key().await?;
        let dpop = builder.proof(method, url, nonce)?;
        Ok(AuthorizationContext {
            bearer: token.value,
            dpop,
        })
    }

    /// Ensure a fresh token and return its bearer value.
    pub async fn current_token(&self) -> Result<String, AuthError> {
        Ok(self.inner.ensure_token().await?.value)
    }

    /// Ensure a fresh token and return it in full, including the
    /// server-reported mode.
    pub async fn access_token(&self) -> Result<AccessToken, AuthError> {
        self.inner.ensure_token().await
    }

    /// Cancel any in-flight mint and discard the cached token.
    ///
    /// Device and attestation keys are left untouched.
    pub async fn reset(&self) {
        let mut state = self.inner.state.lock().await;
        state.epoch += 1;
        state.token = None;
        if let Some(mint) = state.mint.take() {
            mint.abort.abort();
            info!("cancelled in-flight token mint");
        }
    }
}

impl SessionInner {
    /// Return a fresh cached token, or mint one, coalescing concurrent
    /// callers onto a single in-flight operation.
    async fn ensure_token(self: &Arc<Self>) -> Result<AccessToken, AuthError> {
        let mut rx = {
            let mut state = self.state.lock().await;

            if let Some(token) = &state.token {
                if token.is_fresh(self.clock.now()) {
                    return Ok(token.clone());
                }
            }

            match &state.mint {
                Some(mint) => mint.rx.clone(),
                None => {
                    let (tx, rx) = watch::channel(None);
                    let epoch = state.epoch;
                    let inner = Arc::clone(self);
                    let task = tokio::spawn(async move {
                        let outcome = inner.mint().await;
                        let mut state = inner.state.lock().await;
                        if state.epoch == epoch {
                            if let Ok(token) = &outcome {
                                state.token = Some(token.clone());
                            }
                            state.mint = None;
                        }
                        drop(state);
                        let _ = tx.send(Some(outcome));
                    });
                    state.mint = Some(InFlightMint {
                        rx: rx.clone(),
                        abort: task.abort_handle(),
                    });
                    rx
                }
            }
        };

        // Wait outside the lock; every attached caller observes the same
        // outcome.
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // The mint task was aborted by reset() before publishing.
                return match rx.borrow().clone() {
                    Some(outcome) => outcome,
                    None => Err(AuthError::TokenMissing),
                };
            }
        }
    }

    /// Load-or-create the device key, caching the derived proof builder.
    async fn ensure_key(
        self: &Arc<Self>,
    ) -> Result<(DeviceKeyMaterial, ProofBuilder), AuthError> {
        {
            let state = self.state.lock().await;
            if let Some(cached) = &state.key {
                return Ok(cached.clone());
            }
        }

        // The key store may block on the platform; stay off the state lock.
        let material = self.key_store.load_or_create()?;
        let builder = ProofBuilder::new(&material);

        let mut state = self.state.lock().await;
        let entry = state.key.get_or_insert((material, builder));
        Ok(entry.clone())
    }

    fn dev_token(&self) -> Option<&str> {
        match self.config.development_token.as_deref() {
            Some(token) if !token.is_empty() => Some(token),
            _ => None,
        }
    }

    /// Mint a fresh access token.
    async fn mint(self: &Arc<Self>) -> Result<AccessToken, AuthError> {
        let (material, builder) = self.ensure_key().await?;

        if let Some(dev_token) = self.dev_token() {
            if self.environment.is_simulator() {
                return self.mint_development(&material, &builder, dev_token).await;
            }
            debug!("development token configured outside the simulator; ignoring it");
        }

        self.mint_attested(&material, &builder).await
    }

    /// Development path: simulator only, no attestation. The same nonce-retry
    /// policy applies.
    async fn mint_development(
        &self,
        material: &DeviceKeyMaterial,
        builder: &ProofBuilder,
        dev_token: &str,
    ) -> Result<AccessToken, AuthError> {
        if !self.environment.is_simulator() {
            return Err(AuthError::Configuration(
                "development token is only honored in the simulator".to_string(),
            ));
        }

        info!("minting access token via development path");
        let request = TokenRequest {
            platform: PLATFORM,
            app: self.app(),
            device_key_jwk: material.jwk().clone(),
            attestation: None,
            dev_token: Some(dev_token.to_string()),
            dpop: String::new(),
        };
        self.post_token(request, builder).await
    }

    /// Production path: challenge → assertion (registering once) → token.
    async fn mint_attested(
        &self,
        material: &DeviceKeyMaterial,
        builder: &ProofBuilder,
    ) -> Result<AccessToken, AuthError> {
        let challenge = self.api.challenge().await?;
        let nonce_bytes = decode_challenge_nonce(&challenge.nonce)?;
        let cdh = client_data_hash(&nonce_bytes, material.jwk().canonical_json().as_bytes());

        for attempt in 1..=MAX_MINT_ATTEMPTS {
            let key_id = self.attestation.ensure_key_id().await?;

            let assertion = match self.attestation.generate_assertion(&key_id, &cdh).await {
                Ok(assertion) => assertion,
                Err(AttestationError::NotAttested) => {
                    self.register(&key_id, &cdh, &challenge.nonce, material, builder)
                        .await?;
                    self.attestation
                        .generate_assertion(&key_id, &cdh)
                        .await
                        .map_err(|e| {
                            AuthError::AttestationFailed(format!(
                                "assertion failed after registration: {e}"
                            ))
                        })?
                }
                Err(AttestationError::InvalidKey) if attempt < MAX_MINT_ATTEMPTS => {
                    warn!("attestation key invalidated; clearing and regenerating");
                    self.attestation.clear().await?;
                    continue;
                }
                Err(AttestationError::InvalidKey) => {
                    return Err(AuthError::AttestationFailed(
                        "attestation key invalidated again after regeneration".to_string(),
                    ));
                }
                Err(other) => return Err(other.into()),
            };

            let request = TokenRequest {
                platform: PLATFORM,
                app: self.app(),
                device_key_jwk: material.jwk().clone(),
                attestation: Some(TokenAttestation {
                    kind: ATTESTATION_KIND,
                    key_id: key_id.clone(),
                    team_id: self.config.team_identifier.clone(),
                    assertion: STANDARD.encode(&assertion),
                }),
                dev_token: None,
                dpop: String::new(),
            };

            match self.post_token(request, builder).await {
                Ok(token) => return Ok(token),
                Err(err) if err.is_registration_required() && attempt < MAX_MINT_ATTEMPTS => {
                    warn!("server requires fresh registration; clearing attestation key");
                    self.attestation.clear().await?;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        // Unreachable: every second attempt returns above.
        Err(AuthError::AttestationFailed(
            "attestation attempts exhausted".to_string(),
        ))
    }

    /// Registration sub-flow: attest the key and register it with the server.
    ///
    /// Any failure here surfaces as `AttestationFailed` and the record is not
    /// marked attested.
    async fn register(
        &self,
        key_id: &str,
        client_data_hash: &[u8],
        challenge_nonce: &str,
        material: &DeviceKeyMaterial,
        builder: &ProofBuilder,
    ) -> Result<(), AuthError> {
        info!("attestation key not registered yet; running one-time registration");

        let attestation_blob = match self.attestation.attest(key_id, client_data_hash).await {
            Ok(blob) => blob,
            Err(AttestationError::Unavailable) => return Err(AuthError::AttestationUnavailable),
            Err(e) => {
                return Err(AuthError::AttestationFailed(format!(
                    "attestation object: {e}"
                )))
            }
        };

        let url = self.api.register_url();
        let dpop = builder.proof("POST", &url, None)?;
        let request = RegisterRequest {
            platform: PLATFORM,
            app: self.app(),
            device_key_jwk: material.jwk().clone(),
            attestation: RegistrationAttestation {
                kind: ATTESTATION_KIND,
                key_id: key_id.to_string(),
                team_id: self.config.team_identifier.clone(),
                attestation: STANDARD.encode(&attestation_blob),
            },
            nonce: challenge_nonce.to_string(),
            dpop: dpop.clone(),
        };

        let response = self
            .api
            .register(&request, &dpop)
            .await
            .map_err(|e| AuthError::AttestationFailed(format!("registration rejected: {e}")))?;
        if !response.registered {
            return Err(AuthError::AttestationFailed(
                "server did not confirm registration".to_string(),
            ));
        }

        self.attestation.mark_attested(key_id).await?;
        debug!("attestation key registered");
        Ok(())
    }

    /// POST `/token`, retrying exactly once on a `DPoP-Nonce` challenge.
    async fn post_token(
        &self,
        mut request: TokenRequest,
        builder: &ProofBuilder,
    ) -> Result<AccessToken, AuthError> {
        let url = self.api.token_url();
        let dpop = builder.proof("POST", &url, None)?;
        request.dpop = dpop.clone();

        let response = match self.api.token(&request, &dpop).await {
            Ok(response) => response,
            Err(err) => {
                let Some(nonce) = err.dpop_nonce().map(str::to_string) else {
                    return Err(err);
                };
                debug!("token endpoint demanded a nonce; retrying once");
                let dpop = builder.proof("POST", &url, Some(&nonce))?;
                request.dpop = dpop.clone();
                self.api.token(&request, &dpop).await?
            }
        };

        Ok(self.token_from_response(response))
    }

    fn token_from_response(&self, response: TokenResponse) -> AccessToken {
        let expires_at = self.clock.now() + Duration::from_secs(response.expires_in);
        info!(
            expires_in = response.expires_in,
            mode = response.mode.as_deref().unwrap_or("prod"),
            "minted access token"
        );
        AccessToken {
            value: response.access_token,
            expires_at,
            mode: response.mode,
        }
    }

    fn app(&self) -> AppDescriptor {
        AppDescriptor {
            bundle_id: self.config.bundle_identifier.clone(),
        }
    }
}

/// Decode a challenge nonce: base64url first, then standard base64, then raw
/// UTF-8 bytes.
fn decode_challenge_nonce(nonce: &str) -> Result<Vec<u8>, AuthError> {
    if let Ok(bytes) = base64url::decode(nonce) {
        return Ok(bytes);
    }
    if let Ok(bytes) = base64url::decode_standard(nonce) {
        return Ok(bytes);
    }
    if !nonce.is_empty() {
        return Ok(nonce.as_bytes().to_vec());
    }
    Err(AuthError::Configuration(
        "challenge nonce could not be decoded".to_string(),
    ))
}
