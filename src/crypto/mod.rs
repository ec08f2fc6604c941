//! Cryptographic building blocks for the authentication engine.
//!
//! This module provides:
//! - EC public key JWK handling and RFC 7638 thumbprints
//! - The App-Attest client-data hash composition
//! - Device keypair management over the secret store
//! - DPoP proof generation (RFC 9449)

pub mod device_key;
pub mod dpop;
pub mod hashing;
pub mod jwk;

pub use device_key::{
    DeviceKey, DeviceKeyError, DeviceKeyMaterial, DeviceKeyStore, SoftwareDeviceKey,
};
pub use dpop::{DpopClaims, ProofBuilder, ProofError};
pub use hashing::client_data_hash;
pub use jwk::EcPublicJwk;
