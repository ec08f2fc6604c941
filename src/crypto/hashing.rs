//! Hash composition for App-Attest client data.

use sha2::{Digest, Sha256};

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// App-Attest client-data hash: `SHA256(nonce || SHA256(canonical_jwk))`.
///
/// The inner hash commits the artifact to the device public key; the outer
/// hash binds it to the server challenge.
pub fn client_data_hash(nonce: &[u8], canonical_jwk: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(Sha256::digest(canonical_jwk));
    hasher.finalize().into()
}
