//! Byte-level codecs shared by the crypto and wire layers.

pub mod base64url;
pub mod ecdsa;

use thiserror::Error;

/// Errors produced by the byte codecs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input was not valid base64 in the expected alphabet.
    #[error("invalid base64 input")]
    InvalidBase64,

    /// A DER structure did not match the expected shape.
    #[error("invalid signature format: {0}")]
    InvalidFormat(&'static str),
}
