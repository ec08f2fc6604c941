//! Base64url encoding helpers (RFC 4648 §5).
//!
//! Encoding never pads; decoding tolerates both padded and unpadded input.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::codec::CodecError;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as unpadded base64url.
pub fn encode(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode base64url input, with or without padding.
pub fn decode(input: &str) -> Result<Vec<u8>, CodecError> {
    URL_SAFE_LENIENT
        .decode(input)
        .map_err(|_| CodecError::InvalidBase64)
}

/// Decode standard-alphabet base64, with or without padding.
///
/// Used as the second step of the challenge-nonce fallback chain.
pub fn decode_standard(input: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD_LENIENT
        .decode(input)
        .map_err(|_| CodecError::InvalidBase64)
}
