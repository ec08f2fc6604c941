//! DER ECDSA signature conversion.
//!
//! Platform signing APIs return ECDSA signatures as a DER `SEQUENCE` of two
//! `INTEGER`s; the DPoP wire format wants the fixed-width raw `r || s` form.

use crate::codec::CodecError;

const SEQUENCE_TAG: u8 = 0x30;
const INTEGER_TAG: u8 = 0x02;

/// Convert a DER-encoded ECDSA signature into fixed-width raw `r || s`.
///
/// Each component has a single leading sign byte stripped if present and is
/// left-padded with zeros to `coord_octet_len` (32 for P-256). Inputs whose
/// declared lengths do not consume their container exactly are rejected.
pub fn der_to_raw(der: &[u8], coord_octet_len: usize) -> Result<Vec<u8>, CodecError> {
    let (tag, body, rest) = read_tlv(der)?;
    if tag != SEQUENCE_TAG {
        return Err(CodecError::InvalidFormat("expected outer SEQUENCE"));
    }
    if !rest.is_empty() {
        return Err(CodecError::InvalidFormat("trailing bytes after SEQUENCE"));
    }

    let (r, body) = read_integer(body)?;
    let (s, body) = read_integer(body)?;
    if !body.is_empty() {
        return Err(CodecError::InvalidFormat("trailing bytes inside SEQUENCE"));
    }

    let mut raw = Vec::with_capacity(coord_octet_len * 2);
    push_fixed_width(&mut raw, r, coord_octet_len)?;
    push_fixed_width(&mut raw, s, coord_octet_len)?;
    Ok(raw)
}

/// Read one INTEGER, returning its magnitude bytes and the remaining input.
fn read_integer(input: &[u8]) -> Result<(&[u8], &[u8]), CodecError> {
    let (tag, body, rest) = read_tlv(input)?;
    if tag != INTEGER_TAG {
        return Err(CodecError::InvalidFormat("expected INTEGER"));
    }
    if body.is_empty() {
        return Err(CodecError::InvalidFormat("empty INTEGER"));
    }
    // A single leading 0x00 keeps a high-bit component non-negative.
    let body = if body.len() > 1 && body[0] == 0x00 {
        &body[1..]
    } else {
        body
    };
    Ok((body, rest))
}

/// Read a tag-length-value triple, supporting short and one-byte long-form
/// lengths (ECDSA signatures never need more).
fn read_tlv(input: &[u8]) -> Result<(u8, &[u8], &[u8]), CodecError> {
    if input.len() < 2 {
        return Err(CodecError::InvalidFormat("truncated TLV header"));
    }
    let tag = input[0];
    let (len, header_len): (usize, usize) = match input[1] {
        n @ 0x00..=0x7f => (n as usize, 2),
        0x81 => {
            if input.len() < 3 {
                return Err(CodecError::InvalidFormat("truncated long-form length"));
            }
            (input[2] as usize, 3)
        }
        _ => return Err(CodecError::InvalidFormat("unsupported length encoding")),
    };
    let end = header_len
        .checked_add(len)
        .ok_or(CodecError::InvalidFormat("length overflow"))?;
    if input.len() < end {
        return Err(CodecError::InvalidFormat("declared length overruns input"));
    }
    Ok((tag, &input[header_len..end], &input[end..]))
}

fn push_fixed_width(out: &mut Vec<u8>, component: &[u8], width: usize) -> Result<(), CodecError> {
    if component.len() > width {
        return Err(CodecError::InvalidFormat(
            "component longer than coordinate width",
        ));
    }
    out.resize(out.len() + (width - component.len()), 0);
    out.extend_from_slice(component);
    Ok(())
}
