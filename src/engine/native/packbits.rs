//! PackBits run-length coding of plane data.
//!
//! Header byte `n`: 0..=127 copies the next `n + 1` bytes; -127..=-1 repeats
//! the next byte `1 - n` times; -128 is skipped.

use crate::error::{CodecError, SubCode};

const MAX_RUN: usize = 128;

pub(super) fn compress(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / MAX_RUN + 1);
    let mut i = 0;

    while i < input.len() {
        let run = run_length(&input[i..]);
        if run >= 2 {
            out.push((1i16 - run as i16) as i8 as u8);
            out.push(input[i]);
            i += run;
            continue;
        }

        // literal stretch up to the next run of 2 or more
        let start = i;
        while i < input.len() && i - start < MAX_RUN && run_length(&input[i..]) < 2 {
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&input[start..i]);
    }

    out
}

fn run_length(data: &[u8]) -> usize {
    let first = data[0];
    data.iter()
        .take(MAX_RUN)
        .take_while(|&&b| b == first)
        .count()
}

/// Decode exactly `expected_len` bytes.
pub(super) fn decompress(input: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    out.try_reserve_exact(expected_len)
        .map_err(|_| CodecError::out_of_memory("Cannot allocate plane"))?;
    let mut i = 0;

    while i < input.len() {
        let header = input[i] as i8;
        i += 1;
        match header {
            0..=127 => {
                let n = header as usize + 1;
                let literal = input.get(i..i + n).ok_or_else(truncated)?;
                out.extend_from_slice(literal);
                i += n;
            }
            -128 => {}
            _ => {
                let n = (1 - i16::from(header)) as usize;
                let &byte = input.get(i).ok_or_else(truncated)?;
                out.resize(out.len() + n, byte);
                i += 1;
            }
        }
        if out.len() > expected_len {
            break;
        }
    }

    if out.len() != expected_len {
        return Err(CodecError::invalid_input(
            SubCode::END_OF_DATA,
            format!(
                "Compressed plane expands to {} bytes, expected {expected_len}",
                out.len()
            ),
        ));
    }
    Ok(out)
}

fn truncated() -> CodecError {
    CodecError::invalid_input(SubCode::END_OF_DATA, "Truncated compressed plane")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_encoding() {
        // Apple's TN1023 sample
        let raw = b"\xAA\xAA\xAA\x80\x00\x2A\xAA\xAA\xAA\xAA\x80\x00\x2A\x22\xAA\xAA\xAA\xAA\xAA\xAA\xAA\xAA\xAA\xAA";
        let packed = b"\xFE\xAA\x02\x80\x00\x2A\xFD\xAA\x03\x80\x00\x2A\x22\xF7\xAA";
        assert_eq!(decompress(packed, raw.len()).unwrap(), raw);
        assert_eq!(decompress(&compress(raw), raw.len()).unwrap(), raw);
    }

    #[test]
    fn uniform_plane_shrinks() {
        let raw = vec![128u8; 64 * 64];
        let packed = compress(&raw);
        assert!(packed.len() < 100);
        assert_eq!(decompress(&packed, raw.len()).unwrap(), raw);
    }

    #[test]
    fn long_literal_stretch_is_split() {
        let raw: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
        let packed = compress(&raw);
        assert_eq!(packed[0], 127);
        assert_eq!(decompress(&packed, raw.len()).unwrap(), raw);
    }

    #[test]
    fn noop_header_is_skipped() {
        assert_eq!(decompress(b"\x80\x00\x07", 1).unwrap(), [7]);
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(decompress(b"\xFD\x01", 3).is_ok());
        assert!(decompress(b"\xFD\x01", 5).is_err());
        assert!(decompress(b"\x02\x01", 3).is_err());
    }
}
