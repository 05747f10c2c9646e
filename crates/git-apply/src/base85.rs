//! RFC1924-style base-85 encoding for `GIT binary patch` payloads, and the
//! zlib inflate/deflate step that sits on top of it.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{ApplyError, Result};

const BASE85_CHARS: &[u8] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz!#$%&()*+-;<=>?@^_`{|}~";

/// Decode one base-85 data line's length byte into the number of raw bytes
/// it represents, enforcing the bound `max_byte_length - 3 <= n <= max_byte_length`
/// that a 5-digit base-85 group (4 decoded bytes, possibly zero-padded) allows.
fn decode_length_byte(b: u8, max_byte_length: usize) -> Result<usize> {
    let n = match b {
        b'A'..=b'Z' => (b - b'A') as usize + 1,
        b'a'..=b'z' => (b - b'a') as usize + 27,
        _ => {
            return Err(ApplyError::Parse {
                line: 0,
                reason: format!("invalid base85 length byte {b:#x}"),
            })
        }
    };
    if n > max_byte_length || n + 3 < max_byte_length {
        return Err(ApplyError::Parse {
            line: 0,
            reason: format!(
                "base85 length byte {n} out of range for remaining {max_byte_length} bytes"
            ),
        });
    }
    Ok(n)
}

fn encode_length_byte(n: usize) -> u8 {
    if n <= 26 {
        b'A' + n as u8 - 1
    } else {
        b'a' + n as u8 - 27
    }
}

/// Decode a single base-85 data line (length byte + 5k digits) into raw bytes.
/// `remaining` is how many undecoded bytes of the overall payload are left,
/// used to validate the declared length byte.
pub fn decode_line(line: &[u8], remaining: usize) -> Result<Vec<u8>> {
    if line.is_empty() {
        return Err(ApplyError::Parse {
            line: 0,
            reason: "empty base85 line".into(),
        });
    }
    let declared = decode_length_byte(line[0], remaining.min(52))?;
    let digits = &line[1..];
    if digits.len() % 5 != 0 {
        return Err(ApplyError::Parse {
            line: 0,
            reason: "base85 data not a multiple of 5 digits".into(),
        });
    }

    let mut out = Vec::with_capacity(digits.len() / 5 * 4);
    for group in digits.chunks(5) {
        let mut acc: u64 = 0;
        for &c in group {
            let v = BASE85_CHARS
                .iter()
                .position(|&x| x == c)
                .ok_or_else(|| ApplyError::Parse {
                    line: 0,
                    reason: format!("invalid base85 digit {c:#x}"),
                })? as u64;
            acc = acc * 85 + v;
        }
        out.extend_from_slice(&acc.to_be_bytes()[4..8]);
    }
    out.truncate(declared);
    Ok(out)
}

/// Encode raw bytes into base-85 data lines (used by `--build-fake-ancestor`
/// style round-trips and by tests constructing fixtures).
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(52) {
        out.push(encode_length_byte(chunk.len()));
        for group in chunk.chunks(4) {
            let mut buf = [0u8; 4];
            buf[..group.len()].copy_from_slice(group);
            let mut acc = u32::from_be_bytes(buf) as u64;
            let mut digits = [0u8; 5];
            for i in (0..5).rev() {
                digits[i] = BASE85_CHARS[(acc % 85) as usize];
                acc /= 85;
            }
            out.extend_from_slice(&digits);
        }
        out.push(b'\n');
    }
    out
}

/// Inflate a deflate-compressed buffer to exactly `original_length` bytes.
pub fn inflate(compressed: &[u8], original_length: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut out = Vec::with_capacity(original_length);
    decoder.read_to_end(&mut out)?;
    if out.len() != original_length {
        return Err(ApplyError::Parse {
            line: 0,
            reason: format!(
                "inflated size mismatch: declared {original_length}, got {}",
                out.len()
            ),
        });
    }
    Ok(out)
}

/// Deflate a buffer (used when constructing test fixtures / fake ancestors).
pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("in-memory write cannot fail");
    encoder.finish().expect("in-memory finish cannot fail")
}
