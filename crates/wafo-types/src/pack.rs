//! Little-endian packing, 4-byte alignment and WAT string escapes.
//!
//! Every multi-byte value in shared memory is a little-endian 32-bit cell.
//! In the dictionary source these cells are written as WAT string escapes,
//! e.g. `0x2a` packs to `"\2a\00\00\00"`.

use crate::error::PackError;
use crate::Result;

/// Pack `n` into a 32-bit little-endian cell.
///
/// Values outside the 32-bit range are truncated to their low 32 bits, so
/// negative numbers produce their two's-complement bytes.
pub fn pack_le(n: i64) -> [u8; 4] {
    (n as u32).to_le_bytes()
}

/// Unpack up to four little-endian bytes into an unsigned cell.
pub fn unpack_le(bytes: &[u8]) -> Result<u32> {
    if bytes.len() > 4 {
        return Err(PackError::TooWide(bytes.len()));
    }
    Ok(bytes
        .iter()
        .rev()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
}

/// Unpack a full cell as a signed value.
pub fn unpack_le_signed(bytes: [u8; 4]) -> i32 {
    i32::from_le_bytes(bytes)
}

/// Pack `n` and render it as a WAT escape string (`\xx\xx\xx\xx`).
pub fn pack_escaped(n: i64) -> String {
    pack_le(n).iter().map(|b| format!("\\{b:02x}")).collect()
}

/// Decode a WAT-escaped cell back into its unsigned value.
///
/// Raw (unescaped) characters contribute their byte value.
pub fn unpack_escaped(text: &str) -> Result<u32> {
    unpack_le(&unescape_wat(text)?)
}

/// Escape raw bytes for a WAT string literal.
pub fn escape_wat(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\5c"),
            b'"' => out.push_str("\\22"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{b:02x}")),
        }
    }
    out
}

/// Decode the escapes of a WAT string literal body.
pub fn unescape_wat(text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        let Some(&first) = bytes.get(i + 1) else {
            return Err(PackError::UnterminatedEscape(i));
        };
        let decoded = match first {
            b'n' => Some(b'\n'),
            b't' => Some(b'\t'),
            b'r' => Some(b'\r'),
            b'"' => Some(b'"'),
            b'\'' => Some(b'\''),
            b'\\' => Some(b'\\'),
            _ => None,
        };
        if let Some(d) = decoded {
            out.push(d);
            i += 2;
            continue;
        }
        let Some(&second) = bytes.get(i + 2) else {
            return Err(PackError::UnterminatedEscape(i));
        };
        match (hex_digit(first), hex_digit(second)) {
            (Some(hi), Some(lo)) => out.push((hi << 4) | lo),
            _ => {
                return Err(PackError::InvalidEscape {
                    escape: String::from_utf8_lossy(&bytes[i + 1..i + 3]).into_owned(),
                    at: i,
                })
            }
        }
        i += 3;
    }
    Ok(out)
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Round `n` up to the next multiple of 4.
pub fn align4(n: u32) -> u32 {
    (n + 3) & !3
}

/// Width of the space-padded name field that follows the length byte.
///
/// Length byte plus name always fill whole 4-byte cells.
pub fn padded_name_len(name_len: usize) -> usize {
    align4(1 + name_len as u32) as usize - 1
}

/// Render `n` as lowercase hex, with a leading `-` for negative values.
pub fn to_hex(n: i64) -> String {
    if n < 0 {
        format!("-0x{:x}", n.unsigned_abs())
    } else {
        format!("0x{n:x}")
    }
}

/// Parse a decimal or `0x`-prefixed hex integer, optionally negated.
pub fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        if !digits.bytes().all(|b| b.is_ascii_digit()) || digits.is_empty() {
            return None;
        }
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -value } else { value })
}
