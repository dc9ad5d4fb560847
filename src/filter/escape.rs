//! Escape decoding and hex rendering of byte-string bodies.

use arrayvec::ArrayVec;
use thiserror::Error;

use crate::common::Dialect;
use crate::support::HexArray;

/// Decode failure inside one literal body. Offsets are relative to the
/// start of the body; the filter rebases them onto the input stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum EscapeError {
	#[error("incomplete escape sequence")]
	Incomplete { at: usize },

	#[error("unexpected escape sequence {}", HexArray(.bytes.as_slice()))]
	Unrecognized { at: usize, bytes: ArrayVec<u8, 2> },

	#[error("expected two hex digits after \\x, got {}", HexArray(.bytes.as_slice()))]
	BadHexDigits { at: usize, bytes: ArrayVec<u8, 4> },
}

/// Decodes the raw body of a byte string and renders it as a hex literal.
///
/// `body` holds the bytes exactly as they appeared between the quotes,
/// escapes unresolved. Every decoded byte becomes two lowercase hex digits;
/// an empty body renders as a bare `0x`, which the close protocol never
/// asks for.
pub(crate) fn encode(body: &[u8], dialect: Dialect) -> Result<String, EscapeError> {
	let mut out = String::with_capacity(2 + body.len() * 2);
	out.push_str("0x");

	let mut i = 0;
	while i < body.len() {
		let (value, consumed) = decode_one(body, i, dialect)?;
		push_hex(&mut out, value);
		i += consumed;
	}
	Ok(out)
}

fn push_hex(out: &mut String, value: u8) {
	const DIGITS: &[u8; 16] = b"0123456789abcdef";
	out.push(DIGITS[usize::from(value >> 4)] as char);
	out.push(DIGITS[usize::from(value & 0x0f)] as char);
}

/// Resolves the byte at `at` to its decoded value and the count of source
/// bytes it spanned.
fn decode_one(body: &[u8], at: usize, dialect: Dialect) -> Result<(u8, usize), EscapeError> {
	let b = body[at];
	if b != b'\\' {
		return Ok((b, 1));
	}

	let esc = match body.get(at + 1) {
		Some(&e) => e,
		None => return Err(EscapeError::Incomplete { at }),
	};
	let value = match esc {
		b'\'' | b'"' | b'\\' => esc,
		// the dump tool writes NUL both ways
		0x00 | b'0' => 0x00,
		b'b' => 0x08,
		b'n' => 0x0a,
		b'r' => 0x0d,
		b't' => 0x09,
		b'Z' => 0x1a,
		b'f' if dialect.extended_escapes() => 0x0c,
		b'x' if dialect.extended_escapes() => return decode_hex_pair(body, at),
		_ => {
			return Err(EscapeError::Unrecognized {
				at,
				bytes: ArrayVec::from([b'\\', esc]),
			});
		},
	};
	Ok((value, 2))
}

fn decode_hex_pair(body: &[u8], at: usize) -> Result<(u8, usize), EscapeError> {
	let bad = || EscapeError::BadHexDigits {
		at,
		bytes: body[at..body.len().min(at + 4)].iter().copied().collect(),
	};
	let hi = body.get(at + 2).copied().and_then(hex_nibble).ok_or_else(bad)?;
	let lo = body.get(at + 3).copied().and_then(hex_nibble).ok_or_else(bad)?;
	Ok(((hi << 4) | lo, 4))
}

fn hex_nibble(b: u8) -> Option<u8> {
	match b {
		b'0'..=b'9' => Some(b - b'0'),
		b'a'..=b'f' => Some(b - b'a' + 10),
		b'A'..=b'F' => Some(b - b'A' + 10),
		_ => None,
	}
}
