//! Run configuration shared by the scanner and the filter.

use core::num::NonZeroUsize;

use nonzero_ext::nonzero;

/// Escape-sequence and comment conventions of the tool that produced the
/// dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
	/// Plain dump output: simple backslash escapes, `#` comment lines.
	#[default]
	Standard,

	/// Output of the binary-log dump tool. Adds inline `\xHH` and `\f`
	/// escapes, and `###`-prefixed pseudo-statement lines that must be
	/// lexed despite starting like a comment.
	Extended,
}

impl Dialect {
	pub fn try_parse(input: &str) -> Result<Self, &'static str> {
		match input {
			"standard" | "" => Ok(Self::Standard),
			"extended" => Ok(Self::Extended),
			_ => Err("invalid value for dialect"),
		}
	}

	/// Are `\xHH` and `\f` recognized inside string literals?
	pub(crate) fn extended_escapes(self) -> bool {
		self == Self::Extended
	}

	/// Does a run of three `#` mark a pseudo-statement line?
	pub(crate) fn pseudo_statements(self) -> bool {
		self == Self::Extended
	}
}


/// What to do with a byte string that outgrows the conversion buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversizePolicy {
	/// Replace the buffered prefix with a byte-count marker; the rest of
	/// the literal is copied through unmodified.
	#[default]
	Placeholder,

	/// Emit the whole literal unmodified.
	Preserve,
}

impl OversizePolicy {
	pub fn try_parse(input: &str) -> Result<Self, &'static str> {
		match input {
			"placeholder" | "" => Ok(Self::Placeholder),
			"preserve" => Ok(Self::Preserve),
			_ => Err("invalid value for oversize policy"),
		}
	}
}


pub const DEFAULT_LIMIT: NonZeroUsize = nonzero!(256usize);

#[derive(Debug, Clone, Copy)]
pub struct Config {
	pub dialect: Dialect,
	/// Longest byte string, in source bytes, still eligible for hex
	/// conversion.
	pub limit: NonZeroUsize,
	pub oversize: OversizePolicy,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			dialect: Dialect::default(),
			limit: DEFAULT_LIMIT,
			oversize: OversizePolicy::default(),
		}
	}
}
