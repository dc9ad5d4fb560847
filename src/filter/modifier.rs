//! Staged recognition of the `binary` string-argument modifier.
//!
//! `_binary 'abc'` marks its argument as a byte string regardless of
//! content. Until the opening quote is seen the whole prefix is
//! speculative: underscores, keyword bytes and trailing whitespace are all
//! staged rather than emitted, then discarded if the modifier matches or
//! replayed byte-for-byte if it does not.

use std::io;

use arrayvec::ArrayVec;

/// The modifier keyword, matched case-insensitively.
const KEYWORD: &[u8] = b"binary";

/// What [`ModifierCursor::push`] did with a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Push {
	/// Staged; the caller must not emit it.
	Eaten,
	/// The keyword is complete with a valid prefix; a string argument may
	/// follow.
	Matched,
	/// Not part of a modifier. Anything staged has been replayed and the
	/// byte is the caller's to handle.
	Unclaimed,
}

#[derive(Debug, Default)]
pub(super) struct ModifierCursor {
	/// `_` bytes seen before the keyword.
	underscores: usize,
	/// Keyword prefix matched so far, in the case it actually appeared.
	matched: ArrayVec<u8, { KEYWORD.len() }>,
	/// Whitespace between the matched keyword and its argument.
	whitespace: Vec<u8>,
}

impl ModifierCursor {
	/// Offers a plain-text byte to the cursor.
	///
	/// On a failed match the staged bytes are replayed and the byte is
	/// retried once against an empty cursor, since the byte that breaks one
	/// match can begin another (`bbinary` still ends in a valid modifier).
	pub fn push<W: io::Write>(&mut self, b: u8, out: &mut W) -> io::Result<Push> {
		if b == b'_' && self.matched.is_empty() {
			self.underscores += 1;
			return Ok(Push::Eaten);
		}

		if self.next_keyword_byte(b) {
			self.matched.push(b);
			if !self.matched.is_full() {
				return Ok(Push::Eaten);
			}
			// at most one underscore may prefix the modifier
			if self.underscores <= 1 {
				return Ok(Push::Matched);
			}
			self.replay(out)?;
			return Ok(Push::Eaten);
		}

		if self.is_empty() {
			return Ok(Push::Unclaimed);
		}
		self.replay(out)?;
		self.push(b, out)
	}

	/// Stages a whitespace byte seen between the keyword and its argument.
	pub fn eat_whitespace(&mut self, b: u8) {
		self.whitespace.push(b);
	}

	pub fn is_empty(&self) -> bool {
		self.underscores == 0 && self.matched.is_empty() && self.whitespace.is_empty()
	}

	/// Writes every staged byte back out unchanged and resets the cursor.
	pub fn replay<W: io::Write>(&mut self, out: &mut W) -> io::Result<()> {
		for _ in 0..self.underscores {
			out.write_all(b"_")?;
		}
		out.write_all(&self.matched)?;
		out.write_all(&self.whitespace)?;
		self.discard();
		Ok(())
	}

	/// Drops the staged bytes; the modifier matched and is consumed.
	pub fn discard(&mut self) {
		self.underscores = 0;
		self.matched.clear();
		self.whitespace.clear();
	}

	fn next_keyword_byte(&self, b: u8) -> bool {
		// ASCII case folding is enough; the keyword is all letters
		KEYWORD.get(self.matched.len()).map(|&k| (b | 0x20) == k) == Some(true)
	}
}
