//! The streaming rewriter: a byte-at-a-time lexer that finds quoted byte
//! strings in dump output and re-emits them as hex literals.
//!
//! Everything else in the stream (statement text, comments, printable
//! string literals) is copied through unchanged. The lexer never looks
//! ahead in the stream and never buffers more than one literal body, capped
//! at the configured limit, so memory stays bounded no matter what the
//! input looks like.

use std::convert::Infallible;
use std::io;

use arrayvec::ArrayVec;
use thiserror::Error;

use crate::common::{Config, OversizePolicy};
use crate::support::{HexArray, NextByte};

mod escape;
mod modifier;

use escape::EscapeError;
use modifier::{ModifierCursor, Push};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
	#[error("incomplete escape sequence at byte {offset}")]
	IncompleteEscape { offset: u64 },

	#[error("unexpected escape sequence {} at byte {offset}", HexArray(.bytes.as_slice()))]
	InvalidEscapeSequence { offset: u64, bytes: ArrayVec<u8, 2> },

	#[error("expected two hex digits after \\x at byte {offset}, got {}", HexArray(.bytes.as_slice()))]
	InvalidHexEscape { offset: u64, bytes: ArrayVec<u8, 4> },

	#[error("input ended inside a string literal opened at byte {offset}")]
	UnexpectedEof { offset: u64 },

	#[error("io error: {0}")]
	Io(String),
}

impl From<io::Error> for FilterError {
	fn from(e: io::Error) -> Self {
		Self::Io(e.to_string())
	}
}

impl From<Infallible> for FilterError {
	fn from(e: Infallible) -> Self {
		match e {}
	}
}


/// The quote that opened the literal being scanned, plus enough trailing
/// context to spot its unescaped closing partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QuoteContext {
	/// `'` or `"`.
	quote: u8,
	/// Consecutive backslashes immediately before the current byte.
	backslashes: u32,
}

impl QuoteContext {
	#[inline]
	fn new(quote: u8) -> Self {
		Self { quote, backslashes: 0 }
	}

	/// A matching quote terminates the literal only behind an even run of
	/// backslashes.
	fn closes(&self, b: u8) -> bool {
		b == self.quote && self.backslashes % 2 == 0
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
	/// Ordinary statement text, copied through unchanged.
	Text,
	/// A complete `binary` modifier is waiting for its string argument.
	AwaitingArgument,
	/// Inside a literal that has held nothing but printable bytes so far.
	Quoted(QuoteContext),
	/// Inside a literal known to hold binary content. Promotion from
	/// `Quoted` is one-way; the literal stays binary until it closes.
	Binary(QuoteContext),
	/// Just seen a backslash in a `Quoted` literal (extended dialect); the
	/// next byte decides whether an inline hex escape makes it binary.
	Escape(QuoteContext),
	/// Copying an oversized literal through to its closing quote.
	Raw(QuoteContext),
}


/// One-shot streaming rewriter. Pulls bytes from `src`, writes the
/// transformed stream to the sink handed to [`run`](Self::run).
#[derive(Debug)]
pub struct Filter<I> {
	src: I,
	config: Config,
	state: LexState,
	/// Raw bytes of the literal being scanned, escapes unresolved.
	/// Capacity is reserved once and the buffer reused between literals.
	buf: Vec<u8>,
	modifier: ModifierCursor,
	/// Offset of the byte currently being consumed.
	offset: u64,
	/// Offset of the first content byte of the current literal.
	literal_start: u64,
	/// The previous byte ended a line, so a `#` here opens a comment.
	at_line_start: bool,
	in_comment: bool,
	/// Consecutive `#` bytes opening a comment (extended dialect only).
	hash_run: u32,
}

impl<I> Filter<I>
where I: NextByte, FilterError: From<<I as NextByte>::Error> {
	pub fn new(src: I, config: Config) -> Self {
		Self {
			src,
			config,
			state: LexState::Text,
			buf: Vec::with_capacity(config.limit.get()),
			modifier: ModifierCursor::default(),
			offset: 0,
			literal_start: 0,
			at_line_start: true,
			in_comment: false,
			hash_run: 0,
		}
	}

	/// Runs the stream to completion, writing the rewritten bytes to `out`.
	/// Stops at the first decode or I/O error; there is no resuming.
	pub fn run<W: io::Write>(&mut self, out: &mut W) -> Result<(), FilterError> {
		while let Some(b) = self.src.next_byte()? {
			match self.state {
				LexState::Text => self.text_byte(b, out)?,
				LexState::AwaitingArgument => self.argument_byte(b, out)?,
				state @ (LexState::Quoted(_) | LexState::Binary(_) | LexState::Escape(_))
					=> self.literal_byte(state, b, out)?,
				LexState::Raw(ctx) => self.raw_byte(ctx, b, out)?,
			}

			if b == b'\n' {
				self.at_line_start = true;
				self.in_comment = false;
			} else {
				self.at_line_start = false;
			}
			self.offset += 1;
		}
		self.finish(out)
	}

	fn text_byte<W: io::Write>(&mut self, b: u8, out: &mut W) -> Result<(), FilterError> {
		// full-line comments are copied through untouched
		if self.at_line_start && b == b'#' {
			self.in_comment = true;
			if self.config.dialect.pseudo_statements() {
				self.hash_run = 1;
			}
			out.write_all(&[b])?;
			return Ok(());
		}
		if self.in_comment {
			if self.hash_run > 0 {
				if b == b'#' {
					self.hash_run += 1;
				} else {
					// a `###` line is a pseudo-statement, not a comment:
					// resume lexing after the marker byte passes through
					if self.hash_run == 3 {
						self.in_comment = false;
					}
					self.hash_run = 0;
				}
			}
			out.write_all(&[b])?;
			return Ok(());
		}

		match self.modifier.push(b, out)? {
			Push::Eaten => Ok(()),
			Push::Matched => {
				self.state = LexState::AwaitingArgument;
				Ok(())
			},
			Push::Unclaimed => {
				if let b'\'' | b'"' = b {
					self.open_literal(b, LexState::Quoted);
					Ok(())
				} else {
					Ok(out.write_all(&[b])?)
				}
			},
		}
	}

	fn argument_byte<W: io::Write>(&mut self, b: u8, out: &mut W) -> Result<(), FilterError> {
		if b.is_ascii_whitespace() {
			self.modifier.eat_whitespace(b);
			return Ok(());
		}
		if let b'\'' | b'"' = b {
			// the modifier matched; its bytes stay staged until the close
			// protocol learns whether the argument was empty
			self.open_literal(b, LexState::Binary);
			return Ok(());
		}
		// no string argument follows, so this was never a modifier
		self.modifier.replay(out)?;
		self.state = LexState::Text;
		self.text_byte(b, out)
	}

	fn open_literal(&mut self, quote: u8, state: fn(QuoteContext) -> LexState) {
		self.state = state(QuoteContext::new(quote));
		self.literal_start = self.offset + 1;
	}

	fn literal_byte<W: io::Write>(&mut self, state: LexState, b: u8, out: &mut W)
	-> Result<(), FilterError> {
		use LexState::*;

		// resolve the escape lookahead: `\x` means the literal holds
		// encoded binary content, anything else reads on as plain text
		let mut state = match state {
			Escape(ctx) if b == b'x' => Binary(ctx),
			Escape(ctx) => Quoted(ctx),
			other => other,
		};

		if let Quoted(ctx) = state {
			if b < 0x20 || b == 0x7f {
				// a non-printable byte makes this a byte string for good
				state = Binary(ctx);
			} else if b == b'\\' && self.config.dialect.extended_escapes() {
				state = Escape(ctx);
			}
		}

		let ctx = match &mut state {
			Quoted(ctx) | Binary(ctx) | Escape(ctx) => ctx,
			Text | AwaitingArgument | Raw(_) => unreachable!("no literal being scanned"),
		};

		if b == b'\\' {
			ctx.backslashes += 1;
		} else if ctx.closes(b) {
			let quote = ctx.quote;
			let binary = matches!(state, Binary(_));
			return self.close_literal(quote, binary, out);
		} else {
			ctx.backslashes = 0;
		}

		if self.buf.len() == self.config.limit.get() {
			let ctx = *ctx;
			let keep_prefix = matches!(state, Quoted(_))
				|| self.config.oversize == OversizePolicy::Preserve;
			return self.overflow_literal(ctx, keep_prefix, b, out);
		}

		self.buf.push(b);
		self.state = state;
		Ok(())
	}

	/// Ends the literal and emits its replacement form.
	fn close_literal<W: io::Write>(&mut self, quote: u8, binary: bool, out: &mut W)
	-> Result<(), FilterError> {
		if self.buf.is_empty() {
			// an empty argument leaves a matched modifier with nothing to
			// claim; put its bytes back
			self.modifier.replay(out)?;
			out.write_all(&[quote, quote])?;
		} else if binary {
			let hex = escape::encode(&self.buf, self.config.dialect)
				.map_err(|e| self.rebase(e))?;
			self.modifier.discard();
			out.write_all(hex.as_bytes())?;
		} else {
			out.write_all(&[quote])?;
			out.write_all(&self.buf)?;
			out.write_all(&[quote])?;
		}

		self.buf.clear();
		self.state = LexState::Text;
		Ok(())
	}

	/// The literal outgrew the conversion buffer: emit what the policy
	/// allows and fall back to copying the rest through raw.
	fn overflow_literal<W: io::Write>(
		&mut self,
		ctx: QuoteContext,
		keep_prefix: bool,
		b: u8,
		out: &mut W,
	) -> Result<(), FilterError> {
		self.modifier.replay(out)?;
		out.write_all(&[ctx.quote])?;
		if keep_prefix {
			out.write_all(&self.buf)?;
		} else {
			write!(out, "<byte string: {} bytes>", self.buf.len())?;
		}
		out.write_all(&[b])?;

		self.buf.clear();
		self.state = LexState::Raw(ctx);
		Ok(())
	}

	fn raw_byte<W: io::Write>(&mut self, mut ctx: QuoteContext, b: u8, out: &mut W)
	-> Result<(), FilterError> {
		if b == b'\\' {
			ctx.backslashes += 1;
		} else if ctx.closes(b) {
			self.state = LexState::Text;
			out.write_all(&[b])?;
			return Ok(());
		} else {
			ctx.backslashes = 0;
		}
		self.state = LexState::Raw(ctx);
		out.write_all(&[b])?;
		Ok(())
	}

	/// End of input. Only plain text (or a modifier still waiting for an
	/// argument that never came) may be left behind.
	fn finish<W: io::Write>(&mut self, out: &mut W) -> Result<(), FilterError> {
		match self.state {
			LexState::Text | LexState::AwaitingArgument => {
				self.modifier.replay(out)?;
				Ok(())
			},
			LexState::Escape(_) => Err(FilterError::IncompleteEscape {
				offset: self.offset - 1,
			}),
			LexState::Quoted(ctx) | LexState::Binary(ctx) if ctx.backslashes % 2 == 1 => {
				// the stream ends on a dangling backslash
				Err(FilterError::IncompleteEscape { offset: self.offset - 1 })
			},
			LexState::Quoted(_) | LexState::Binary(_) | LexState::Raw(_) => {
				Err(FilterError::UnexpectedEof { offset: self.literal_start - 1 })
			},
		}
	}

	/// Maps a body-relative decode error onto the input stream. Body byte
	/// `i` came from stream offset `literal_start + i`: literal bytes are
	/// buffered in order with nothing skipped.
	fn rebase(&self, e: EscapeError) -> FilterError {
		let abs = |at: usize| self.literal_start + at as u64;
		match e {
			EscapeError::Incomplete { at } =>
				FilterError::IncompleteEscape { offset: abs(at) },
			EscapeError::Unrecognized { at, bytes } =>
				FilterError::InvalidEscapeSequence { offset: abs(at), bytes },
			EscapeError::BadHexDigits { at, bytes } =>
				FilterError::InvalidHexEscape { offset: abs(at), bytes },
		}
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::common::Dialect;

	use nonzero_ext::nonzero;

	fn run_filter(config: Config, src: &[u8]) -> Result<Vec<u8>, FilterError> {
		let mut out = Vec::new();
		Filter::new(src.iter(), config).run(&mut out).map(|()| out)
	}

	#[track_caller]
	fn check_with(config: Config, expected: &[u8], src: &[u8]) {
		assert_hex::assert_eq_hex!(Ok(expected.to_vec()), run_filter(config, src));
	}

	#[track_caller]
	fn check(expected: &[u8], src: &[u8]) {
		check_with(Config::default(), expected, src);
	}

	fn extended() -> Config {
		Config { dialect: Dialect::Extended, ..Config::default() }
	}

	#[test]
	fn plain_text_passes_through() {
		check(b"SELECT 1;\n", b"SELECT 1;\n");
		check(b"", b"");
	}

	#[test]
	fn printable_literals_untouched() {
		check(b"INSERT INTO t VALUES ('abc', \"d ef\");", b"INSERT INTO t VALUES ('abc', \"d ef\");");
	}

	#[test]
	fn nonprintable_byte_converts() {
		check(b"0x610162", b"'a\x01b'");
		check(b"0x7f", b"\"\x7f\"");
	}

	#[test]
	fn escapes_decode_once_binary() {
		// the NUL forces conversion; escaped quote and backslash decode
		check(b"0x61275c00", b"'a\\'\\\\\x00'");
	}

	#[test]
	fn backslash_escapes_alone_stay_textual() {
		// every byte is printable, so nothing marks this as binary
		check(b"'\\n\\0'", b"'\\n\\0'");
	}

	#[test]
	fn inline_hex_marks_binary() {
		check_with(extended(), b"0x410042", b"'\\x41\\x00B'");
		// `\x` after an escaped backslash still reads as a hex escape
		// marker, matching the dump tool's own lexer
		check_with(extended(), b"0x5c78", b"'\\\\x'");
	}

	#[test]
	fn escaped_quote_does_not_close() {
		check(b"0x00612764", b"'\x00a\\'d'");
		check(b"'ab\\\\'", b"'ab\\\\'");
	}

	#[test]
	fn empty_literals() {
		check(b"''", b"''");
		check(b"\"\"", b"\"\"");
		check(b"_binary ''", b"_binary ''");
	}

	#[test]
	fn modifier_promotes_printable_argument() {
		check(b"0x6162", b"_binary 'ab'");
		check(b"0x6162", b"BINARY \"ab\"");
		check(b"x = 0x0a;", b"x = _binary '\\n';");
	}

	#[test]
	fn modifier_whitespace_spans_lines() {
		check(b"0x61", b"_binary\n\t'a'");
	}

	#[test]
	fn failed_modifier_replays_verbatim() {
		check(b"_binaryx", b"_binaryx");
		check(b"_binary = 1", b"_binary = 1");
		check(b"__binary 'ab'", b"__binary 'ab'");
		check(b"_binary", b"_binary");
	}

	#[test]
	fn modifier_restarts_on_breaking_byte() {
		check(b"b0x1a", b"bbinary '\\Z'");
	}

	#[test]
	fn comments_pass_through() {
		check(b"# quotes 'a\x01b' do nothing here\n", b"# quotes 'a\x01b' do nothing here\n");
		// lexing resumes on the next line
		check(b"#c\n0x01", b"#c\n'\x01'");
	}

	#[test]
	fn hash_mid_line_is_plain_text() {
		check(b"a # 0x01", b"a # '\x01'");
	}

	#[test]
	fn pseudo_statement_lexes_after_marker() {
		check_with(extended(), b"### SET x = 0x6101\n", b"### SET x = 'a\x01'\n");
		// standard dialect keeps the whole line as a comment
		check(b"### SET x = 'a\x01'\n", b"### SET x = 'a\x01'\n");
		// more than three hashes stays a comment in either dialect
		check_with(extended(), b"#### 'a\x01'\n", b"#### 'a\x01'\n");
	}

	#[test]
	fn literal_exactly_at_limit_converts() {
		let config = Config { limit: nonzero!(4usize), ..Config::default() };
		check_with(config, b"0x01616263", b"'\x01abc'");
	}

	#[test]
	fn oversized_textual_literal_is_never_marked() {
		let config = Config { limit: nonzero!(4usize), ..Config::default() };
		check_with(config, b"'abcdef'", b"'abcdef'");
	}

	#[test]
	fn oversized_binary_literal_placeholder() {
		let config = Config { limit: nonzero!(4usize), ..Config::default() };
		check_with(config, b"'<byte string: 4 bytes>ef'", b"'ab\x01def'");
	}

	#[test]
	fn oversized_binary_literal_preserved() {
		let config = Config {
			limit: nonzero!(4usize),
			oversize: OversizePolicy::Preserve,
			..Config::default()
		};
		check_with(config, b"'ab\x01def'", b"'ab\x01def'");
	}

	#[test]
	fn oversized_modifier_argument_replays_the_modifier() {
		let config = Config { limit: nonzero!(2usize), ..Config::default() };
		check_with(config, b"_binary '<byte string: 2 bytes>cd'", b"_binary 'abcd'");
	}

	#[test]
	fn escaped_quote_in_raw_passthrough() {
		let config = Config {
			limit: nonzero!(2usize),
			oversize: OversizePolicy::Preserve,
			..Config::default()
		};
		check_with(config, b"'\x01b\\'c'", b"'\x01b\\'c'");
	}

	#[test]
	fn idempotent_over_own_output() {
		let src = b"INSERT INTO t VALUES (_binary 'a\x02', 'text', \"\x7f\");\n";
		let first = run_filter(Config::default(), src).unwrap();
		let second = run_filter(Config::default(), &first).unwrap();
		assert_hex::assert_eq_hex!(first, second);
	}

	#[test]
	fn unknown_escape_reports_stream_offset() {
		// buffer index 1 of a literal whose body starts at offset 4
		assert_eq!(
			Err(FilterError::InvalidEscapeSequence {
				offset: 5,
				bytes: ArrayVec::from([b'\\', b'q']),
			}),
			run_filter(Config::default(), b"ab '\x01\\q'")
		);
	}

	#[test]
	fn bad_hex_digits_report_stream_offset() {
		assert_eq!(
			Err(FilterError::InvalidHexEscape {
				offset: 1,
				bytes: b"\\xZZ".iter().copied().collect(),
			}),
			run_filter(extended(), b"'\\xZZ'")
		);
	}

	#[test]
	fn dangling_backslash_at_end_of_input() {
		// state machine catches this before any literal is emitted
		assert_eq!(
			Err(FilterError::IncompleteEscape { offset: 1 }),
			run_filter(Config::default(), b"'\\")
		);
		assert_eq!(
			Err(FilterError::IncompleteEscape { offset: 1 }),
			run_filter(extended(), b"'\\")
		);
		assert_eq!(
			Err(FilterError::IncompleteEscape { offset: 3 }),
			run_filter(Config::default(), b"ab'\\")
		);
	}

	#[test]
	fn escaped_quote_then_eof_is_unterminated() {
		// `\'` escapes the would-be terminator, so the literal never closes
		assert_eq!(
			Err(FilterError::UnexpectedEof { offset: 0 }),
			run_filter(Config::default(), b"'\\\x00\\'")
		);
	}

	#[test]
	fn unterminated_literal_names_opening_quote() {
		assert_eq!(
			Err(FilterError::UnexpectedEof { offset: 0 }),
			run_filter(Config::default(), b"'abc")
		);
		assert_eq!(
			Err(FilterError::UnexpectedEof { offset: 2 }),
			run_filter(Config::default(), b"x\n\"a\x01")
		);
	}

	#[test]
	fn runs_over_a_chunked_scanner() {
		use crate::scan::Scanner;

		let src = b"v = _binary 'a\x00b';\n# done\n";
		let scanner = Scanner::new(std::io::Cursor::new(&src[..]), nonzero!(4usize));
		let mut out = Vec::new();
		Filter::new(scanner, Config::default()).run(&mut out).unwrap();
		assert_hex::assert_eq_hex!(b"v = 0x610062;\n# done\n".to_vec(), out);
	}
}
