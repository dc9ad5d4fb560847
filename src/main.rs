use std::borrow::Cow;
use std::fs;
use std::io::{self, BufWriter, Write as _};
use std::num::NonZeroUsize;

use gumdrop::Options;

pub mod support;
pub mod common;
pub mod scan;
pub mod filter;

use common::{Config, Dialect, OversizePolicy};
use filter::{Filter, FilterError};
use scan::Scanner;
use support::IoObject;

#[derive(Debug, Options)]
struct Args {

	#[options(free, help = "input dump file; `-` or absent reads stdin")]
	input_file: Option<String>,

	#[options(free, help = "output file; `-` or absent writes stdout")]
	output_file: Option<String>,

	#[options(help = "escape dialect of the dump (standard, extended)",
		default = "standard",
		meta = "NAME",
		parse(try_from_str = "Dialect::try_parse"),
		)]
	dialect: Dialect,

	#[options(help = "longest byte string converted to a hex literal",
		default = "256",
		meta = "BYTES",
		)]
	limit: NonZeroUsize,

	#[options(help = "oversized byte string handling (placeholder, preserve)",
		default = "placeholder",
		meta = "NAME",
		parse(try_from_str = "OversizePolicy::try_parse"),
		)]
	oversize: OversizePolicy,

	#[options(help = "show this help text")]
	help: bool,
}

#[repr(i32)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum ExitCode {
	Success = 0,
	IoError = 1,
	CliArgError = 2,
	InvalidData = 3,
}

impl From<ExitCode> for i32 {
	fn from(src: ExitCode) -> Self {
		src as i32
	}
}


fn main() {
	let (process, args_str) = {
		let mut iter = std::env::args();
		let process = iter.next().map(Cow::Owned).unwrap_or(
			Cow::Borrowed(env!("CARGO_PKG_NAME"))
		);
		(process, iter.collect::<Vec<_>>())
	};
	let args = match Args::parse_args_default(&args_str) {
		Ok(a) if a.help_requested() => {
			eprintln!("Usage: {} [options] [input] [output]", process);
			eprintln!("Convert byte strings in a database dump to hexadecimal literals\n");
			eprintln!("{}", Args::usage());
			std::process::exit(ExitCode::Success.into());
		},
		Ok(a) => a,
		Err(e) => {
			eprintln!("argument error: {}", e);
			eprintln!("run `{} --help` for usage guidelines", process);
			std::process::exit(ExitCode::CliArgError.into());
		},
	};

	std::process::exit(match run(args) {
		Ok(()) => ExitCode::Success.into(),
		Err(e) => {
			eprintln!("error: {}", e);
			let code = match e {
				FilterError::Io(_) => ExitCode::IoError,
				_ => ExitCode::InvalidData,
			};
			code.into()
		},
	});
}

fn run(args: Args) -> Result<(), FilterError> {
	let stdin;
	let stdout;

	let mut stdin_lock;
	let mut stdout_lock;

	let mut input_file;
	let mut output_file;

	let input: IoObject<'_> = match args.input_file.as_deref() {
		None | Some("-") => {
			stdin = io::stdin();
			stdin_lock = stdin.lock();
			&mut stdin_lock
		},
		Some(path) => {
			input_file = fs::File::open(path)?;
			&mut input_file
		},
	};

	let output: &mut dyn io::Write = match args.output_file.as_deref() {
		None | Some("-") => {
			stdout = io::stdout();
			stdout_lock = stdout.lock();
			&mut stdout_lock
		},
		Some(path) => {
			output_file = fs::File::create(path)?;
			&mut output_file
		},
	};
	let mut output = BufWriter::new(output);

	let config = Config {
		dialect: args.dialect,
		limit: args.limit,
		oversize: args.oversize,
	};
	let mut filter = Filter::new(Scanner::new(input, config.limit), config);

	// whatever was already written is flushed even when the run fails
	let result = filter.run(&mut output);
	let flushed = output.flush().map_err(FilterError::from);
	result.and(flushed)
}
