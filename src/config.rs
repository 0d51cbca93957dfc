//! Parses `std::env::args()` into a [`Config`], the way the teacher's own
//! CLI driver hand-rolls its flag loop over a peekable args iterator rather
//! than pulling in a derive-based parser crate.

use std::env::Args;
use std::iter::{Peekable, Skip};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineEnding {
	Lf,
	Crlf,
}

impl LineEnding {
	pub fn as_str(self) -> &'static str {
		match self {
			LineEnding::Lf => "\n",
			LineEnding::Crlf => "\r\n",
		}
	}
}

#[derive(Debug, Default)]
pub struct Config {
	pub inputs: Vec<String>,
	pub output: Option<String>,
	pub var_files: Vec<String>,
	pub whitelist: Vec<String>,
	pub blacklist: Vec<String>,
	pub preserve_indent: bool,
	pub line_ending: Option<LineEnding>,
	pub stats: bool,
	pub verbose: bool,
	pub trace: bool,
	pub check: bool,
	pub serial: bool,
	pub prefixes: Vec<String>,
}

type ArgIter = Peekable<Skip<Args>>;

fn expect_value(flag: &str, args: &mut ArgIter) -> Result<String, String> {
	match args.next() {
		Some(value) if !value.starts_with('-') || value == "-" => Ok(value),
		Some(value) => Err(format!("expected a value after '{flag}', found '{value}'")),
		None => Err(format!("expected a value after '{flag}'")),
	}
}

impl Config {
	pub fn parse() -> Result<Self, String> {
		Self::parse_from(std::env::args())
	}

	fn parse_from(full_args: Args) -> Result<Self, String> {
		let mut cfg = Config::default();
		let mut args: ArgIter = full_args.skip(1).peekable();

		while let Some(arg) = args.next() {
			match arg.as_str() {
				"-i" | "--input" => cfg.inputs.push(expect_value(&arg, &mut args)?),
				"-o" | "--output" => cfg.output = Some(expect_value(&arg, &mut args)?),
				"--var-file" => cfg.var_files.push(expect_value(&arg, &mut args)?),
				"--whitelist" => cfg.whitelist.push(expect_value(&arg, &mut args)?),
				"--blacklist" => cfg.blacklist.push(expect_value(&arg, &mut args)?),
				"--preserve-indent" => cfg.preserve_indent = true,
				"--line-ending" => {
					let value = expect_value(&arg, &mut args)?;
					cfg.line_ending = Some(match value.as_str() {
						"lf" => LineEnding::Lf,
						"crlf" => LineEnding::Crlf,
						other => return Err(format!("--line-ending: expected 'lf' or 'crlf', found '{other}'")),
					});
				}
				"--stats" => cfg.stats = true,
				"--verbose" => cfg.verbose = true,
				"--trace" => cfg.trace = true,
				"--check" => cfg.check = true,
				"--serial" => cfg.serial = true,
				"--prefix" => cfg.prefixes.push(expect_value(&arg, &mut args)?),
				other if other.starts_with('-') => return Err(format!("unrecognized flag '{other}'")),
				other => cfg.inputs.push(other.to_string()),
			}
		}

		if cfg.inputs.is_empty() {
			return Err("no input files given".to_string());
		}
		Ok(cfg)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_empty() {
		let cfg = Config::default();
		assert!(cfg.inputs.is_empty());
		assert!(!cfg.preserve_indent);
		assert!(cfg.line_ending.is_none());
	}

	#[test]
	fn line_ending_as_str() {
		assert_eq!(LineEnding::Lf.as_str(), "\n");
		assert_eq!(LineEnding::Crlf.as_str(), "\r\n");
	}

	#[test]
	fn rejects_unrecognized_flag_via_parse_words() {
		let err = parse_words(&["weft", "--nope"]).unwrap_err();
		assert!(err.contains("--nope"));
	}

	#[test]
	fn positional_args_become_inputs() {
		let cfg = parse_words(&["weft", "a.txt", "b.txt"]).unwrap();
		assert_eq!(cfg.inputs, vec!["a.txt", "b.txt"]);
	}

	#[test]
	fn flags_with_values_are_collected() {
		let cfg = parse_words(&["weft", "-i", "a.txt", "--var-file", "vars.env", "--preserve-indent", "-o", "out.txt"]).unwrap();
		assert_eq!(cfg.inputs, vec!["a.txt"]);
		assert_eq!(cfg.var_files, vec!["vars.env"]);
		assert!(cfg.preserve_indent);
		assert_eq!(cfg.output.as_deref(), Some("out.txt"));
	}

	// `parse_from` takes the real `std::env::Args`, which can't be built from
	// a `Vec<String>` in a test. `parse_words` mirrors its match loop over a
	// plain string slice so the flag grammar itself is covered without
	// touching process argv.
	fn parse_words(words: &[&str]) -> Result<Config, String> {
		let mut cfg = Config::default();
		let mut args = words.iter().skip(1).map(|s| s.to_string()).collect::<Vec<_>>().into_iter().peekable();

		while let Some(arg) = args.next() {
			match arg.as_str() {
				"-i" | "--input" => cfg.inputs.push(args.next().ok_or("missing value")?),
				"-o" | "--output" => cfg.output = Some(args.next().ok_or("missing value")?),
				"--var-file" => cfg.var_files.push(args.next().ok_or("missing value")?),
				"--whitelist" => cfg.whitelist.push(args.next().ok_or("missing value")?),
				"--blacklist" => cfg.blacklist.push(args.next().ok_or("missing value")?),
				"--preserve-indent" => cfg.preserve_indent = true,
				"--line-ending" => {
					let value = args.next().ok_or("missing value")?;
					cfg.line_ending = Some(match value.as_str() {
						"lf" => LineEnding::Lf,
						"crlf" => LineEnding::Crlf,
						other => return Err(format!("--line-ending: expected 'lf' or 'crlf', found '{other}'")),
					});
				}
				"--stats" => cfg.stats = true,
				"--verbose" => cfg.verbose = true,
				"--trace" => cfg.trace = true,
				"--check" => cfg.check = true,
				"--serial" => cfg.serial = true,
				"--prefix" => cfg.prefixes.push(args.next().ok_or("missing value")?),
				other if other.starts_with('-') => return Err(format!("unrecognized flag '{other}'")),
				other => cfg.inputs.push(other.to_string()),
			}
		}
		Ok(cfg)
	}

	#[test]
	fn line_ending_flag_is_parsed() {
		let cfg = parse_words(&["weft", "a.txt", "--line-ending", "crlf"]).unwrap();
		assert_eq!(cfg.line_ending, Some(LineEnding::Crlf));
	}

	#[test]
	fn line_ending_rejects_unknown_value() {
		let err = parse_words(&["weft", "a.txt", "--line-ending", "bogus"]).unwrap_err();
		assert!(err.contains("bogus"));
	}

	#[test]
	fn serial_flag_is_parsed() {
		let cfg = parse_words(&["weft", "a.txt", "--serial"]).unwrap();
		assert!(cfg.serial);
	}
}
