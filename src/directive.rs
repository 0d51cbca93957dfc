//! Recognizes directive lines and splits them into name + raw argument text.

use crate::variable::VariableStore;

/// All directive names this dispatcher understands.
pub const IGNORE: &str = "ignore";
pub const IGNOREEND: &str = "ignoreend";
pub const VAR: &str = "var";
pub const FOREACH: &str = "foreach";
pub const FOREACHEND: &str = "foreachend";
pub const IMPORT: &str = "import";
pub const IF: &str = "if";
pub const ELSE: &str = "else";
pub const IFEND: &str = "ifend";

/// A parsed directive line: name, file, raw argument text, indent, and
/// source line number. Transient — built by [`parse`], consumed by whatever
/// calls it, then dropped.
#[derive(Clone, Debug)]
pub struct Directive {
	pub name: String,
	pub file: String,
	pub raw_args: String,
	pub indent: String,
	pub line: usize,
}

impl Directive {
	/// Splits `foreach a, b, c` or `foreach [a, b, c]` style arguments on
	/// commas, stripping brackets and surrounding whitespace from each.
	pub fn comma_args(&self) -> Vec<String> {
		self.raw_args
			.trim()
			.trim_start_matches('[')
			.trim_end_matches(']')
			.split(',')
			.map(|s| s.trim().to_string())
			.filter(|s| !s.is_empty())
			.collect()
	}

	/// Parses `name = value` (or the tolerant whitespace variants) out of a
	/// `var` directive's argument text.
	pub fn var_declaration(&self) -> crate::variable::Variable {
		VariableStore::parse_declaration(&self.raw_args)
	}

	/// Splits `<left> <op> <right>` for an `if` directive by locating the
	/// first whitespace-delimited token that is a recognized operator.
	pub fn condition_parts(&self) -> Option<(String, String, String)> {
		let words: Vec<&str> = self.raw_args.split_whitespace().collect();
		let op_idx = words.iter().position(|w| is_operator(w))?;
		if op_idx == 0 || op_idx == words.len() - 1 {
			return None;
		}
		let left = words[..op_idx].join(" ");
		let op = words[op_idx].to_string();
		let right = words[op_idx + 1..].join(" ");
		Some((left, op, right))
	}

	pub fn import_path(&self) -> &str {
		self.raw_args.trim()
	}
}

pub fn is_operator(word: &str) -> bool {
	matches!(word, "=" | "==" | "!=" | "<>" | ">" | ">=" | "<" | "<=")
}

/// Returns the default set of comment prefixes for a tool named `name`:
/// `#name`, `# name`, `//name`, `// name`.
pub fn default_prefixes(name: &str) -> Vec<String> {
	vec![format!("#{name}"), format!("# {name}"), format!("//{name}"), format!("// {name}")]
}

/// If `trimmed` begins with one of `prefixes` followed by whitespace (or the
/// prefix alone, for a bare directive-less line), returns the remainder.
/// Longer prefixes are tried first so `# weft` isn't shadowed by a bare `#`.
fn strip_prefix<'a>(trimmed: &'a str, prefixes: &[String]) -> Option<&'a str> {
	let mut candidates: Vec<&String> = prefixes.iter().collect();
	candidates.sort_by_key(|p| std::cmp::Reverse(p.len()));
	for prefix in candidates {
		if let Some(rest) = trimmed.strip_prefix(prefix.as_str())
			&& (rest.is_empty() || rest.starts_with(char::is_whitespace))
		{
			return Some(rest.trim_start());
		}
	}
	None
}

/// Attempts to parse `line` as a directive. `indent` is the caller-computed
/// leading whitespace to carry on the returned [`Directive`] (only
/// meaningful for content lines, but threaded through for uniformity).
pub fn parse(file: &str, line_no: usize, line: &str, indent: &str, prefixes: &[String]) -> Option<Directive> {
	let trimmed = line.trim_start();
	let rest = strip_prefix(trimmed, prefixes)?;
	let (name, raw_args) = match rest.split_once(char::is_whitespace) {
		Some((name, args)) => (name, args.trim()),
		None => (rest, ""),
	};
	if name.is_empty() {
		return None;
	}
	Some(Directive { name: name.to_string(), file: file.to_string(), raw_args: raw_args.to_string(), indent: indent.to_string(), line: line_no })
}
