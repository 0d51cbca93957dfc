//! The built-in function library: a name -> handler dispatch table of pure
//! string-in / string-out operations, plus the handful of handlers that
//! touch ambient state (`env`, the `sha*`/`md5` file digests, and `var`'s
//! side effect on the variable store).

use std::fs;

use log::trace;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use md5::Md5;

use crate::error::{CallId, WeftError, WeftResult};
use crate::variable::{Registry, Variable, VariableStore};

/// Everything a handler needs beyond its already-resolved arguments.
pub struct FnContext<'a> {
	pub store: &'a VariableStore,
	pub file: &'a str,
	/// Key of the currently active foreach register, if a loop is open.
	/// `var(name, value)` is scoped here instead of to `file` when set.
	pub foreach_key: Option<&'a str>,
	pub call_id: CallId,
}

type Handler = fn(&[String], &FnContext) -> WeftResult<String>;

/// Look up and invoke a built-in function by name.
pub fn call(name: &str, args: &[String], ctx: &FnContext) -> WeftResult<String> {
	trace!("{}: call {name}({})", ctx.call_id, args.join(", "));
	let handler: Handler = match name {
		"add" => fold_numeric,
		"sub" => |args, ctx| fold_with(args, ctx, "sub", |a, b| a - b),
		"mult" => |args, ctx| fold_with(args, ctx, "mult", |a, b| a * b),
		"div" => |args, ctx| fold_with(args, ctx, "div", |a, b| a / b),
		"pow" => pow,
		"sqrt" => |args, ctx| unary(args, ctx, "sqrt", f64::sqrt),
		"round" => |args, ctx| unary(args, ctx, "round", f64::round),
		"ceil" => |args, ctx| unary(args, ctx, "ceil", f64::ceil),
		"floor" => |args, ctx| unary(args, ctx, "floor", f64::floor),
		"fixed" => fixed,
		"max" => |args, ctx| extremum(args, ctx, "max", f64::max),
		"min" => |args, ctx| extremum(args, ctx, "min", f64::min),
		"mod" => modulo,
		"modmin" => modmin,
		"sha1" => sha1_digest,
		"sha256" => sha256_digest,
		"sha512" => sha512_digest,
		"md5" => md5_digest,
		"lower" => |args, ctx| case_transform(args, ctx, "lower", |s| s.to_lowercase()),
		"upper" => |args, ctx| case_transform(args, ctx, "upper", |s| s.to_uppercase()),
		"cap" => |args, ctx| case_transform(args, ctx, "cap", title_case),
		"split" => split,
		"repeat" => repeat,
		"replace" => replace,
		"len" => len,
		"now" => now,
		"env" => env,
		"fname" => fname,
		"fbasename" => fbasename,
		"var" => {
			return var(args, ctx);
		}
		other => return Err(WeftError::unknown_function(ctx.call_id.clone(), other)),
	};
	handler(args, ctx)
}

fn arity_error(ctx: &FnContext, name: &str, message: impl Into<String>) -> WeftError {
	WeftError::syntax(ctx.call_id.clone(), format!("{name}: {}", message.into()))
}

fn parse_error(ctx: &FnContext, name: &str, raw: &str) -> WeftError {
	WeftError::parse(ctx.call_id.clone(), format!("{name}: expected a number, found '{raw}'"))
}

fn parse_num(ctx: &FnContext, name: &str, raw: &str) -> WeftResult<f64> {
	raw.trim().parse::<f64>().map_err(|_| parse_error(ctx, name, raw))
}

fn require_min_args(ctx: &FnContext, name: &str, args: &[String], min: usize) -> WeftResult<()> {
	if args.len() < min {
		return Err(arity_error(ctx, name, format!("expected at least {min} argument(s), got {}", args.len())));
	}
	Ok(())
}

fn require_exact_args(ctx: &FnContext, name: &str, args: &[String], exact: usize) -> WeftResult<()> {
	if args.len() != exact {
		return Err(arity_error(ctx, name, format!("expected {exact} argument(s), got {}", args.len())));
	}
	Ok(())
}

fn fmt_num(n: f64) -> String {
	if n.fract() == 0.0 && n.abs() < 1e15 {
		format!("{}", n as i64)
	} else {
		let mut s = format!("{n}");
		if s.is_empty() {
			s.push('0');
		}
		s
	}
}

fn fold_numeric(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	fold_with(args, ctx, "add", |a, b| a + b)
}

fn fold_with(args: &[String], ctx: &FnContext, name: &str, op: fn(f64, f64) -> f64) -> WeftResult<String> {
	require_min_args(ctx, name, args, 2)?;
	let mut acc = parse_num(ctx, name, &args[0])?;
	for raw in &args[1..] {
		acc = op(acc, parse_num(ctx, name, raw)?);
	}
	Ok(fmt_num(acc))
}

fn pow(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "pow", args, 2)?;
	let base = parse_num(ctx, "pow", &args[0])?;
	let exp = parse_num(ctx, "pow", &args[1])?;
	Ok(fmt_num(base.powf(exp)))
}

fn unary(args: &[String], ctx: &FnContext, name: &str, op: fn(f64) -> f64) -> WeftResult<String> {
	require_exact_args(ctx, name, args, 1)?;
	let n = parse_num(ctx, name, &args[0])?;
	Ok(fmt_num(op(n)))
}

fn extremum(args: &[String], ctx: &FnContext, name: &str, op: fn(f64, f64) -> f64) -> WeftResult<String> {
	require_min_args(ctx, name, args, 2)?;
	let mut acc = parse_num(ctx, name, &args[0])?;
	for raw in &args[1..] {
		acc = op(acc, parse_num(ctx, name, raw)?);
	}
	Ok(fmt_num(acc))
}

fn modulo(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "mod", args, 2)?;
	let a = parse_num(ctx, "mod", &args[0])?;
	let b = parse_num(ctx, "mod", &args[1])?;
	Ok(fmt_num(a % b))
}

fn modmin(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "modmin", args, 3)?;
	let x = parse_num(ctx, "modmin", &args[0])?;
	let y = parse_num(ctx, "modmin", &args[1])?;
	let c = parse_num(ctx, "modmin", &args[2])?;
	Ok(fmt_num(c.max(x % y)))
}

/// Rounds toward zero at the n-th decimal place: scale by 10^n, then floor
/// for non-negative numbers and ceil for negative ones (asymmetric
/// truncation, per the spec).
fn fixed(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "fixed", args, 2)?;
	let x = parse_num(ctx, "fixed", &args[0])?;
	let n = parse_num(ctx, "fixed", &args[1])?;
	let scale = 10f64.powf(n);
	let scaled = x * scale;
	let truncated = if scaled >= 0.0 { scaled.floor() } else { scaled.ceil() };
	Ok(fmt_num(truncated / scale))
}

fn digest_file(ctx: &FnContext, name: &str, path: &str, digest: fn(&[u8]) -> String) -> WeftResult<String> {
	let bytes = fs::read(path).map_err(|e| WeftError::syntax(ctx.call_id.clone(), format!("{name}: failed to read '{path}': {e}")))?;
	Ok(digest(&bytes))
}

fn sha1_digest(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "sha1", args, 1)?;
	digest_file(ctx, "sha1", &args[0], |bytes| hex::encode(Sha1::digest(bytes)))
}

fn sha256_digest(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "sha256", args, 1)?;
	digest_file(ctx, "sha256", &args[0], |bytes| hex::encode(Sha256::digest(bytes)))
}

fn sha512_digest(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "sha512", args, 1)?;
	digest_file(ctx, "sha512", &args[0], |bytes| hex::encode(Sha512::digest(bytes)))
}

fn md5_digest(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "md5", args, 1)?;
	digest_file(ctx, "md5", &args[0], |bytes| hex::encode(Md5::digest(bytes)))
}

fn case_transform(args: &[String], ctx: &FnContext, name: &str, op: fn(&str) -> String) -> WeftResult<String> {
	require_exact_args(ctx, name, args, 1)?;
	Ok(op(&args[0]))
}

fn title_case(s: &str) -> String {
	s.split(' ')
		.map(|word| {
			let mut chars = word.chars();
			match chars.next() {
				Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
				None => String::new(),
			}
		})
		.collect::<Vec<_>>()
		.join(" ")
}

fn split(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "split", args, 3)?;
	let parts: Vec<&str> = args[0].split(args[1].as_str()).collect();
	let idx: usize = args[2]
		.trim()
		.parse()
		.map_err(|_| parse_error(ctx, "split", &args[2]))?;
	Ok(parts.get(idx).or(parts.first()).copied().unwrap_or("").to_string())
}

fn repeat(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "repeat", args, 2)?;
	let n: usize = args[1]
		.trim()
		.parse()
		.map_err(|_| parse_error(ctx, "repeat", &args[1]))?;
	Ok(args[0].repeat(n))
}

fn replace(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "replace", args, 3)?;
	Ok(args[0].replace(args[1].as_str(), &args[2]))
}

fn len(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "len", args, 1)?;
	let arg = args[0].as_str();
	if arg == "GLOBAL_VARS" {
		return Ok(ctx.store.global_all().len().to_string());
	}
	if let Some(basename) = arg.strip_prefix("GLOBAL_VARS_") {
		return Ok(ctx.store.lookup_all(Registry::Global, basename).len().to_string());
	}
	Ok(arg.len().to_string())
}

fn now(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "now", args, 1)?;
	let fmt = &args[0];
	// `DelayedFormat`'s `Display` returns `Err` on an unrecognized specifier,
	// and the blanket `ToString` impl panics if `Display::fmt` errors. Parse
	// the format string through the same item parser chrono's formatter
	// uses first, so a bad specifier becomes a `WeftError` instead.
	if chrono::format::StrftimeItems::new(fmt).any(|item| matches!(item, chrono::format::Item::Error)) {
		return Err(parse_error(ctx, "now", fmt));
	}
	Ok(chrono::Local::now().format(fmt).to_string())
}

fn env(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "env", args, 1)?;
	Ok(std::env::var(&args[0]).unwrap_or_default())
}

fn fname(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "fname", args, 0)?;
	Ok(ctx.file.to_string())
}

fn fbasename(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "fbasename", args, 0)?;
	Ok(std::path::Path::new(ctx.file)
		.file_name()
		.map(|s| s.to_string_lossy().to_string())
		.unwrap_or_default())
}

/// Mutates the local (or active foreach) registry for the current file.
/// Unlike every other handler, `var`'s first argument is the *name* itself
/// and is never pre-resolved by the token resolver (see
/// [`crate::token::TokenResolver`]'s special case for this function).
fn var(args: &[String], ctx: &FnContext) -> WeftResult<String> {
	require_exact_args(ctx, "var", args, 2)?;
	let variable = Variable::new(args[0].clone(), args[1].clone());
	match ctx.foreach_key {
		Some(key) => ctx.store.set(Registry::Foreach, key, variable),
		None => ctx.store.set(Registry::Local, ctx.file, variable),
	}
	Ok(String::new())
}

/// Formats a file-digest error message the way the other handlers do,
/// exercised from tests that want a `WeftError`'s text without a whole
/// template line around it.
#[cfg(test)]
pub(crate) fn describe_err(err: &WeftError) -> String {
	use std::fmt::Write as _;
	let mut out = String::new();
	let _ = write!(out, "{err}");
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::variable::VariableStore;

	fn ctx(store: &VariableStore) -> FnContext<'_> {
		FnContext { store, file: "test.txt", foreach_key: None, call_id: CallId::unknown() }
	}

	#[test]
	fn add_folds_left_to_right() {
		let store = VariableStore::new();
		let result = call("add", &["1".into(), "2".into(), "3".into()], &ctx(&store)).unwrap();
		assert_eq!(result, "6");
	}

	#[test]
	fn fixed_truncates_asymmetrically() {
		let store = VariableStore::new();
		let result = call("fixed", &["1.999".into(), "2".into()], &ctx(&store)).unwrap();
		assert_eq!(result, "1.99");

		let result = call("fixed", &["-1.999".into(), "2".into()], &ctx(&store)).unwrap();
		assert_eq!(result, "-1.99");
	}

	#[test]
	fn split_clamps_to_first_part_out_of_range() {
		let store = VariableStore::new();
		let result = call("split", &["a,b,c".into(), ",".into(), "9".into()], &ctx(&store)).unwrap();
		assert_eq!(result, "a");
	}

	#[test]
	fn unknown_function_is_an_error() {
		let store = VariableStore::new();
		let err = call("nope", &[], &ctx(&store)).unwrap_err();
		assert!(describe_err(&err).contains("unknown function"));
	}

	#[test]
	fn cap_title_cases_each_word() {
		let store = VariableStore::new();
		let result = call("cap", &["hello world".into()], &ctx(&store)).unwrap();
		assert_eq!(result, "Hello World");
	}

	#[test]
	fn var_sets_local_registry() {
		let store = VariableStore::new();
		call("var", &["name".into(), "World".into()], &ctx(&store)).unwrap();
		let v = store.lookup(Registry::Local, "test.txt", "name").unwrap();
		assert_eq!(v.value, "World");
	}

	#[test]
	fn now_accepts_a_valid_format() {
		let store = VariableStore::new();
		let result = call("now", &["%Y".into()], &ctx(&store)).unwrap();
		assert_eq!(result.len(), 4);
	}

	#[test]
	fn now_rejects_an_unrecognized_specifier_instead_of_panicking() {
		let store = VariableStore::new();
		let err = call("now", &["%Q".into()], &ctx(&store)).unwrap_err();
		assert!(describe_err(&err).contains("now"));
	}

	#[test]
	fn now_rejects_a_dangling_percent() {
		let store = VariableStore::new();
		let err = call("now", &["100%".into()], &ctx(&store)).unwrap_err();
		assert!(describe_err(&err).contains("now"));
	}
}
