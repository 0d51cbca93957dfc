//! Rewrites `{{expr}}` template expressions inline.
//!
//! `expr` is either a bare variable name or a function call
//! `name(arg0, arg1, …)`. Expressions may nest, e.g.
//! `{{add(1, {{mult(2,3)}})}}`. The teacher's own template interpolation
//! (`format_output_template` in the CLI driver) uses a single left-to-right
//! character scan with an escape case; this resolver generalizes that scan
//! into a stack of pending spans so nested markers resolve bottom-up in one
//! linear pass, without recursing through user-controlled nesting depth.

use std::collections::HashMap;

use crate::error::WeftResult;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Looks up a bare name through the scope chain (foreach states at or below
/// the current depth, then local-for-file, then global).
pub trait Scope {
	fn lookup(&self, name: &str) -> Option<String>;
}

/// Invokes a named built-in, already wired to the current file/foreach
/// context. Returns `Ok(None)` is never produced; a function call always
/// either succeeds or fails (unlike a bare variable, which may simply be
/// absent).
pub trait FnCall {
	fn call(&self, name: &str, args: &[String]) -> WeftResult<String>;
}

pub struct TokenResolver;

impl TokenResolver {
	/// Resolve every `{{...}}` span in `line`. Unknown bare names are left
	/// untouched (not an error); unknown functions or function errors
	/// propagate.
	pub fn resolve(
		line: &str,
		scope: &dyn Scope,
		extra_bindings: &HashMap<String, String>,
		functions: &dyn FnCall,
	) -> WeftResult<String> {
		let mut output = String::with_capacity(line.len());
		// Each entry is the byte offset in `output` where a still-open "{{"
		// span begins (pointing just past the two marker bytes).
		let mut opens: Vec<usize> = Vec::new();

		let mut rest = line;
		while !rest.is_empty() {
			if rest.starts_with(OPEN) {
				opens.push(output.len() + OPEN.len());
				output.push_str(OPEN);
				rest = &rest[OPEN.len()..];
			} else if rest.starts_with(CLOSE) && !opens.is_empty() {
				let start = opens.pop().unwrap();
				let inner = output[start..].to_string();
				match Self::resolve_token(&inner, scope, extra_bindings, functions)? {
					Some(value) => {
						output.truncate(start - OPEN.len());
						output.push_str(&value);
					}
					None => {
						// Unresolved bare name: leave the placeholder as-is.
						output.push_str(CLOSE);
					}
				}
				rest = &rest[CLOSE.len()..];
			} else {
				let ch_len = rest.chars().next().map(char::len_utf8).unwrap_or(1);
				output.push_str(&rest[..ch_len]);
				rest = &rest[ch_len..];
			}
		}
		Ok(output)
	}

	fn resolve_token(
		token: &str,
		scope: &dyn Scope,
		extra_bindings: &HashMap<String, String>,
		functions: &dyn FnCall,
	) -> WeftResult<Option<String>> {
		if let Some((name, raw_args)) = split_function_call(token) {
			if name == "var" {
				// `var`'s arguments keep their literal names rather than
				// being pre-resolved as variables, so it can set a name
				// that happens to already exist without clobbering the
				// assignment with that variable's current value.
				let args: Vec<String> = raw_args.iter().map(|a| a.trim().to_string()).collect();
				return Ok(Some(functions.call("var", &args)?));
			}
			let mut args = Vec::with_capacity(raw_args.len());
			for raw in raw_args {
				let trimmed = raw.trim();
				let resolved = scope.lookup(trimmed).or_else(|| extra_bindings.get(trimmed).cloned());
				args.push(resolved.unwrap_or_else(|| trimmed.to_string()));
			}
			return Ok(Some(functions.call(&name, &args)?));
		}

		let name = token.trim();
		if let Some(value) = scope.lookup(name)
			&& !value.is_empty()
		{
			return Ok(Some(value));
		}
		if let Some(value) = extra_bindings.get(name) {
			return Ok(Some(value.clone()));
		}
		Ok(None)
	}
}

/// If `token` looks like `name(arg0, arg1, …)`, returns the name and the raw
/// (untrimmed) comma-split argument strings. Splitting is a plain
/// comma-split with no bracket-depth tracking, matching this language's
/// explicit non-goal of general expression parsing.
fn split_function_call(token: &str) -> Option<(String, Vec<String>)> {
	let trimmed = token.trim();
	let open = trimmed.find('(')?;
	if !trimmed.ends_with(')') {
		return None;
	}
	let name = trimmed[..open].trim();
	if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
		return None;
	}
	let inner = &trimmed[open + 1..trimmed.len() - 1];
	let args = if inner.trim().is_empty() {
		Vec::new()
	} else {
		inner.split(',').map(|s| s.to_string()).collect()
	};
	Some((name.to_string(), args))
}
