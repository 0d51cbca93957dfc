//! The line-by-line interpreter: drives one file's lines through the
//! directive dispatcher, `ForeachBuffer`, `IfBuffer`, and `TokenResolver`,
//! producing that file's rendered output.
//!
//! Two nesting directions are real, structural recursion: `foreach` inside
//! `foreach` (via `ForeachState::jumps`) and `if` inside `if` (via
//! `IfBuffer`'s own stack). The third, `if` inside `foreach`, is handled by
//! deferral: directive lines other than `foreach`/`foreachend` encountered
//! while a foreach body is being captured are appended as raw, unresolved
//! text, then re-interpreted fresh for every binding by [`Interpreter::replay`]
//! — which is what gives a loop-nested `if` its own condition re-evaluated
//! per iteration instead of once at capture time. The fourth direction,
//! `foreach` inside `if`, has no real support: `foreach`/`foreachend` text
//! encountered while an `if` branch is capturing is treated as ordinary
//! literal content.

use std::cell::Cell;
use std::collections::HashMap;

use log::trace;

use crate::dependency::DependencyGraph;
use crate::directive::{self, Directive};
use crate::error::{CallId, WeftError, WeftResult};
use crate::foreach::ForeachBuffer;
use crate::functions::{self, FnContext};
use crate::ifblock::{eval_condition, IfBuffer};
use crate::token::{FnCall, Scope, TokenResolver};
use crate::variable::{ChainScope, Registry, VariableStore};

fn leading_whitespace(line: &str) -> String {
	line.chars().take_while(|c| *c == ' ' || *c == '\t').collect()
}

/// Where a `var` assignment (directive or replayed) should land: the
/// local-for-file register, or an active foreach iteration's register.
#[derive(Clone, Debug)]
enum VarTarget {
	Local(String),
	Foreach(String),
}

impl VarTarget {
	fn registry_and_key(&self) -> (Registry, &str) {
		match self {
			VarTarget::Local(file) => (Registry::Local, file.as_str()),
			VarTarget::Foreach(key) => (Registry::Foreach, key.as_str()),
		}
	}

	fn foreach_key(&self) -> Option<&str> {
		match self {
			VarTarget::Local(_) => None,
			VarTarget::Foreach(key) => Some(key.as_str()),
		}
	}
}

/// Wires [`functions::call`] up as a [`FnCall`] for one file/target context.
/// `line` is mutable because the same instance resolves many lines in a
/// `replay` pass and each needs its own call-id for error messages.
struct Funcs<'a> {
	store: &'a VariableStore,
	file: &'a str,
	foreach_key: Option<&'a str>,
	line: Cell<usize>,
}

impl FnCall for Funcs<'_> {
	fn call(&self, name: &str, args: &[String]) -> WeftResult<String> {
		let ctx = FnContext { store: self.store, file: self.file, foreach_key: self.foreach_key, call_id: CallId::new(self.file, name, self.line.get()) };
		functions::call(name, args, &ctx)
	}
}

pub struct Interpreter<'a> {
	store: &'a VariableStore,
	graph: &'a DependencyGraph,
	prefixes: Vec<String>,
	preserve_indent: bool,
}

impl<'a> Interpreter<'a> {
	pub fn new(store: &'a VariableStore, graph: &'a DependencyGraph, prefixes: Vec<String>, preserve_indent: bool) -> Self {
		Self { store, graph, prefixes, preserve_indent }
	}

	/// Renders `content` (the text of `file`) top to bottom. `loader` reads
	/// another file's raw text by path, used to follow `import`.
	pub fn run(&self, file: &str, content: &str, loader: &dyn Fn(&str) -> WeftResult<String>) -> WeftResult<String> {
		let lines: Vec<&str> = content.lines().collect();
		let mut out: Vec<String> = Vec::new();
		let mut foreach = ForeachBuffer::new();
		let mut ifs = IfBuffer::new();
		let mut ignore_depth: usize = 0;

		for (i, raw) in lines.iter().enumerate() {
			let line_no = i + 1;
			let indent = if self.preserve_indent { leading_whitespace(raw) } else { String::new() };
			let directive = directive::parse(file, line_no, raw, &indent, &self.prefixes);

			if let Some(d) = directive {
				trace!("{}: dispatch {}", CallId::new(file, d.name.as_str(), d.line), d.name);
				if foreach.is_active() {
					match d.name.as_str() {
						directive::FOREACH => foreach.push_state(file, d.comma_args(), &d.indent),
						directive::FOREACHEND => {
							if foreach.close_current() {
								out.extend(self.evaluate_foreach(file, &mut foreach, loader)?);
							}
						}
						_ => foreach.append_line(raw.to_string()),
					}
					continue;
				}

				if ifs.is_active() {
					match d.name.as_str() {
						directive::IF => {
							let scope = ChainScope::new(self.store, file, vec![]);
							let taken = self.eval_if_condition(file, &d, &scope, &VarTarget::Local(file.to_string()))?;
							ifs.open(taken);
						}
						directive::ELSE => ifs.move_to_else(&CallId::new(file, directive::ELSE, d.line))?,
						directive::IFEND => {
							let (taken_lines, fully_closed) = ifs.close(&CallId::new(file, directive::IFEND, d.line))?;
							if fully_closed {
								let scope = ChainScope::new(self.store, file, vec![]);
								out.extend(self.replay(file, &taken_lines, &scope, VarTarget::Local(file.to_string()), loader)?);
							} else {
								for l in taken_lines {
									ifs.append_line(l);
								}
							}
						}
						_ => ifs.append_line(raw.to_string()),
					}
					continue;
				}

				match d.name.as_str() {
					directive::FOREACH => foreach.push_state(file, d.comma_args(), &d.indent),
					directive::FOREACHEND => {
						return Err(WeftError::syntax(CallId::new(file, directive::FOREACHEND, d.line), "foreachend: no open foreach block"));
					}
					directive::IF => {
						let scope = ChainScope::new(self.store, file, vec![]);
						let taken = self.eval_if_condition(file, &d, &scope, &VarTarget::Local(file.to_string()))?;
						ifs.open(taken);
					}
					directive::ELSE => {
						return Err(WeftError::syntax(CallId::new(file, directive::ELSE, d.line), "else: no open if block"));
					}
					directive::IFEND => {
						return Err(WeftError::syntax(CallId::new(file, directive::IFEND, d.line), "ifend: no open if block"));
					}
					directive::IGNORE => ignore_depth += 1,
					directive::IGNOREEND => {
						if ignore_depth == 0 {
							return Err(WeftError::syntax(CallId::new(file, directive::IGNOREEND, d.line), "ignoreend: no open ignore block"));
						}
						ignore_depth -= 1;
					}
					directive::VAR => {
						let scope = ChainScope::new(self.store, file, vec![]);
						let v = self.resolve_var_declaration(file, &d, &scope, &VarTarget::Local(file.to_string()))?;
						self.store.set(Registry::Local, file, v);
					}
					directive::IMPORT => out.extend(self.follow_import(file, &d, loader)?),
					other => {
						return Err(WeftError::syntax(CallId::new(file, other.to_string(), d.line), format!("unknown directive '{other}'")));
					}
				}
				continue;
			}

			if ignore_depth > 0 {
				continue;
			}
			if foreach.is_active() {
				foreach.append_line(raw.to_string());
				continue;
			}
			if ifs.is_active() {
				ifs.append_line(raw.to_string());
				continue;
			}
			let scope = ChainScope::new(self.store, file, vec![]);
			out.push(self.resolve_line(file, raw, &scope, &VarTarget::Local(file.to_string()), line_no)?);
		}

		Ok(out.join("\n"))
	}

	/// Re-interprets a flat span of raw captured lines (a foreach body for
	/// one binding, or an if branch once its outermost `ifend` fires). Gets
	/// its own fresh [`IfBuffer`], so nested `if`s inside the span resolve
	/// exactly as they would at the top level.
	fn replay(&self, file: &str, lines: &[String], scope: &dyn Scope, target: VarTarget, loader: &dyn Fn(&str) -> WeftResult<String>) -> WeftResult<Vec<String>> {
		let mut ifs = IfBuffer::new();
		let mut ignore_depth: usize = 0;
		let mut out = Vec::new();

		for (i, raw) in lines.iter().enumerate() {
			let line_no = i + 1;
			let parsed = directive::parse(file, line_no, raw, "", &self.prefixes);

			let dispatched = if let Some(d) = &parsed {
				trace!("{}: dispatch {}", CallId::new(file, d.name.as_str(), d.line), d.name);
				match d.name.as_str() {
					directive::IF => {
						let taken = self.eval_if_condition(file, d, scope, &target)?;
						ifs.open(taken);
						true
					}
					directive::ELSE => {
						ifs.move_to_else(&CallId::new(file, directive::ELSE, d.line))?;
						true
					}
					directive::IFEND => {
						let (taken_lines, fully_closed) = ifs.close(&CallId::new(file, directive::IFEND, d.line))?;
						if fully_closed {
							out.extend(self.replay(file, &taken_lines, scope, target.clone(), loader)?);
						} else {
							for l in taken_lines {
								ifs.append_line(l);
							}
						}
						true
					}
					_ if ifs.is_active() => {
						ifs.append_line(raw.clone());
						true
					}
					directive::IGNORE => {
						ignore_depth += 1;
						true
					}
					directive::IGNOREEND => {
						if ignore_depth == 0 {
							return Err(WeftError::syntax(CallId::new(file, directive::IGNOREEND, d.line), "ignoreend: no open ignore block"));
						}
						ignore_depth -= 1;
						true
					}
					directive::VAR => {
						let v = self.resolve_var_declaration(file, d, scope, &target)?;
						let (registry, key) = target.registry_and_key();
						self.store.set(registry, key, v);
						true
					}
					directive::IMPORT => {
						out.extend(self.follow_import(file, d, loader)?);
						true
					}
					directive::FOREACH | directive::FOREACHEND => false,
					other => {
						return Err(WeftError::syntax(CallId::new(file, other.to_string(), d.line), format!("unknown directive '{other}'")));
					}
				}
			} else {
				false
			};

			if dispatched {
				continue;
			}
			if ignore_depth > 0 {
				continue;
			}
			if ifs.is_active() {
				ifs.append_line(raw.clone());
				continue;
			}
			out.push(self.resolve_line(file, raw, scope, &target, line_no)?);
		}
		Ok(out)
	}

	fn evaluate_foreach(&self, file: &str, foreach: &mut ForeachBuffer, loader: &dyn Fn(&str) -> WeftResult<String>) -> WeftResult<Vec<String>> {
		let replay_fn = |lines: &[String], scope: &dyn Scope, var_key: &str| -> WeftResult<Vec<String>> {
			self.replay(file, lines, scope, VarTarget::Foreach(var_key.to_string()), loader)
		};
		foreach.evaluate(self.store, &replay_fn)
	}

	fn eval_if_condition(&self, file: &str, d: &Directive, scope: &dyn Scope, target: &VarTarget) -> WeftResult<bool> {
		let call_id = CallId::new(file, directive::IF, d.line);
		let (left_raw, op, right_raw) = d.condition_parts().ok_or_else(|| WeftError::syntax(call_id.clone(), "if: expected '<left> <op> <right>'"))?;
		let funcs = Funcs { store: self.store, file, foreach_key: target.foreach_key(), line: Cell::new(d.line) };
		let left = TokenResolver::resolve(&left_raw, scope, &HashMap::new(), &funcs)?;
		let right = TokenResolver::resolve(&right_raw, scope, &HashMap::new(), &funcs)?;
		eval_condition(&left, &op, &right, &call_id)
	}

	/// Resolves a `var` directive's `{{...}}` expressions in its value before
	/// parsing `name = value`, so `#weft var x = {{mult(index, 2)}}` stores
	/// the computed result rather than the literal template text.
	fn resolve_var_declaration(&self, file: &str, d: &Directive, scope: &dyn Scope, target: &VarTarget) -> WeftResult<crate::variable::Variable> {
		let funcs = Funcs { store: self.store, file, foreach_key: target.foreach_key(), line: Cell::new(d.line) };
		let resolved = TokenResolver::resolve(&d.raw_args, scope, &HashMap::new(), &funcs)?;
		let v = crate::variable::VariableStore::parse_declaration(&resolved);
		if v.is_empty() {
			return Err(WeftError::syntax(CallId::new(file, directive::VAR, d.line), "var: expected 'name = value'"));
		}
		Ok(v)
	}

	fn resolve_line(&self, file: &str, raw: &str, scope: &dyn Scope, target: &VarTarget, line_no: usize) -> WeftResult<String> {
		let funcs = Funcs { store: self.store, file, foreach_key: target.foreach_key(), line: Cell::new(line_no) };
		TokenResolver::resolve(raw, scope, &HashMap::new(), &funcs)
	}

	fn follow_import(&self, file: &str, d: &Directive, loader: &dyn Fn(&str) -> WeftResult<String>) -> WeftResult<Vec<String>> {
		let call_id = CallId::new(file, directive::IMPORT, d.line);
		let target = d.import_path();
		if target.is_empty() {
			return Err(WeftError::syntax(call_id, "import: missing path"));
		}
		if self.graph.is_cyclic(file, target) {
			return Err(WeftError::cycle(call_id, file, target));
		}
		self.graph.add(file, target);
		trace!("{call_id}: import {file} -> {target}");
		let content = loader(target)?;
		let rendered = self.run(target, &content, loader)?;
		Ok(rendered.lines().map(|s| s.to_string()).collect())
	}

	/// Cycle-only preflight (`--check`): scans only `import` directive lines,
	/// ignoring all other content and nested `foreach`/`if` state, and walks
	/// transitively through the same `DependencyGraph`/`is_cyclic` the real
	/// run uses. Reports the first cycle found without rendering anything.
	pub fn preflight_imports(&self, file: &str, content: &str, loader: &dyn Fn(&str) -> WeftResult<String>) -> WeftResult<()> {
		let mut visited = std::collections::HashSet::new();
		self.scan_imports(file, content, loader, &mut visited)
	}

	fn scan_imports(&self, file: &str, content: &str, loader: &dyn Fn(&str) -> WeftResult<String>, visited: &mut std::collections::HashSet<String>) -> WeftResult<()> {
		for (i, raw) in content.lines().enumerate() {
			let line_no = i + 1;
			let Some(d) = directive::parse(file, line_no, raw, "", &self.prefixes) else {
				continue;
			};
			if d.name != directive::IMPORT {
				continue;
			}
			let call_id = CallId::new(file, directive::IMPORT, d.line);
			let target = d.import_path();
			if target.is_empty() {
				return Err(WeftError::syntax(call_id, "import: missing path"));
			}
			trace!("{call_id}: preflight import {file} -> {target}");
			if self.graph.is_cyclic(file, target) {
				return Err(WeftError::cycle(call_id, file, target));
			}
			self.graph.add(file, target);
			if visited.insert(target.to_string()) {
				let imported = loader(target)?;
				self.scan_imports(target, &imported, loader, visited)?;
			}
		}
		Ok(())
	}
}
