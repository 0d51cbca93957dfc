//! `foreach`/`foreachend` state: a stack of captured-line buffers
//! supporting nested loops, evaluated by replaying each state's captured
//! body once per enumerated binding.
//!
//! Same-kind nesting (`foreach` directly inside `foreach`) is tracked
//! structurally via child states and `jumps`, exactly as laid out in the
//! data model. A block of a *different* kind (`if`, `var`, `ignore`)
//! encountered while a foreach body is being captured is appended as raw,
//! unresolved text; the caller's `replay` callback re-interprets that text
//! fresh for every binding, which is what gives `if` inside `foreach` its
//! per-iteration re-evaluation (see the interpreter module for that pass).

use log::trace;

use crate::error::WeftResult;
use crate::token::Scope;
use crate::variable::{ChainScope, Registry, Variable, VariableStore};

/// One `foreach` block's captured state.
#[derive(Debug, Default)]
pub struct ForeachState {
	pub file: String,
	pub args: Vec<String>,
	pub indent: String,
	/// `(line_offset, child_state_index)`: a nested `foreach` opened at this
	/// offset within `lines`, so replay can recurse in the right place.
	pub jumps: Vec<(usize, usize)>,
	pub lines: Vec<String>,
	pub closed: bool,
	pub previous_state_index: Option<usize>,
	/// Absolute line counter for Case D bindings, surviving across repeated
	/// evaluations of this same state (nested loops don't reset it).
	next_line: usize,
}

/// A single iteration's bindings (`index`, `value`, `name`, `line`).
#[derive(Clone, Debug, Default)]
pub struct Binding {
	pub index: usize,
	pub value: String,
	pub name: String,
	pub line: usize,
}

fn foreach_key(file: &str, state_idx: usize) -> String {
	format!("{file}#foreach{state_idx}")
}

fn strip_markers(arg: &str) -> &str {
	arg.trim().trim_start_matches('[').trim_end_matches(']').trim().trim_start_matches("{{").trim_end_matches("}}").trim()
}

/// Enumerates the bindings for a `foreach` directive's argument list
/// (cases A-D of the iteration semantics).
fn enumerate_bindings(args: &[String], scope: &dyn Scope, store: &VariableStore, next_line: &mut usize) -> Vec<Binding> {
	let push = |out: &mut Vec<Binding>, value: String, name: String, next_line: &mut usize| {
		let binding = Binding { index: out.len(), value, name, line: *next_line };
		*next_line += 1;
		out.push(binding);
	};

	if args.len() == 1 {
		let arg = strip_markers(&args[0]);
		if let Some(n) = arg.parse::<u64>().ok().or_else(|| scope.lookup(arg).and_then(|v| v.parse::<u64>().ok())) {
			let mut out = Vec::new();
			for i in 0..n {
				push(&mut out, i.to_string(), String::new(), next_line);
			}
			return out;
		}
		if arg == "GLOBAL_VARS" {
			let mut out = Vec::new();
			for v in store.global_all() {
				push(&mut out, v.value, v.name, next_line);
			}
			return out;
		}
		if let Some(basename) = arg.strip_prefix("GLOBAL_VARS_") {
			let mut out = Vec::new();
			for v in store.lookup_all(Registry::Global, basename) {
				push(&mut out, v.value, v.name, next_line);
			}
			return out;
		}
	}

	let mut out = Vec::new();
	for arg in args {
		let trimmed = strip_markers(arg);
		if let Some(value) = scope.lookup(trimmed) {
			push(&mut out, value, trimmed.to_string(), next_line);
		}
	}
	out
}

/// Re-interprets a flat span of raw captured lines for one binding,
/// returning the fully resolved output lines. Supplied by the interpreter,
/// which alone knows how to dispatch `var`/`if`/`ignore` directives found in
/// that text (see [`crate::interpreter`]).
pub type Replay<'a> = dyn Fn(&[String], &dyn Scope, &str) -> WeftResult<Vec<String>> + 'a;

/// Stack of [`ForeachState`]s for one interpretation pass (the top-level
/// file, or one replay of an enclosing block).
#[derive(Debug, Default)]
pub struct ForeachBuffer {
	states: Vec<ForeachState>,
	pre_eval_idx: Option<usize>,
}

impl ForeachBuffer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_active(&self) -> bool {
		!self.states.is_empty() && !self.states[0].closed
	}

	pub fn push_state(&mut self, file: &str, args: Vec<String>, indent: &str) {
		let new_idx = self.states.len();
		if let Some(idx) = self.pre_eval_idx {
			let offset = self.states[idx].lines.len();
			self.states[idx].jumps.push((offset, new_idx));
		}
		self.states.push(ForeachState {
			file: file.to_string(),
			args,
			indent: indent.to_string(),
			previous_state_index: self.pre_eval_idx,
			..Default::default()
		});
		trace!("{file}: foreach push state {new_idx}");
		self.pre_eval_idx = Some(new_idx);
	}

	pub fn append_line(&mut self, line: String) {
		if let Some(idx) = self.pre_eval_idx {
			self.states[idx].lines.push(line);
		}
	}

	/// Closes the state currently absorbing lines. Returns `true` if that
	/// was the outermost state (the whole buffer is now closed and ready
	/// for [`ForeachBuffer::evaluate`]).
	pub fn close_current(&mut self) -> bool {
		let Some(idx) = self.pre_eval_idx else {
			return true;
		};
		self.states[idx].closed = true;
		trace!("{}: foreach close state {idx}", self.states[idx].file);
		self.pre_eval_idx = self.states[idx].previous_state_index;
		self.pre_eval_idx.is_none()
	}

	fn chain_scope<'a>(&self, start: Option<usize>, file: &str, store: &'a VariableStore) -> ChainScope<'a> {
		let mut keys = Vec::new();
		let mut cur = start;
		while let Some(idx) = cur {
			keys.push(foreach_key(file, idx));
			cur = self.states[idx].previous_state_index;
		}
		ChainScope::new(store, file, keys)
	}

	/// Evaluates the whole closed tree rooted at state 0, then discards it.
	pub fn evaluate(&mut self, store: &VariableStore, replay: &Replay<'_>) -> WeftResult<Vec<String>> {
		let output = self.eval_state(0, store, replay)?;
		self.states.clear();
		self.pre_eval_idx = None;
		Ok(output)
	}

	fn eval_state(&mut self, state_idx: usize, store: &VariableStore, replay: &Replay<'_>) -> WeftResult<Vec<String>> {
		let file = self.states[state_idx].file.clone();
		let args = self.states[state_idx].args.clone();
		let indent = self.states[state_idx].indent.clone();
		let jumps = self.states[state_idx].jumps.clone();
		let lines = self.states[state_idx].lines.clone();
		let total = lines.len();
		let key = foreach_key(&file, state_idx);

		let parent_scope = self.chain_scope(self.states[state_idx].previous_state_index, &file, store);
		let bindings = enumerate_bindings(&args, &parent_scope, store, &mut self.states[state_idx].next_line);

		let mut output = Vec::new();
		for binding in bindings {
			store.set(Registry::Foreach, &key, Variable::new("index", binding.index.to_string()));
			store.set(Registry::Foreach, &key, Variable::new("value", binding.value.clone()));
			store.set(Registry::Foreach, &key, Variable::new("name", binding.name.clone()));
			store.set(Registry::Foreach, &key, Variable::new("line", binding.line.to_string()));

			let scope = self.chain_scope(Some(state_idx), &file, store);
			let mut segment_start = 0usize;
			for ln in 0..=total {
				let jump = jumps.iter().find(|(offset, _)| *offset == ln);
				if ln == total || jump.is_some() {
					if ln > segment_start {
						let segment = &lines[segment_start..ln];
						let resolved = replay(segment, &scope, &key)?;
						output.extend(resolved.into_iter().map(|l| format!("{indent}{l}")));
					}
					if let Some((_, child_idx)) = jump {
						let child_out = self.eval_state(*child_idx, store, replay)?;
						output.extend(child_out);
					}
					segment_start = ln;
				}
			}
		}
		store.clear_foreach(&key);
		Ok(output)
	}
}
