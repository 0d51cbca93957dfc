//! `if`/`else`/`ifend` state: a stack of branch buffers, since `if` can
//! nest inside `if` (the innermost `else`/`ifend` always applies to the
//! most recently opened state).

use log::trace;

use crate::error::{CallId, WeftError, WeftResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WritePointer {
	Then,
	Else,
}

#[derive(Debug)]
struct IfState {
	then_lines: Vec<String>,
	else_lines: Vec<String>,
	taken: bool,
	write_pointer: WritePointer,
}

/// Evaluates `<left> <op> <right>` (both sides already template-resolved).
/// Equality is byte-equality; the four ordering operators parse both sides
/// as floats.
pub fn eval_condition(left: &str, op: &str, right: &str, call_id: &CallId) -> WeftResult<bool> {
	match op {
		"=" | "==" => Ok(left == right),
		"!=" | "<>" => Ok(left != right),
		">" | ">=" | "<" | "<=" => {
			let l: f64 = left.trim().parse().map_err(|_| WeftError::parse(call_id.clone(), format!("if: expected a number, found '{left}'")))?;
			let r: f64 = right.trim().parse().map_err(|_| WeftError::parse(call_id.clone(), format!("if: expected a number, found '{right}'")))?;
			Ok(match op {
				">" => l > r,
				">=" => l >= r,
				"<" => l < r,
				"<=" => l <= r,
				_ => unreachable!(),
			})
		}
		other => Err(WeftError::syntax(call_id.clone(), format!("if: unknown operator '{other}'"))),
	}
}

/// A stack of open `if` states. A single [`IfBuffer`] instance is scoped to
/// one interpretation pass (the top-level file, or one replay of a
/// `foreach` body) — nested `if`s within that pass share it, but a fresh
/// pass always gets its own buffer.
#[derive(Debug, Default)]
pub struct IfBuffer {
	stack: Vec<IfState>,
}

impl IfBuffer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_active(&self) -> bool {
		!self.stack.is_empty()
	}

	pub fn open(&mut self, taken: bool) {
		let new_idx = self.stack.len();
		self.stack.push(IfState { then_lines: Vec::new(), else_lines: Vec::new(), taken, write_pointer: WritePointer::Then });
		trace!("if push state {new_idx} (taken={taken})");
	}

	pub fn move_to_else(&mut self, call_id: &CallId) -> WeftResult<()> {
		let state = self.stack.last_mut().ok_or_else(|| WeftError::syntax(call_id.clone(), "else: no open if block"))?;
		state.write_pointer = WritePointer::Else;
		Ok(())
	}

	pub fn append_line(&mut self, line: String) {
		if let Some(state) = self.stack.last_mut() {
			match state.write_pointer {
				WritePointer::Then => state.then_lines.push(line),
				WritePointer::Else => state.else_lines.push(line),
			}
		}
	}

	/// Pops the innermost state and returns its taken branch's raw lines,
	/// plus whether the whole stack is now empty (the outermost `if` just
	/// closed). When the stack is still non-empty, the caller should splice
	/// the returned lines back into the now-current (parent) state via
	/// [`IfBuffer::append_line`] — they stay unresolved until the outermost
	/// `ifend` fires.
	pub fn close(&mut self, call_id: &CallId) -> WeftResult<(Vec<String>, bool)> {
		let state = self.stack.pop().ok_or_else(|| WeftError::syntax(call_id.clone(), "ifend: no open if block"))?;
		let idx = self.stack.len();
		trace!("if close state {idx}");
		let taken = if state.taken { state.then_lines } else { state.else_lines };
		Ok((taken, self.stack.is_empty()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cid() -> CallId {
		CallId::unknown()
	}

	#[test]
	fn equality_is_byte_equality() {
		assert!(eval_condition("World", "==", "World", &cid()).unwrap());
		assert!(!eval_condition("World", "==", "world", &cid()).unwrap());
	}

	#[test]
	fn ordering_parses_both_sides_as_floats() {
		assert!(eval_condition("5", ">", "3", &cid()).unwrap());
		assert!(!eval_condition("1", ">", "3", &cid()).unwrap());
		assert!(eval_condition("1", "<=", "1", &cid()).unwrap());
	}

	#[test]
	fn ordering_rejects_non_numeric_input() {
		assert!(eval_condition("abc", ">", "3", &cid()).is_err());
	}

	#[test]
	fn unknown_operator_is_an_error() {
		assert!(eval_condition("1", "~", "2", &cid()).is_err());
	}

	#[test]
	fn nested_if_resolves_innermost_first() {
		let mut ifs = IfBuffer::new();
		ifs.open(true); // outer
		ifs.append_line("outer-then-1".into());
		ifs.open(false); // inner, else taken
		ifs.append_line("inner-then".into());
		ifs.move_to_else(&cid()).unwrap();
		ifs.append_line("inner-else".into());
		let (inner_taken, empty) = ifs.close(&cid()).unwrap();
		assert!(!empty);
		assert_eq!(inner_taken, vec!["inner-else".to_string()]);
		for l in inner_taken {
			ifs.append_line(l);
		}
		let (outer_taken, empty) = ifs.close(&cid()).unwrap();
		assert!(empty);
		assert_eq!(outer_taken, vec!["outer-then-1".to_string(), "inner-else".to_string()]);
	}

	#[test]
	fn close_without_open_is_an_error() {
		let mut ifs = IfBuffer::new();
		assert!(ifs.close(&cid()).is_err());
	}
}
