//! The error taxonomy shared by every core component.
//!
//! Each variant carries a human message and, where one is available, a
//! call-id of the form `<file>:<directive>:<line>` identifying where the
//! failure happened.

use std::fmt;

/// A `<file>:<directive>:<line>` label attached to most error variants.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallId {
	pub file: String,
	pub directive: String,
	pub line: usize,
}

impl CallId {
	pub fn new(file: impl Into<String>, directive: impl Into<String>, line: usize) -> Self {
		Self { file: file.into(), directive: directive.into(), line }
	}

	pub fn unknown() -> Self {
		Self { file: "<unknown>".into(), directive: "".into(), line: 0 }
	}
}

impl fmt::Display for CallId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}:{}", self.file, self.directive, self.line)
	}
}

#[derive(thiserror::Error, Debug)]
pub enum WeftError {
	/// Malformed directive: wrong arg count, unknown directive, unknown
	/// operator, empty var name/value, missing import path.
	#[error("{call_id}: {message}")]
	Syntax { call_id: CallId, message: String },

	/// `import` would introduce a cycle.
	#[error("{call_id}: import cycle detected: {from} -> {to}")]
	Cycle { call_id: CallId, from: String, to: String },

	/// Failure reading/writing a file.
	#[error("{0}")]
	Io(#[from] std::io::Error),

	/// A function expected a numeric argument and got non-numeric input.
	#[error("{call_id}: {message}")]
	Parse { call_id: CallId, message: String },

	/// A template called a name that isn't in the function library.
	#[error("{call_id}: unknown function '{name}'")]
	UnknownFunction { call_id: CallId, name: String },
}

impl WeftError {
	pub fn syntax(call_id: CallId, message: impl Into<String>) -> Self {
		Self::Syntax { call_id, message: message.into() }
	}

	pub fn parse(call_id: CallId, message: impl Into<String>) -> Self {
		Self::Parse { call_id, message: message.into() }
	}

	pub fn unknown_function(call_id: CallId, name: impl Into<String>) -> Self {
		Self::UnknownFunction { call_id, name: name.into() }
	}

	pub fn cycle(call_id: CallId, from: impl Into<String>, to: impl Into<String>) -> Self {
		Self::Cycle { call_id, from: from.into(), to: to.into() }
	}
}

pub type WeftResult<T> = Result<T, WeftError>;
