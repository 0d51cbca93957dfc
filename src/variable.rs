//! Variable storage: the three named registries (global, local, foreach) that
//! back every `{{name}}` lookup and `var` assignment.
//!
//! This mirrors the teacher's register module (a name-keyed bucket of
//! content, read/written through free functions) but generalizes the bucket
//! key from a single vim-register character to an arbitrary string, and adds
//! a lock so a multi-file driver can share the global bucket safely.

use std::collections::HashMap;
use std::sync::RwLock;

/// A single (name, value) pair. Equality is by name within a register.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Variable {
	pub name: String,
	pub value: String,
}

impl Variable {
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self { name: name.into(), value: value.into() }
	}

	/// The sentinel returned by a failed lookup: empty name, empty value.
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.name.is_empty()
	}
}

/// One named bucket of variables. Preserves insertion order; reassigning a
/// name updates the value in place rather than appending a duplicate.
#[derive(Clone, Debug, Default)]
pub struct VariableRegister {
	order: Vec<String>,
	by_name: HashMap<String, String>,
}

impl VariableRegister {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set(&mut self, var: Variable) {
		if !self.by_name.contains_key(&var.name) {
			self.order.push(var.name.clone());
		}
		self.by_name.insert(var.name, var.value);
	}

	pub fn get(&self, name: &str) -> Option<Variable> {
		self.by_name.get(name).map(|value| Variable::new(name, value.clone()))
	}

	pub fn all(&self) -> Vec<Variable> {
		self.order
			.iter()
			.filter_map(|name| self.by_name.get(name).map(|value| Variable::new(name.clone(), value.clone())))
			.collect()
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}
}

#[derive(Debug, Default)]
struct Buckets(RwLock<HashMap<String, VariableRegister>>);

impl Buckets {
	fn set(&self, key: &str, var: Variable) {
		let mut map = self.0.write().unwrap();
		map.entry(key.to_string()).or_default().set(var);
	}

	fn get(&self, key: &str, name: &str) -> Option<Variable> {
		let map = self.0.read().unwrap();
		map.get(key).and_then(|reg| reg.get(name))
	}

	fn all(&self, key: &str) -> Vec<Variable> {
		let map = self.0.read().unwrap();
		map.get(key).map(|reg| reg.all()).unwrap_or_default()
	}

	fn keys(&self) -> Vec<String> {
		let map = self.0.read().unwrap();
		map.keys().cloned().collect()
	}

	fn remove(&self, key: &str) {
		let mut map = self.0.write().unwrap();
		map.remove(key);
	}
}

/// Which of the three registries a lookup or assignment targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registry {
	Global,
	Local,
	Foreach,
}

/// The shared store behind every variable lookup in a run.
///
/// `Global` is sub-keyed by the basename of the variable file it came from,
/// so `len(GLOBAL_VARS_<name>)` can answer per-file counts, but
/// [`VariableStore::global_all`] flattens across every sub-key for
/// `GLOBAL_VARS`.
#[derive(Debug, Default)]
pub struct VariableStore {
	global: Buckets,
	local: Buckets,
	foreach: Buckets,
}

impl VariableStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn buckets(&self, registry: Registry) -> &Buckets {
		match registry {
			Registry::Global => &self.global,
			Registry::Local => &self.local,
			Registry::Foreach => &self.foreach,
		}
	}

	pub fn set(&self, registry: Registry, key: &str, var: Variable) {
		self.buckets(registry).set(key, var);
	}

	pub fn lookup(&self, registry: Registry, key: &str, name: &str) -> Option<Variable> {
		self.buckets(registry).get(key, name)
	}

	pub fn lookup_all(&self, registry: Registry, key: &str) -> Vec<Variable> {
		self.buckets(registry).all(key)
	}

	/// All global variables across every source file, in file-arrival order.
	pub fn global_all(&self) -> Vec<Variable> {
		let mut keys = self.global.keys();
		keys.sort();
		keys.into_iter().flat_map(|key| self.global.all(&key)).collect()
	}

	/// Finds a global variable by name regardless of which variable file it
	/// came from. Buckets are scanned in sorted-key order so the result is
	/// deterministic when the same name exists in more than one file.
	pub fn global_lookup(&self, name: &str) -> Option<Variable> {
		self.global_all().into_iter().find(|v| v.name == name)
	}

	/// Clear a foreach-scoped bucket once its loop has finished; those
	/// assignments must not leak past the loop.
	pub fn clear_foreach(&self, key: &str) {
		self.foreach.remove(key);
	}

	/// Parse a free-form `name = value` token stream.
	///
	/// Accepts `x=y`, `x= y`, `x =y`, `x = y`, `x  =  y`, splitting on the
	/// first `=` only, trimming surrounding whitespace, and stripping at
	/// most one matching pair of outer single or double quotes from the
	/// value. Returns an empty-name [`Variable`] on malformed input
	/// (no `=`, empty name, or empty value) — the caller decides whether
	/// that's a hard error or something to skip.
	pub fn parse_declaration(tokens: &str) -> Variable {
		let Some((name, value)) = tokens.split_once('=') else {
			return Variable::empty();
		};
		let name = name.trim();
		let mut value = value.trim();
		if value.len() >= 2 {
			let bytes = value.as_bytes();
			let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
			if first == last && (first == b'\'' || first == b'"') {
				value = &value[1..value.len() - 1];
			}
		}
		if name.is_empty() || value.is_empty() {
			return Variable::empty();
		}
		Variable::new(name, value)
	}
}

/// A [`crate::token::Scope`] over the live chain of foreach bindings (from
/// innermost enclosing loop outward) plus the local and global registries.
/// Built fresh for every directive/content line so it always reflects the
/// bindings currently in effect.
pub struct ChainScope<'a> {
	store: &'a VariableStore,
	file: String,
	foreach_keys: Vec<String>,
}

impl<'a> ChainScope<'a> {
	pub fn new(store: &'a VariableStore, file: impl Into<String>, foreach_keys: Vec<String>) -> Self {
		Self { store, file: file.into(), foreach_keys }
	}
}

impl crate::token::Scope for ChainScope<'_> {
	fn lookup(&self, name: &str) -> Option<String> {
		for key in &self.foreach_keys {
			if let Some(v) = self.store.lookup(Registry::Foreach, key, name) {
				return Some(v.value);
			}
		}
		if let Some(v) = self.store.lookup(Registry::Local, &self.file, name) {
			return Some(v.value);
		}
		self.store.global_lookup(name).map(|v| v.value)
	}
}
