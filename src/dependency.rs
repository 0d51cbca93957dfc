//! Tracks `importer -> imported` edges and detects cycles before an `import`
//! directive is followed.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct DependencyGraph {
	edges: RwLock<HashMap<String, Vec<String>>>,
}

impl DependencyGraph {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&self, from: &str, to: &str) {
		let mut edges = self.edges.write().unwrap();
		edges.entry(from.to_string()).or_default().push(to.to_string());
	}

	/// True if following `candidate` would (eventually) lead back to `start`,
	/// or if `start == candidate` (a direct self-import). The visited set is
	/// per call, since edges can be added mid-run.
	pub fn is_cyclic(&self, start: &str, candidate: &str) -> bool {
		if start == candidate {
			return true;
		}
		let edges = self.edges.read().unwrap();
		let mut visited: HashSet<String> = HashSet::new();
		let mut stack = vec![candidate.to_string()];
		while let Some(node) = stack.pop() {
			if node == start {
				return true;
			}
			if !visited.insert(node.clone()) {
				continue;
			}
			if let Some(children) = edges.get(&node) {
				stack.extend(children.iter().cloned());
			}
		}
		false
	}
}
