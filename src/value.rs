//! Render context values.
//!
//! State reaches templates as [`serde_json::Value`]s. This module adds template semantics on top:
//! truthiness, display formatting and dotted-path lookup through nested scopes.

use hashbrown::HashSet;
pub use serde_json::{Map, Value};

/// Template truthiness: `null`, `""`, numeric zero and `false` are falsy, everything else is truthy.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(b) => *b,
		Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
		Value::String(s) => !s.is_empty(),
		Value::Array(_) | Value::Object(_) => true,
	}
}

/// How a value prints when interpolated.
#[must_use]
pub fn display(value: &Value) -> String {
	match value {
		Value::Null => String::new(),
		Value::String(s) => s.clone(),
		Value::Bool(b) => b.to_string(),
		Value::Number(n) => n.to_string(),
		Value::Array(_) | Value::Object(_) => value.to_string(),
	}
}

/// Variables visible to a render, as a stack of scopes.
///
/// Loops push a scope per iteration. Lookups walk from the innermost scope outwards.
#[derive(Debug, Clone, Default)]
pub struct Context {
	scopes: Vec<Map<String, Value>>,
	safe: HashSet<String>,
}

impl Context {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Uses the fields of a JSON object as top-level variables. Any other value yields an empty context.
	#[must_use]
	pub fn from_value(value: Value) -> Self {
		match value {
			Value::Object(map) => Self {
				scopes: vec![map],
				safe: HashSet::new(),
			},
			_ => Self::new(),
		}
	}

	pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
		if self.scopes.is_empty() {
			self.scopes.push(Map::new());
		}
		if let Some(scope) = self.scopes.last_mut() {
			scope.insert(name.into(), value.into());
		}
	}

	/// Marks a top-level variable as pre-escaped markup, so interpolating it bypasses escaping.
	pub fn mark_safe(&mut self, name: impl Into<String>) {
		self.safe.insert(name.into());
	}

	#[must_use]
	pub fn is_safe(&self, path: &str) -> bool {
		self.safe.contains(path)
	}

	pub(crate) fn push_scope(&mut self, scope: Map<String, Value>) {
		self.scopes.push(scope);
	}

	pub(crate) fn pop_scope(&mut self) {
		self.scopes.pop();
	}

	/// Resolves a dotted path such as `user.name` or `items.0.title`.
	#[must_use]
	pub fn get(&self, path: &str) -> Option<&Value> {
		let mut segments = path.split('.');
		let head = segments.next()?;
		let root = self.scopes.iter().rev().find_map(|scope| scope.get(head))?;
		segments.try_fold(root, |value, segment| match value {
			Value::Object(map) => map.get(segment),
			Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
			_ => None,
		})
	}
}
