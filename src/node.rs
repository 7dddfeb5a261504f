//! The document tree model: what the renderer produces and the differ consumes.

use crate::patch::Patch;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Write as _};
use thiserror::Error;
use tracing::{instrument, trace};

/// Comment text that marks the position of a block conditional whose branch was not taken.
pub const CONDITIONAL_MARKER: &str = "dj-if";

/// Attribute that gives an element an explicit reconciliation identity.
pub const KEY_ATTRIBUTE: &str = "data-key";

/// Attribute that turns an element into a [`NodeKind::ComponentBoundary`].
pub const COMPONENT_ATTRIBUTE: &str = "dj-component";

/// Attribute that names a streaming target.
pub const STREAM_ATTRIBUTE: &str = "dj-stream";

const VOID_ELEMENTS: &[&str] = &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr"];

#[must_use]
pub fn is_void_element(tag: &str) -> bool {
	VOID_ELEMENTS.iter().any(|void| void.eq_ignore_ascii_case(tag))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
	Element,
	Text,
	ConditionalMarker,
	ComponentBoundary,
}

/// One tree position.
///
/// A node's `kind` never changes in place. The differ models a kind (or tag) change as remove-then-insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
	pub kind: NodeKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tag: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub attributes: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub children: Vec<Node>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key: Option<String>,
}

impl Node {
	#[must_use]
	pub fn element(tag: impl Into<String>) -> Self {
		Self {
			kind: NodeKind::Element,
			tag: Some(tag.into()),
			attributes: BTreeMap::new(),
			children: Vec::new(),
			text: None,
			key: None,
		}
	}

	#[must_use]
	pub fn text(text: impl Into<String>) -> Self {
		Self {
			kind: NodeKind::Text,
			tag: None,
			attributes: BTreeMap::new(),
			children: Vec::new(),
			text: Some(text.into()),
			key: None,
		}
	}

	#[must_use]
	pub fn marker() -> Self {
		Self {
			kind: NodeKind::ConditionalMarker,
			tag: None,
			attributes: BTreeMap::new(),
			children: Vec::new(),
			text: None,
			key: None,
		}
	}

	/// An embedded live region. The component id is kept as the [`COMPONENT_ATTRIBUTE`].
	#[must_use]
	pub fn component(tag: impl Into<String>, id: impl Into<String>) -> Self {
		let mut node = Self::element(tag).with_attribute(COMPONENT_ATTRIBUTE, id);
		node.kind = NodeKind::ComponentBoundary;
		node
	}

	#[must_use]
	pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		let name = name.into();
		let value = value.into();
		if name == KEY_ATTRIBUTE {
			self.key = Some(value.clone());
		}
		self.attributes.insert(name, value);
		self
	}

	#[must_use]
	pub fn with_key(self, key: impl Into<String>) -> Self {
		self.with_attribute(KEY_ATTRIBUTE, key)
	}

	#[must_use]
	pub fn with_child(mut self, child: Node) -> Self {
		self.children.push(child);
		self
	}

	#[must_use]
	pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
		self.children.extend(children);
		self
	}

	#[must_use]
	pub fn is_text(&self) -> bool {
		self.kind == NodeKind::Text
	}

	/// Whether the differ may update `self` into `other` in place.
	#[must_use]
	pub fn is_compatible(&self, other: &Node) -> bool {
		self.kind == other.kind && self.tag == other.tag
	}

	#[must_use]
	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.attributes.get(name).map(String::as_str)
	}

	#[must_use]
	pub fn at(&self, path: &[usize]) -> Option<&Node> {
		path.iter().try_fold(self, |node, &i| node.children.get(i))
	}

	pub fn at_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
		path.iter().try_fold(self, |node, &i| node.children.get_mut(i))
	}

	/// Depth-first search for the first node satisfying `predicate`, returning its path.
	pub fn find_path(&self, predicate: &mut impl FnMut(&Node) -> bool) -> Option<Vec<usize>> {
		if predicate(self) {
			return Some(Vec::new());
		}
		self.children.iter().enumerate().find_map(|(i, child)| {
			child.find_path(predicate).map(|mut path| {
				path.insert(0, i);
				path
			})
		})
	}

	/// Appends this node's markup to `out`.
	pub fn write_html(&self, out: &mut String) {
		match self.kind {
			NodeKind::Text => escape_text_into(self.text.as_deref().unwrap_or_default(), out),
			NodeKind::ConditionalMarker => {
				out.push_str("<!--");
				out.push_str(CONDITIONAL_MARKER);
				out.push_str("-->");
			}
			NodeKind::Element | NodeKind::ComponentBoundary => {
				let tag = self.tag.as_deref().unwrap_or("div");
				out.push('<');
				out.push_str(tag);
				for (name, value) in &self.attributes {
					if value.is_empty() {
						let _ = write!(out, " {}", name);
					} else {
						let _ = write!(out, " {}=\"", name);
						escape_attribute_into(value, out);
						out.push('"');
					}
				}
				out.push('>');
				if is_void_element(tag) {
					return;
				}
				if is_raw_text_element(tag) {
					for child in &self.children {
						out.push_str(child.text.as_deref().unwrap_or_default());
					}
				} else {
					for child in &self.children {
						child.write_html(out);
					}
				}
				out.push_str("</");
				out.push_str(tag);
				out.push('>');
			}
		}
	}

	#[must_use]
	pub fn to_html(&self) -> String {
		let mut html = String::new();
		self.write_html(&mut html);
		html
	}
}

/// Elements whose content is not markup.
pub(crate) fn is_raw_text_element(tag: &str) -> bool {
	["script", "style"].iter().any(|raw| raw.eq_ignore_ascii_case(tag))
}

/// Escapes HTML-significant characters for text content.
#[must_use]
pub fn escape_html(text: &str) -> String {
	let mut escaped = String::with_capacity(text.len());
	escape_attribute_into(text, &mut escaped);
	escaped
}

fn escape_text_into(text: &str, out: &mut String) {
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			c => out.push(c),
		}
	}
}

fn escape_attribute_into(text: &str, out: &mut String) {
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#x27;"),
			c => out.push(c),
		}
	}
}

/// A rendered document plus the render counter it was produced at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
	pub root: Node,
	pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
	#[error("no node at path {0:?}")]
	NoSuchNode(Vec<usize>),
	#[error("child index {index} out of bounds for node at {path:?} with {len} children")]
	IndexOutOfBounds { path: Vec<usize>, index: usize, len: usize },
	#[error("node at {0:?} is not a text node")]
	NotText(Vec<usize>),
	#[error("node at {0:?} has no attributes")]
	NoAttributes(Vec<usize>),
	#[error("order {order:?} is not a permutation of the {len} children at {path:?}")]
	InvalidOrder { path: Vec<usize>, order: Vec<usize>, len: usize },
}

impl Tree {
	#[must_use]
	pub fn new(root: Node, version: u64) -> Self {
		Self { root, version }
	}

	#[must_use]
	pub fn to_html(&self) -> String {
		self.root.to_html()
	}

	/// Applies `patches` front to back, the same way a client mutates its live tree.
	///
	/// # Errors
	///
	/// Iff a patch does not address an existing, suitable node.
	/// Patches before the failing one stay applied.
	#[instrument(skip(self, patches), fields(count = patches.len()))]
	pub fn apply(&mut self, patches: &[Patch]) -> Result<(), ApplyError> {
		for patch in patches {
			trace!(kind = patch.kind(), "Applying patch.");
			apply_patch(&mut self.root, patch)?;
		}
		Ok(())
	}
}

fn apply_patch(root: &mut Node, patch: &Patch) -> Result<(), ApplyError> {
	let target = root.at_mut(patch.path()).ok_or_else(|| ApplyError::NoSuchNode(patch.path().to_vec()))?;
	match patch {
		Patch::InsertChild { parent_path, index, node } => {
			if *index > target.children.len() {
				return Err(ApplyError::IndexOutOfBounds {
					path: parent_path.clone(),
					index: *index,
					len: target.children.len(),
				});
			}
			target.children.insert(*index, node.clone());
		}
		Patch::RemoveChild { parent_path, index } => {
			if *index >= target.children.len() {
				return Err(ApplyError::IndexOutOfBounds {
					path: parent_path.clone(),
					index: *index,
					len: target.children.len(),
				});
			}
			target.children.remove(*index);
		}
		Patch::ReplaceText { path, text } => {
			if !target.is_text() {
				return Err(ApplyError::NotText(path.clone()));
			}
			target.text = Some(text.clone());
		}
		Patch::SetAttribute { path, name, value } => {
			if !matches!(target.kind, NodeKind::Element | NodeKind::ComponentBoundary) {
				return Err(ApplyError::NoAttributes(path.clone()));
			}
			if name == KEY_ATTRIBUTE {
				target.key = Some(value.clone());
			}
			target.attributes.insert(name.clone(), value.clone());
		}
		Patch::RemoveAttribute { path, name } => {
			if !matches!(target.kind, NodeKind::Element | NodeKind::ComponentBoundary) {
				return Err(ApplyError::NoAttributes(path.clone()));
			}
			if name == KEY_ATTRIBUTE {
				target.key = None;
			}
			target.attributes.remove(name);
		}
		Patch::ReorderChildren { parent_path, order } => {
			let len = target.children.len();
			let mut seen = vec![false; len];
			let is_permutation = order.len() == len && order.iter().all(|&i| i < len && !std::mem::replace(&mut seen[i], true));
			if !is_permutation {
				return Err(ApplyError::InvalidOrder {
					path: parent_path.clone(),
					order: order.clone(),
					len,
				});
			}
			let mut old: Vec<Option<Node>> = target.children.drain(..).map(Some).collect();
			target.children = order.iter().filter_map(|&i| old[i].take()).collect();
		}
	}
	Ok(())
}
