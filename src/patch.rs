//! Patch operations and their wire encoding.

use crate::node::Node;
use serde::{Deserialize, Serialize};

/// A positional address from the tree root: child indices, outermost first.
///
/// The empty path addresses the root itself.
pub type Path = Vec<usize>;

/// One atomic mutation of a client's live tree.
///
/// Serializes as `{"type": "<Variant>", "path": [...], ...}`.
/// For the child-list operations, `path` addresses the **parent**.
///
/// Order within a patch list is load-bearing: it is applied front to back.
/// Per parent, [`Patch::RemoveChild`]s come first (in descending index order),
/// followed by at most one [`Patch::ReorderChildren`] and then [`Patch::InsertChild`]s in ascending index order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Patch {
	InsertChild {
		#[serde(rename = "path")]
		parent_path: Path,
		index: usize,
		node: Node,
	},
	RemoveChild {
		#[serde(rename = "path")]
		parent_path: Path,
		index: usize,
	},
	ReplaceText {
		path: Path,
		text: String,
	},
	SetAttribute {
		path: Path,
		name: String,
		value: String,
	},
	RemoveAttribute {
		path: Path,
		name: String,
	},
	/// After this patch, the child at position `i` is the one that was at `order[i]` before it.
	ReorderChildren {
		#[serde(rename = "path")]
		parent_path: Path,
		order: Vec<usize>,
	},
}

impl Patch {
	/// The path this patch is addressed to (the parent for child-list operations).
	#[must_use]
	pub fn path(&self) -> &[usize] {
		match self {
			Patch::InsertChild { parent_path, .. } | Patch::RemoveChild { parent_path, .. } | Patch::ReorderChildren { parent_path, .. } => parent_path,
			Patch::ReplaceText { path, .. } | Patch::SetAttribute { path, .. } | Patch::RemoveAttribute { path, .. } => path,
		}
	}

	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			Patch::InsertChild { .. } => "InsertChild",
			Patch::RemoveChild { .. } => "RemoveChild",
			Patch::ReplaceText { .. } => "ReplaceText",
			Patch::SetAttribute { .. } => "SetAttribute",
			Patch::RemoveAttribute { .. } => "RemoveAttribute",
			Patch::ReorderChildren { .. } => "ReorderChildren",
		}
	}
}

/// Size in bytes of `patches` as they would go over the wire.
///
/// # Errors
///
/// Iff serialization fails, which would point to a non-string map key somewhere in a node.
pub fn serialized_size(patches: &[Patch]) -> Result<usize, serde_json::Error> {
	serde_json::to_vec(patches).map(|bytes| bytes.len())
}
