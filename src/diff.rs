use crate::{
	node::{Node, NodeKind, Tree},
	patch::{Patch, Path},
};
use core::hash::Hash;
use hashbrown::{hash_map::Entry, HashMap};
use thiserror::Error;
use tracing::{instrument, trace, trace_span, warn};

/// The trees can't be reconciled with incremental patches. The caller should send full markup instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffIncompatible {
	#[error("root changed from {previous:?} <{previous_tag}> to {current:?} <{current_tag}>")]
	RootMismatch {
		previous: NodeKind,
		previous_tag: String,
		current: NodeKind,
		current_tag: String,
	},
	#[error("depth limit reached")]
	DepthLimit,
}

/// Compares two document trees and produces the ordered patch list that turns the first into the second.
///
/// # Ordering
///
/// For each node, attribute/text patches come first, then its child list is reconciled:
/// every [`Patch::RemoveChild`] (descending index), at most one [`Patch::ReorderChildren`], then every [`Patch::InsertChild`] (ascending index).
/// Only after that do patches for surviving children follow, addressed by their **new** index.
/// Applying the list front to back against a model of the previous tree yields the current one.
#[derive(Debug)]
pub struct Differ {
	depth_limit: usize,
	patches: Vec<Patch>,
}

impl Default for Differ {
	fn default() -> Self {
		Self::new(256)
	}
}

impl Differ {
	#[must_use]
	pub fn new(depth_limit: usize) -> Self {
		Self { depth_limit, patches: Vec::new() }
	}

	/// # Errors
	///
	/// [`DiffIncompatible`] iff the roots differ in kind or tag, or the trees are nested deeper than the limit.
	#[instrument(skip(self, previous, current), fields(previous.version = previous.version, current.version = current.version))]
	pub fn diff(&mut self, previous: &Tree, current: &Tree) -> Result<Vec<Patch>, DiffIncompatible> {
		if !previous.root.is_compatible(&current.root) {
			return Err(DiffIncompatible::RootMismatch {
				previous: previous.root.kind,
				previous_tag: previous.root.tag.clone().unwrap_or_default(),
				current: current.root.kind,
				current_tag: current.root.tag.clone().unwrap_or_default(),
			});
		}
		self.diff_subtree(&previous.root, &current.root, Vec::new())
	}

	/// Diffs two compatible nodes that live at `path`.
	///
	/// # Errors
	///
	/// Iff the depth limit is reached or the nodes themselves are not compatible.
	pub fn diff_subtree(&mut self, previous: &Node, current: &Node, mut path: Path) -> Result<Vec<Patch>, DiffIncompatible> {
		self.patches.clear();
		if !previous.is_compatible(current) {
			return Err(DiffIncompatible::RootMismatch {
				previous: previous.kind,
				previous_tag: previous.tag.clone().unwrap_or_default(),
				current: current.kind,
				current_tag: current.tag.clone().unwrap_or_default(),
			});
		}
		let result = self.diff_node(previous, current, &mut path, self.depth_limit);
		let patches = std::mem::take(&mut self.patches);
		result.map(|()| {
			trace!(count = patches.len(), "Diff complete.");
			patches
		})
	}

	fn diff_node(&mut self, a: &Node, b: &Node, path: &mut Path, depth_limit: usize) -> Result<(), DiffIncompatible> {
		if depth_limit == 0 {
			warn!("Depth limit reached");
			return Err(DiffIncompatible::DepthLimit);
		}
		debug_assert!(a.is_compatible(b));

		match b.kind {
			NodeKind::Text => {
				if a.text != b.text {
					let span = trace_span!("Replacing text");
					let _enter = span.enter();
					log_path(path);
					self.patches.push(Patch::ReplaceText {
						path: path.clone(),
						text: b.text.clone().unwrap_or_default(),
					});
				}
				Ok(())
			}
			NodeKind::ConditionalMarker => Ok(()),
			NodeKind::Element | NodeKind::ComponentBoundary => {
				let span = trace_span!("Diffing element", tag = b.tag.as_deref().unwrap_or_default());
				let _enter = span.enter();
				self.diff_attributes(a, b, path);
				self.diff_children(&a.children, &b.children, path, depth_limit)
			}
		}
	}

	fn diff_attributes(&mut self, a: &Node, b: &Node, path: &[usize]) {
		for name in a.attributes.keys().filter(|name| !b.attributes.contains_key(*name)) {
			self.patches.push(Patch::RemoveAttribute {
				path: path.to_vec(),
				name: name.clone(),
			});
		}
		for (name, value) in &b.attributes {
			if a.attributes.get(name) != Some(value) {
				self.patches.push(Patch::SetAttribute {
					path: path.to_vec(),
					name: name.clone(),
					value: value.clone(),
				});
			}
		}
	}

	fn diff_children(&mut self, a: &[Node], b: &[Node], path: &mut Path, depth_limit: usize) -> Result<(), DiffIncompatible> {
		if a.is_empty() && b.is_empty() {
			return Ok(());
		}

		let plan = if a.iter().chain(b).any(|node| node.key.is_some()) {
			let span = trace_span!("Diffing keyed", a.len = a.len(), b.len = b.len());
			let _enter = span.enter();
			plan_keyed(a, b)
		} else {
			let span = trace_span!("Diffing positional", a.len = a.len(), b.len = b.len());
			let _enter = span.enter();
			plan_positional(a, b)
		};

		for &index in plan.removals.iter().rev() {
			self.patches.push(Patch::RemoveChild { parent_path: path.clone(), index });
		}
		if let Some(order) = plan.order {
			self.patches.push(Patch::ReorderChildren { parent_path: path.clone(), order });
		}
		for &index in &plan.insertions {
			self.patches.push(Patch::InsertChild {
				parent_path: path.clone(),
				index,
				node: b[index].clone(),
			});
		}

		for (i, j) in plan.matches {
			path.push(j);
			let result = self.diff_node(&a[i], &b[j], path, depth_limit - 1);
			path.pop();
			result?;
		}
		Ok(())
	}
}

/// How one child list turns into another.
///
/// `removals` index the previous list and are ascending (they are emitted in reverse).
/// `order` permutes the survivors, `insertions` index the current list and are ascending.
/// `matches` pairs `(previous, current)` indices of children that are diffed in place.
#[derive(Debug, Default, PartialEq, Eq)]
struct ChildPlan {
	removals: Vec<usize>,
	order: Option<Vec<usize>>,
	insertions: Vec<usize>,
	matches: Vec<(usize, usize)>,
}

fn plan_positional(a: &[Node], b: &[Node]) -> ChildPlan {
	let common = a.len().min(b.len());
	let mut plan = ChildPlan::default();
	for i in 0..common {
		if a[i].is_compatible(&b[i]) {
			plan.matches.push((i, i));
		} else {
			plan.removals.push(i);
			plan.insertions.push(i);
		}
	}
	plan.removals.extend(common..a.len());
	plan.insertions.extend(common..b.len());
	plan
}

/// Reconciliation identity of a child in a keyed list. Unkeyed children fall back to their position among the unkeyed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Identity<'a> {
	Key(&'a str),
	Unkeyed(usize),
}

fn identities(nodes: &[Node]) -> impl Iterator<Item = Identity<'_>> {
	let mut unkeyed = 0;
	nodes.iter().map(move |node| match &node.key {
		Some(key) => Identity::Key(key),
		None => {
			unkeyed += 1;
			Identity::Unkeyed(unkeyed - 1)
		}
	})
}

fn first_positions<K: Hash + Eq>(ids: impl Iterator<Item = K>) -> HashMap<K, usize> {
	let mut positions = HashMap::new();
	for (i, id) in ids.enumerate() {
		match positions.entry(id) {
			Entry::Occupied(_) => warn!("Duplicate child key encountered. Later duplicates are recreated rather than matched."),
			Entry::Vacant(vacant) => {
				vacant.insert(i);
			}
		}
	}
	positions
}

fn plan_keyed(a: &[Node], b: &[Node]) -> ChildPlan {
	let old_positions = first_positions(identities(a));

	let mut claimed = vec![false; a.len()];
	let mut new_to_old = vec![None; b.len()];
	for (j, id) in identities(b).enumerate() {
		if let Some(&i) = old_positions.get(&id) {
			if !claimed[i] && a[i].is_compatible(&b[j]) {
				claimed[i] = true;
				new_to_old[j] = Some(i);
			}
		}
	}

	let mut plan = ChildPlan {
		removals: (0..a.len()).filter(|&i| !claimed[i]).collect(),
		..ChildPlan::default()
	};

	// Position of each survivor once the removals are through.
	let mut survivor_positions = vec![usize::MAX; a.len()];
	for (position, i) in (0..a.len()).filter(|&i| claimed[i]).enumerate() {
		survivor_positions[i] = position;
	}

	let order: Vec<usize> = new_to_old.iter().filter_map(|&i| i.map(|i| survivor_positions[i])).collect();
	if order.iter().enumerate().any(|(k, &position)| k != position) {
		plan.order = Some(order);
	}

	for (j, i) in new_to_old.into_iter().enumerate() {
		match i {
			Some(i) => plan.matches.push((i, j)),
			None => plan.insertions.push(j),
		}
	}
	plan
}

fn log_path(path: &[usize]) {
	if cfg!(feature = "log-paths") {
		trace!(?path);
	}
}

/// Convenience wrapper around [`Differ::diff`] with the default depth limit.
///
/// # Errors
///
/// See [`Differ::diff`].
pub fn diff(previous: &Tree, current: &Tree) -> Result<Vec<Patch>, DiffIncompatible> {
	Differ::default().diff(previous, current)
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn tree(root: Node) -> Tree {
		Tree::new(root, 1)
	}

	fn list(keys: &[&str]) -> Node {
		Node::element("ul").with_children(keys.iter().map(|k| Node::element("li").with_key(*k).with_child(Node::text(*k))))
	}

	fn roundtrip(a: &Node, b: &Node) -> Vec<Patch> {
		let patches = diff(&tree(a.clone()), &tree(b.clone())).unwrap();
		let mut model = tree(a.clone());
		model.apply(&patches).unwrap();
		assert_eq!(model.root, *b);
		patches
	}

	#[test]
	fn text_change_is_single_replace() {
		let a = Node::element("span").with_child(Node::text("0"));
		let b = Node::element("span").with_child(Node::text("1"));
		assert_eq!(roundtrip(&a, &b), vec![Patch::ReplaceText { path: vec![0], text: "1".to_owned() }]);
	}

	#[test]
	fn attributes_set_and_remove() {
		let a = Node::element("div").with_attribute("class", "old").with_attribute("hidden", "");
		let b = Node::element("div").with_attribute("class", "new").with_attribute("id", "x");
		let patches = roundtrip(&a, &b);
		assert_eq!(
			patches,
			vec![
				Patch::RemoveAttribute { path: vec![], name: "hidden".to_owned() },
				Patch::SetAttribute {
					path: vec![],
					name: "class".to_owned(),
					value: "new".to_owned()
				},
				Patch::SetAttribute {
					path: vec![],
					name: "id".to_owned(),
					value: "x".to_owned()
				},
			]
		);
	}

	#[test]
	fn identical_trees_produce_nothing() {
		let a = list(&["a", "b", "c"]).with_attribute("class", "x");
		assert!(diff(&tree(a.clone()), &tree(a)).unwrap().is_empty());
	}

	#[test]
	fn root_mismatch_is_incompatible() {
		let error = diff(&tree(Node::element("div")), &tree(Node::element("section"))).unwrap_err();
		assert!(matches!(error, DiffIncompatible::RootMismatch { .. }));
	}

	#[test]
	fn positional_removes_descend_before_inserts() {
		let a = Node::element("div").with_children([Node::element("p"), Node::text("x"), Node::element("p"), Node::element("p")]);
		let b = Node::element("div").with_children([Node::element("h1"), Node::text("y")]);
		let patches = roundtrip(&a, &b);
		let kinds: Vec<_> = patches.iter().map(Patch::kind).collect();
		assert_eq!(kinds, ["RemoveChild", "RemoveChild", "RemoveChild", "InsertChild", "ReplaceText"]);
		assert_eq!(patches[0], Patch::RemoveChild { parent_path: vec![], index: 3 });
		assert_eq!(patches[1], Patch::RemoveChild { parent_path: vec![], index: 2 });
		assert_eq!(patches[2], Patch::RemoveChild { parent_path: vec![], index: 0 });
	}

	#[test]
	fn kind_change_is_remove_then_insert() {
		let a = Node::element("div").with_child(Node::marker());
		let b = Node::element("div").with_child(Node::element("p").with_child(Node::text("shown")));
		let patches = roundtrip(&a, &b);
		assert_eq!(patches.len(), 2);
		assert!(matches!(patches[0], Patch::RemoveChild { index: 0, .. }));
		assert!(matches!(patches[1], Patch::InsertChild { index: 0, .. }));
	}

	#[test]
	fn keyed_insert_at_front_does_not_touch_others() {
		let patches = roundtrip(&list(&["b", "c"]), &list(&["a", "b", "c"]));
		assert_eq!(patches.len(), 1);
		assert!(matches!(&patches[0], Patch::InsertChild { index: 0, node, .. } if node.key.as_deref() == Some("a")));
	}

	#[test]
	fn keyed_reorder_is_one_patch() {
		let patches = roundtrip(&list(&["a", "b", "c"]), &list(&["c", "a", "b"]));
		assert_eq!(
			patches,
			vec![Patch::ReorderChildren {
				parent_path: vec![],
				order: vec![2, 0, 1]
			}]
		);
	}

	#[test]
	fn keyed_mixed_operations() {
		let patches = roundtrip(&list(&["a", "b", "c", "d"]), &list(&["d", "x", "b"]));
		let kinds: Vec<_> = patches.iter().map(Patch::kind).collect();
		assert_eq!(kinds, ["RemoveChild", "RemoveChild", "ReorderChildren", "InsertChild"]);
		assert_eq!(patches[0], Patch::RemoveChild { parent_path: vec![], index: 2 });
		assert_eq!(patches[1], Patch::RemoveChild { parent_path: vec![], index: 0 });
	}

	#[test]
	fn keyed_child_content_is_diffed_at_new_index() {
		let a = list(&["a", "b"]);
		let mut b = list(&["b", "a"]);
		b.children[0].children[0] = Node::text("B");
		let patches = roundtrip(&a, &b);
		assert_eq!(patches.last(), Some(&Patch::ReplaceText { path: vec![0, 0], text: "B".to_owned() }));
	}

	#[test]
	fn keyed_same_key_different_tag_is_recreated() {
		let a = Node::element("div").with_child(Node::element("p").with_key("k"));
		let b = Node::element("div").with_child(Node::element("span").with_key("k"));
		let patches = roundtrip(&a, &b);
		assert_eq!(patches.len(), 2);
	}

	#[test]
	fn duplicate_keys_still_converge() {
		let a = Node::element("ul").with_children([Node::element("li").with_key("k"), Node::element("li").with_key("k")]);
		let b = Node::element("ul").with_children([Node::element("li").with_key("k").with_attribute("class", "x")]);
		roundtrip(&a, &b);
	}

	#[test]
	fn depth_limit_is_reported() {
		let a = Node::element("div").with_child(Node::element("div").with_child(Node::text("a")));
		let b = Node::element("div").with_child(Node::element("div").with_child(Node::text("b")));
		let error = Differ::new(2).diff(&tree(a), &tree(b)).unwrap_err();
		assert_eq!(error, DiffIncompatible::DepthLimit);
	}
}
