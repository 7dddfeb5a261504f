use live_dom::{diff, Node, Patch, Tree};
use proptest::prelude::*;
use std::collections::HashSet;

const TAGS: &[&str] = &["div", "span", "p", "li", "ul", "section"];
const ATTRIBUTES: &[&str] = &["class", "title", "role", "href"];

fn arb_node(depth: u32) -> BoxedStrategy<Node> {
	let leaf = prop_oneof![
		"[a-z0-9 ]{1,8}".prop_map(Node::text),
		Just(Node::marker()),
		prop::sample::select(TAGS).prop_map(Node::element),
	];
	if depth == 0 {
		return leaf.boxed();
	}
	prop_oneof![
		1 => leaf,
		2 => arb_element(depth),
	]
	.boxed()
}

fn arb_element(depth: u32) -> BoxedStrategy<Node> {
	(
		prop::sample::select(TAGS),
		prop::collection::btree_map(prop::sample::select(ATTRIBUTES), "[a-z]{0,4}", 0..=2),
		prop::collection::vec((arb_node(depth.saturating_sub(1)), prop::option::weighted(0.4, "[a-e]")), 0..=5),
	)
		.prop_map(|(tag, attributes, children)| {
			let mut node = Node::element(tag);
			for (name, value) in attributes {
				node = node.with_attribute(name, value);
			}
			let mut seen = HashSet::new();
			for (child, key) in children {
				node.children.push(match key {
					Some(key) if child.tag.is_some() && seen.insert(key.clone()) => child.with_key(key),
					_ => child,
				});
			}
			node
		})
		.boxed()
}

/// Same root tag, so the pair is always diffable.
fn arb_pair() -> impl Strategy<Value = (Node, Node)> {
	(arb_element(3), arb_element(3)).prop_map(|(a, mut b)| {
		b.tag = a.tag.clone();
		(a, b)
	})
}

/// `b` as a shuffled, partially replaced version of `a`'s keyed children.
fn arb_keyed_mutation() -> impl Strategy<Value = (Node, Node)> {
	(prop::collection::vec("[a-z]{1,3}", 0..=8), any::<prop::sample::Index>(), prop::collection::vec("[A-Z]{1,3}", 0..=3), any::<u64>()).prop_map(
		|(keys, cut, fresh, seed)| {
			let keys: Vec<String> = keys.into_iter().collect::<std::collections::BTreeSet<_>>().into_iter().collect();
			let item = |key: &str| Node::element("li").with_key(key).with_child(Node::text(key));
			let a = Node::element("ul").with_children(keys.iter().map(|key| item(key)));

			let mut kept: Vec<&String> = keys.iter().collect();
			if !kept.is_empty() {
				kept.remove(cut.index(kept.len()));
			}
			let mut state = seed;
			for i in (1..kept.len()).rev() {
				state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
				#[allow(clippy::cast_possible_truncation)]
				let j = (state >> 33) as usize % (i + 1);
				kept.swap(i, j);
			}
			let mut children: Vec<Node> = kept.into_iter().map(|key| item(key)).collect();
			for (i, key) in fresh.iter().enumerate() {
				children.insert((i * 3).min(children.len()), item(key));
			}
			(a, Node::element("ul").with_children(children))
		},
	)
}

fn tree(root: &Node) -> Tree {
	Tree::new(root.clone(), 1)
}

fn assert_roundtrip(a: &Node, b: &Node) -> Vec<Patch> {
	let patches = diff(&tree(a), &tree(b)).unwrap();
	let mut model = tree(a);
	model.apply(&patches).unwrap();
	assert_eq!(&model.root, b);
	patches
}

/// Per parent: removals (descending), at most one reorder, insertions (ascending).
/// All of it before anything inside that parent's children, after the parent's own attribute patches.
fn assert_ordered(patches: &[Patch]) {
	let mut seen_structural: Vec<Vec<usize>> = Vec::new();
	let mut last: Option<(&[usize], u8, usize)> = None;
	for (i, patch) in patches.iter().enumerate() {
		let (rank, index) = match patch {
			Patch::RemoveChild { index, .. } => (0, *index),
			Patch::ReorderChildren { .. } => (1, 0),
			Patch::InsertChild { index, .. } => (2, *index),
			Patch::SetAttribute { path, .. } | Patch::RemoveAttribute { path, .. } | Patch::ReplaceText { path, .. } => {
				assert!(!seen_structural.contains(path), "patch {} addresses {:?} after its child list was reconciled", i, path);
				continue;
			}
		};
		let parent = patch.path();
		assert!(
			patches[..i].iter().all(|earlier| !(earlier.path().len() > parent.len() && earlier.path().starts_with(parent))),
			"child list of {:?} reconciled after patches inside it",
			parent
		);
		if let Some((last_parent, last_rank, last_index)) = last {
			if last_parent == parent {
				assert!(rank >= last_rank, "{:?}", patches);
				if rank == last_rank {
					match rank {
						0 => assert!(index < last_index, "removals must descend: {:?}", patches),
						1 => panic!("more than one reorder for {:?}", parent),
						_ => assert!(index > last_index, "insertions must ascend: {:?}", patches),
					}
				}
			} else {
				assert!(!seen_structural.iter().any(|seen| seen == parent), "child list of {:?} reconciled twice", parent);
			}
		}
		if !seen_structural.iter().any(|seen| seen == parent) {
			seen_structural.push(parent.to_vec());
		}
		last = Some((parent, rank, index));
	}
}

proptest! {
	#[test]
	fn applying_the_diff_reproduces_the_target((a, b) in arb_pair()) {
		let patches = assert_roundtrip(&a, &b);
		assert_ordered(&patches);
	}

	#[test]
	fn self_diff_is_empty(a in arb_element(4)) {
		prop_assert!(diff(&tree(&a), &tree(&a)).unwrap().is_empty());
	}

	#[test]
	fn keyed_mutations_roundtrip((a, b) in arb_keyed_mutation()) {
		let patches = assert_roundtrip(&a, &b);
		assert_ordered(&patches);
		let reorder_count = patches.iter().filter(|patch| matches!(patch, Patch::ReorderChildren { .. })).count();
		prop_assert!(reorder_count <= 1);
		prop_assert!(patches.iter().all(|patch| !matches!(patch, Patch::ReplaceText { .. })), "keyed items are moved, not rewritten");
	}

	#[test]
	fn diffs_converge((a, b) in arb_pair()) {
		let mut model = tree(&a);
		model.apply(&diff(&tree(&a), &tree(&b)).unwrap()).unwrap();
		prop_assert!(diff(&model, &tree(&b)).unwrap().is_empty());
	}
}

#[test]
fn removals_precede_insertions_under_one_parent() {
	let a = Node::element("div").with_children([Node::element("p"), Node::element("p"), Node::element("span")]);
	let b = Node::element("div").with_children([Node::element("span"), Node::element("p")]);
	let patches = assert_roundtrip(&a, &b);
	assert_ordered(&patches);
	let first_insert = patches.iter().position(|patch| matches!(patch, Patch::InsertChild { .. }));
	let last_remove = patches.iter().rposition(|patch| matches!(patch, Patch::RemoveChild { .. }));
	assert!(last_remove < first_insert);
}
