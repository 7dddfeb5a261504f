//! Loads rendered markup into a [`Node`] tree.
//!
//! Markup is parsed as an HTML5 fragment in `<body>` context, so optional end tags, entities and misnested elements
//! end up exactly as a browser would build them.
//!
//! Comments are dropped, except for conditional markers.
//! Whitespace-only text is dropped outside `<pre>`, `<code>` and `<textarea>`.

use crate::node::{Node, NodeKind, COMPONENT_ATTRIBUTE, CONDITIONAL_MARKER, KEY_ATTRIBUTE};
use html5ever::{local_name, namespace_url, ns, parse_fragment, tendril::TendrilSink, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
	#[error("expected exactly one root node, found {0}")]
	RootCount(usize),
}

/// Loads markup that must consist of exactly one element (plus insignificant whitespace).
///
/// # Errors
///
/// Iff the markup doesn't have exactly one root.
#[instrument(skip(markup), fields(len = markup.len()))]
pub fn load_root(markup: &str) -> Result<Node, LoadError> {
	let mut nodes = load_fragment(markup)?;
	match (nodes.pop(), nodes.is_empty()) {
		(Some(root), true) if root.kind != NodeKind::Text => Ok(root),
		(Some(_), _) => {
			let count = nodes.len() + 1;
			if cfg!(feature = "dangerous-logging") {
				warn!("Expected one root node but found {} in {:?}.", count, markup);
			} else {
				warn!("Expected one root node but found {}.", count);
			}
			Err(LoadError::RootCount(count))
		}
		(None, _) => Err(LoadError::RootCount(0)),
	}
}

/// Loads a sequence of sibling nodes.
///
/// # Errors
///
/// Currently never. Malformed markup is repaired the way browsers repair it.
pub fn load_fragment(markup: &str) -> Result<Vec<Node>, LoadError> {
	let context = QualName::new(None, ns!(html), local_name!("body"));
	let dom = parse_fragment(RcDom::default(), Default::default(), context, Vec::new()).one(markup);
	if !dom.errors.is_empty() {
		if cfg!(feature = "dangerous-logging") {
			debug!(errors = ?dom.errors, "Markup was repaired while loading.");
		} else {
			debug!(count = dom.errors.len(), "Markup was repaired while loading.");
		}
	}

	// The fragment's nodes are the children of the synthetic `<html>` element.
	let mut nodes = Vec::new();
	for context in dom.document.children.borrow().iter() {
		load_child_nodes(context, false, &mut nodes);
	}
	trace!(count = nodes.len(), "Loaded fragment.");
	Ok(nodes)
}

fn load_child_nodes(parent: &Handle, preserve: bool, into: &mut Vec<Node>) {
	for child in parent.children.borrow().iter() {
		match &child.data {
			NodeData::Text { contents } => {
				let text = contents.borrow();
				if preserve || !text.chars().all(char::is_whitespace) {
					into.push(Node::text(&**text));
				}
			}
			NodeData::Comment { contents } => {
				if contents.trim() == CONDITIONAL_MARKER {
					into.push(Node::marker());
				}
			}
			NodeData::Element { name, attrs, .. } => {
				let tag: &str = &name.local;
				let mut element = Node::element(tag);
				for attribute in attrs.borrow().iter() {
					let name: &str = &attribute.name.local;
					if name == KEY_ATTRIBUTE {
						element.key = Some(attribute.value.to_string());
					}
					element.attributes.insert(name.to_owned(), attribute.value.to_string());
				}
				if element.attributes.contains_key(COMPONENT_ATTRIBUTE) {
					element.kind = NodeKind::ComponentBoundary;
				}
				let preserve = preserve || matches!(tag, "pre" | "code" | "textarea");
				load_child_nodes(child, preserve, &mut element.children);
				into.push(element);
			}
			NodeData::Document | NodeData::Doctype { .. } | NodeData::ProcessingInstruction { .. } => {
				trace!("Skipping non-content node.");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn loads_nested_elements() {
		let root = load_root(r#"<div class="a b" id=x hidden><span>Hello</span> <b>!</b></div>"#).unwrap();
		assert_eq!(
			root,
			Node::element("div")
				.with_attribute("class", "a b")
				.with_attribute("id", "x")
				.with_attribute("hidden", "")
				.with_children([Node::element("span").with_child(Node::text("Hello")), Node::element("b").with_child(Node::text("!"))])
		);
	}

	#[test]
	fn comments_are_dropped_except_markers() {
		let root = load_root("<div><!-- comment --><span>a</span><!--dj-if--></div>").unwrap();
		assert_eq!(root.children, [Node::element("span").with_child(Node::text("a")), Node::marker()]);
	}

	#[test]
	fn whitespace_is_kept_in_preformatted_elements() {
		let root = load_root("<div>\n  <pre>  x\n</pre>\n  <textarea> </textarea></div>").unwrap();
		assert_eq!(root.children[0].children, [Node::text("  x\n")]);
		assert_eq!(root.children[1].children, [Node::text(" ")]);
		assert_eq!(root.children.len(), 2);
	}

	#[test]
	fn keys_components_void_and_raw_elements() {
		let root = load_root(r#"<ul><li data-key="a">A<br></li><div dj-component="c1"><p></p></div><script>if (a < b) {}</script></ul>"#).unwrap();
		assert_eq!(root.children[0].key.as_deref(), Some("a"));
		assert_eq!(root.children[0].children.len(), 2);
		assert_eq!(root.children[1].kind, NodeKind::ComponentBoundary);
		assert_eq!(root.children[1].children, [Node::element("p")]);
		assert_eq!(root.children[2].children, [Node::text("if (a < b) {}")]);
	}

	#[test]
	fn optional_end_tags_are_implied() {
		let root = load_root("<ul><li>a<li>b</ul>").unwrap();
		assert_eq!(
			root,
			Node::element("ul").with_children([Node::element("li").with_child(Node::text("a")), Node::element("li").with_child(Node::text("b"))])
		);

		let root = load_root("<div><p>x<p>y</div>").unwrap();
		assert_eq!(root.children.len(), 2);
		assert_eq!(root.children[1], Node::element("p").with_child(Node::text("y")));
	}

	#[test]
	fn markup_is_repaired_like_a_browser_would() {
		let root = load_root("<div><span></div>").unwrap();
		assert_eq!(root, Node::element("div").with_child(Node::element("span")));
		assert_eq!(load_root("<div>").unwrap(), Node::element("div"));
		assert_eq!(load_root("<table><tr><td>1</td></tr></table>").unwrap().children[0].tag.as_deref(), Some("tbody"));
	}

	#[test]
	fn entities_are_decoded() {
		let root = load_root(r#"<p title="&quot;x&quot;">&lt;b&gt; &amp; &#x27;&#39; &bogus; a & b</p>"#).unwrap();
		assert_eq!(root.attribute("title"), Some("\"x\""));
		assert_eq!(root.children, [Node::text("<b> & '' &bogus; a & b")]);
	}

	#[test]
	fn serialization_loads_back() {
		let node = Node::element("div")
			.with_attribute("title", "<\"'&>")
			.with_children([Node::text("a < b & c"), Node::marker(), Node::element("input").with_attribute("checked", "")]);
		assert_eq!(load_root(&node.to_html()).unwrap(), node);
	}

	#[test]
	fn fragments_keep_sibling_order() {
		let nodes = load_fragment("<b>1</b> two <i>3</i>").unwrap();
		assert_eq!(nodes, [Node::element("b").with_child(Node::text("1")), Node::text(" two "), Node::element("i").with_child(Node::text("3"))]);
	}

	#[test]
	fn root_count() {
		assert_eq!(load_root("<a></a><b></b>"), Err(LoadError::RootCount(2)));
		assert_eq!(load_root("  "), Err(LoadError::RootCount(0)));
		assert_eq!(load_root("text"), Err(LoadError::RootCount(1)));
	}
}
