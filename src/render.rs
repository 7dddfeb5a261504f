//! Renders parsed [`Template`]s to markup.

use crate::{
	expr::Operand,
	node::{escape_html, COMPONENT_ATTRIBUTE, CONDITIONAL_MARKER},
	template::{Fragment, Template, TemplateSet},
	value::{Context, Map, Value},
};
use hashbrown::HashMap;
use thiserror::Error;
use tracing::{instrument, trace};

/// Default limit for nested `{% include %}`s.
pub const DEFAULT_INCLUDE_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
	#[error("unknown template {0:?} in include")]
	UnknownInclude(String),
	#[error("includes nested deeper than {0}")]
	IncludeDepth(usize),
	#[error("no embedded child {0:?}")]
	UnknownChild(String),
	#[error("{0:?} is not iterable")]
	NotIterable(String),
	#[error("cannot unpack an item of {path:?} into {bindings} names")]
	Unpack { path: String, bindings: usize },
}

/// Renders templates against a [`Context`].
///
/// Embedded children are rendered ahead of time and passed in as markup by id.
#[derive(Debug, Clone, Copy)]
pub struct Renderer<'a> {
	templates: Option<&'a TemplateSet>,
	children: Option<&'a HashMap<String, String>>,
	include_depth: usize,
}

impl Default for Renderer<'_> {
	fn default() -> Self {
		Self {
			templates: None,
			children: None,
			include_depth: DEFAULT_INCLUDE_DEPTH,
		}
	}
}

impl<'a> Renderer<'a> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with_templates(self, templates: &'a TemplateSet) -> Self {
		Self {
			templates: Some(templates),
			..self
		}
	}

	#[must_use]
	pub fn with_children(self, children: &'a HashMap<String, String>) -> Self {
		Self {
			children: Some(children),
			..self
		}
	}

	#[must_use]
	pub fn with_include_depth(self, include_depth: usize) -> Self {
		Self { include_depth, ..self }
	}

	/// # Errors
	///
	/// Iff an include or embedded child can't be resolved, or a loop's iterable is unusable.
	#[instrument(skip_all)]
	pub fn render(&self, template: &Template, context: &mut Context) -> Result<String, RenderError> {
		let mut out = String::new();
		self.render_fragments(&template.fragments, context, &mut out, 0)?;
		trace!(len = out.len(), "Rendered.");
		Ok(out)
	}

	fn render_fragments(&self, fragments: &[Fragment], context: &mut Context, out: &mut String, depth: usize) -> Result<(), RenderError> {
		for fragment in fragments {
			match fragment {
				Fragment::Static(text) => out.push_str(text),
				Fragment::Expression(expression) => out.push_str(&expression.render(context)),
				Fragment::If { branches, otherwise, marker } => {
					let taken = branches.iter().find(|(condition, _)| condition.evaluate(context)).map(|(_, body)| body);
					match (taken, otherwise) {
						(Some(body), _) | (None, Some(body)) => self.render_fragments(body, context, out, depth)?,
						(None, None) if *marker => {
							out.push_str("<!--");
							out.push_str(CONDITIONAL_MARKER);
							out.push_str("-->");
						}
						(None, None) => {}
					}
				}
				Fragment::For {
					bindings,
					iterable,
					reversed,
					body,
					empty,
				} => {
					let path = match iterable {
						Operand::Path(path) => path.as_str(),
						Operand::Literal(_) => "",
					};
					let mut items = match iterable.evaluate(context) {
						Value::Null => Vec::new(),
						Value::Array(items) => items,
						Value::Object(map) => map.into_iter().map(|(k, v)| Value::Array(vec![Value::String(k), v])).collect(),
						_ => return Err(RenderError::NotIterable(path.to_owned())),
					};
					if items.is_empty() {
						self.render_fragments(empty, context, out, depth)?;
						continue;
					}
					if *reversed {
						items.reverse();
					}
					let count = items.len();
					for (i, item) in items.into_iter().enumerate() {
						let mut scope = bind(bindings, item, path)?;
						let mut forloop = Map::new();
						forloop.insert("counter".to_owned(), (i + 1).into());
						forloop.insert("counter0".to_owned(), i.into());
						forloop.insert("first".to_owned(), (i == 0).into());
						forloop.insert("last".to_owned(), (i + 1 == count).into());
						scope.insert("forloop".to_owned(), Value::Object(forloop));
						context.push_scope(scope);
						let result = self.render_fragments(body, context, out, depth);
						context.pop_scope();
						result?;
					}
				}
				Fragment::Include(name) => {
					if depth >= self.include_depth {
						return Err(RenderError::IncludeDepth(self.include_depth));
					}
					let included = self.templates.and_then(|t| t.get(name)).ok_or_else(|| RenderError::UnknownInclude(name.clone()))?;
					self.render_fragments(&included.fragments, context, out, depth + 1)?;
				}
				Fragment::LiveChild(id) => {
					let markup = self.children.and_then(|c| c.get(id)).ok_or_else(|| RenderError::UnknownChild(id.clone()))?;
					out.push_str("<div ");
					out.push_str(COMPONENT_ATTRIBUTE);
					out.push_str("=\"");
					out.push_str(&escape_html(id));
					out.push_str("\">");
					out.push_str(markup);
					out.push_str("</div>");
				}
			}
		}
		Ok(())
	}
}

fn bind(bindings: &[String], item: Value, path: &str) -> Result<Map<String, Value>, RenderError> {
	let mut scope = Map::new();
	match (bindings, item) {
		([single], item) => {
			scope.insert(single.clone(), item);
		}
		(many, Value::Array(values)) if values.len() == many.len() => {
			for (name, value) in many.iter().zip(values) {
				scope.insert(name.clone(), value);
			}
		}
		(many, _) => {
			return Err(RenderError::Unpack {
				path: path.to_owned(),
				bindings: many.len(),
			})
		}
	}
	Ok(scope)
}

/// Convenience for a single template without includes or children.
///
/// # Errors
///
/// See [`Renderer::render`].
pub fn render(template: &Template, context: &mut Context) -> Result<String, RenderError> {
	Renderer::new().render(template, context)
}
