//! Structural parser: template source to a tree of static fragments, expressions and directive blocks.
//!
//! Supported syntax:
//!
//! - `{{ expression }}`, see [`Expression`],
//! - `{% if %}`/`{% elif %}`/`{% else %}`/`{% endif %}`,
//! - `{% for x in xs %}`/`{% for k, v in pairs reversed %}`/`{% empty %}`/`{% endfor %}`,
//! - `{% include "name" %}` and `{% live_child "id" %}`,
//! - `{# comments #}`, which are dropped.
//!
//! Literal whitespace is normalized while parsing: runs collapse to a single space and whitespace between two tags is removed.
//! Content of `<pre>`, `<code>` and `<textarea>` is left alone.

use crate::expr::{Condition, Expression, ExpressionError, Operand};
use hashbrown::HashMap;
use thiserror::Error;
use tracing::{instrument, trace};

const PRESERVED_ELEMENTS: &[&str] = &["pre", "code", "textarea"];

/// Attribute that marks the live region inside a larger page template.
pub const ROOT_ATTRIBUTE: &str = "dj-root";

/// Event binding attributes whose values name handlers.
const EVENT_ATTRIBUTES: &[&str] = &["dj-click", "dj-submit", "dj-change", "dj-input", "dj-keydown", "dj-keyup", "dj-blur", "dj-focus"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
	#[error("unterminated {delimiter} at byte {offset}")]
	Unterminated { delimiter: &'static str, offset: usize },
	#[error("{{% {tag} %}} at byte {offset} is never closed")]
	Unclosed { tag: String, offset: usize },
	#[error("unexpected {{% {tag} %}} at byte {offset}")]
	Unexpected { tag: String, offset: usize },
	#[error("unknown tag {{% {tag} %}} at byte {offset}")]
	UnknownTag { tag: String, offset: usize },
	#[error("{{% {tag} %}} inside an attribute value at byte {offset}; use an inline conditional instead")]
	BlockTagInAttribute { tag: String, offset: usize },
	#[error("malformed {{% {tag} %}} at byte {offset}")]
	Malformed { tag: String, offset: usize },
	#[error("invalid expression at byte {offset}: {source}")]
	Expression {
		offset: usize,
		#[source]
		source: ExpressionError,
	},
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
	Static(String),
	Expression(Expression),
	If {
		branches: Vec<(Condition, Vec<Fragment>)>,
		otherwise: Option<Vec<Fragment>>,
		/// Whether an untaken conditional leaves a [`crate::node::NodeKind::ConditionalMarker`].
		/// Off for conditionals inside a start tag, where a comment would corrupt the markup.
		marker: bool,
	},
	For {
		bindings: Vec<String>,
		iterable: Operand,
		reversed: bool,
		body: Vec<Fragment>,
		empty: Vec<Fragment>,
	},
	Include(String),
	LiveChild(String),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
	pub fragments: Vec<Fragment>,
}

impl Template {
	/// # Errors
	///
	/// Iff `source` has unbalanced or unknown directives, malformed expressions,
	/// or block directives inside attribute values.
	#[instrument(skip(source), fields(len = source.len()))]
	pub fn parse(source: &str) -> Result<Self, TemplateError> {
		let tokens = tokenize(source)?;
		let mut parser = Parser {
			tokens,
			at: 0,
			markup: MarkupState::Text,
			whitespace: Whitespace::default(),
		};
		let (fragments, end) = parser.parse_until(&[])?;
		debug_assert!(end.is_none());
		trace!(fragments = fragments.len(), "Parsed template.");
		Ok(Self { fragments })
	}

	/// Handler names referenced by literal event binding attributes such as `dj-click="increment"`.
	#[must_use]
	pub fn referenced_events(&self) -> Vec<String> {
		let mut names = Vec::new();
		collect_events(&self.fragments, &mut names);
		names.sort();
		names.dedup();
		names
	}
}

fn collect_events(fragments: &[Fragment], names: &mut Vec<String>) {
	for fragment in fragments {
		match fragment {
			Fragment::Static(text) => {
				for attribute in EVENT_ATTRIBUTES {
					let mut rest = text.as_str();
					while let Some(at) = rest.find(attribute) {
						rest = &rest[at + attribute.len()..];
						// Skip modifiers like `dj-keydown.enter`.
						let value = rest.trim_start_matches(|c: char| c == '.' || c.is_ascii_alphanumeric());
						if let Some(value) = value.strip_prefix("=\"") {
							if let Some(end) = value.find('"') {
								if !value[..end].is_empty() {
									names.push(value[..end].to_owned());
								}
							}
						}
					}
				}
			}
			Fragment::If { branches, otherwise, .. } => {
				for (_, body) in branches {
					collect_events(body, names);
				}
				if let Some(otherwise) = otherwise {
					collect_events(otherwise, names);
				}
			}
			Fragment::For { body, empty, .. } => {
				collect_events(body, names);
				collect_events(empty, names);
			}
			Fragment::Expression(_) | Fragment::Include(_) | Fragment::LiveChild(_) => {}
		}
	}
}

/// Named templates available to `{% include %}`.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
	templates: HashMap<String, Template>,
}

impl TemplateSet {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// # Errors
	///
	/// Iff `source` doesn't parse.
	pub fn insert(&mut self, name: impl Into<String>, source: &str) -> Result<(), TemplateError> {
		self.templates.insert(name.into(), Template::parse(source)?);
		Ok(())
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Template> {
		self.templates.get(name)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
	Text(String),
	Variable { source: String, offset: usize },
	Tag { name: String, arguments: String, offset: usize },
}

fn tokenize(source: &str) -> Result<Vec<Token>, TemplateError> {
	let mut tokens = Vec::new();
	let mut rest = source;
	let mut offset = 0;
	while let Some(open) = rest.find('{').filter(|_| !rest.is_empty()) {
		let (delimiter, close) = match rest[open..].get(..2) {
			Some("{{") => ("{{", "}}"),
			Some("{%") => ("{%", "%}"),
			Some("{#") => ("{#", "#}"),
			_ => {
				// A lone brace is literal text.
				push_text(&mut tokens, &rest[..=open]);
				rest = &rest[open + 1..];
				offset += open + 1;
				continue;
			}
		};
		push_text(&mut tokens, &rest[..open]);
		let start = offset + open;
		let inner_start = open + 2;
		let inner_len = rest[inner_start..].find(close).ok_or(TemplateError::Unterminated { delimiter, offset: start })?;
		let inner = rest[inner_start..inner_start + inner_len].trim();
		match delimiter {
			"{{" => tokens.push(Token::Variable {
				source: inner.to_owned(),
				offset: start,
			}),
			"{%" => {
				let (name, arguments) = inner.split_once(char::is_whitespace).unwrap_or((inner, ""));
				tokens.push(Token::Tag {
					name: name.to_owned(),
					arguments: arguments.trim().to_owned(),
					offset: start,
				});
			}
			_ => {}
		}
		let consumed = inner_start + inner_len + 2;
		rest = &rest[consumed..];
		offset += consumed;
	}
	push_text(&mut tokens, rest);
	Ok(tokens)
}

fn push_text(tokens: &mut Vec<Token>, text: &str) {
	if text.is_empty() {
		return;
	}
	if let Some(Token::Text(previous)) = tokens.last_mut() {
		previous.push_str(text);
	} else {
		tokens.push(Token::Text(text.to_owned()));
	}
}

/// Where in the markup the parser currently is, as far as the literal text shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkupState {
	Text,
	InsideTag,
	InsideValue(char),
}

impl MarkupState {
	fn advance(self, text: &str) -> Self {
		let mut chars = text.chars().peekable();
		let mut state = self;
		while let Some(c) = chars.next() {
			state = match (state, c) {
				(MarkupState::Text, '<') if chars.peek().map_or(false, |next| next.is_ascii_alphabetic() || *next == '/') => MarkupState::InsideTag,
				(MarkupState::InsideTag, '>') => MarkupState::Text,
				(MarkupState::InsideTag, '"' | '\'') => MarkupState::InsideValue(c),
				(MarkupState::InsideValue(quote), c) if c == quote => MarkupState::InsideTag,
				(state, _) => state,
			};
		}
		state
	}
}

/// Whitespace normalization state carried across static fragments.
#[derive(Debug, Default)]
struct Whitespace {
	preserve: usize,
	last: Option<char>,
}

impl Whitespace {
	fn normalize(&mut self, text: &str) -> String {
		let mut out = String::with_capacity(text.len());
		let mut chars = text.char_indices().peekable();
		while let Some((i, c)) = chars.next() {
			if c == '<' {
				self.track_tag(&text[i + 1..]);
			}
			if self.preserve > 0 || !c.is_whitespace() {
				out.push(c);
				self.last = Some(c);
				continue;
			}
			while chars.peek().map_or(false, |(_, c)| c.is_whitespace()) {
				chars.next();
			}
			let next = chars.peek().map(|(_, c)| *c);
			if !(self.last == Some('>') && next == Some('<')) {
				out.push(' ');
				self.last = Some(' ');
			}
		}
		out
	}

	fn track_tag(&mut self, after_bracket: &str) {
		let (closing, name) = match after_bracket.strip_prefix('/') {
			Some(name) => (true, name),
			None => (false, after_bracket),
		};
		let end = name.find(|c: char| !c.is_ascii_alphanumeric()).unwrap_or(name.len());
		let name = &name[..end];
		if !PRESERVED_ELEMENTS.iter().any(|p| p.eq_ignore_ascii_case(name)) {
			return;
		}
		if closing {
			self.preserve = self.preserve.saturating_sub(1);
		} else {
			self.preserve += 1;
		}
	}
}

struct Parser {
	tokens: Vec<Token>,
	at: usize,
	markup: MarkupState,
	whitespace: Whitespace,
}

struct End {
	name: String,
	arguments: String,
	offset: usize,
}

impl Parser {
	/// Parses fragments until one of the `until` tags (returned) or the end of input (only valid if `until` is empty).
	fn parse_until(&mut self, until: &[&str]) -> Result<(Vec<Fragment>, Option<End>), TemplateError> {
		let mut fragments = Vec::new();
		while let Some(token) = self.tokens.get(self.at).cloned() {
			self.at += 1;
			match token {
				Token::Text(text) => {
					self.markup = self.markup.advance(&text);
					let text = self.whitespace.normalize(&text);
					if !text.is_empty() {
						fragments.push(Fragment::Static(text));
					}
				}
				Token::Variable { source, offset } => {
					let expression = Expression::parse(&source).map_err(|source| TemplateError::Expression { offset, source })?;
					fragments.push(Fragment::Expression(expression));
				}
				Token::Tag { name, arguments, offset } => {
					if until.contains(&name.as_str()) {
						return Ok((fragments, Some(End { name, arguments, offset })));
					}
					fragments.push(self.parse_tag(&name, &arguments, offset)?);
				}
			}
		}
		Ok((fragments, None))
	}

	fn check_block_position(&self, tag: &str, offset: usize) -> Result<(), TemplateError> {
		if let MarkupState::InsideValue(_) = self.markup {
			return Err(TemplateError::BlockTagInAttribute { tag: tag.to_owned(), offset });
		}
		Ok(())
	}

	fn parse_block(&mut self, opener: &str, offset: usize, until: &[&str]) -> Result<(Vec<Fragment>, End), TemplateError> {
		let (body, end) = self.parse_until(until)?;
		let end = end.ok_or_else(|| TemplateError::Unclosed { tag: opener.to_owned(), offset })?;
		self.check_block_position(&end.name, end.offset)?;
		Ok((body, end))
	}

	fn parse_tag(&mut self, name: &str, arguments: &str, offset: usize) -> Result<Fragment, TemplateError> {
		let condition = |arguments: &str, offset| Condition::parse(arguments).map_err(|source| TemplateError::Expression { offset, source });
		match name {
			"if" => {
				self.check_block_position(name, offset)?;
				let marker = self.markup == MarkupState::Text;
				let mut branches = Vec::new();
				let mut pending = condition(arguments, offset)?;
				loop {
					let (body, end) = self.parse_block("if", offset, &["elif", "else", "endif"])?;
					branches.push((pending, body));
					match end.name.as_str() {
						"elif" => pending = condition(&end.arguments, end.offset)?,
						"else" => {
							let (otherwise, _) = self.parse_block("if", offset, &["endif"])?;
							return Ok(Fragment::If {
								branches,
								otherwise: Some(otherwise),
								marker,
							});
						}
						_ => return Ok(Fragment::If { branches, otherwise: None, marker }),
					}
				}
			}
			"for" => {
				self.check_block_position(name, offset)?;
				let malformed = || TemplateError::Malformed { tag: "for".to_owned(), offset };
				let (bindings, iterable) = arguments.split_once(" in ").ok_or_else(malformed)?;
				let bindings: Vec<String> = bindings.split(',').map(|b| b.trim().to_owned()).collect();
				if bindings.iter().any(String::is_empty) {
					return Err(malformed());
				}
				let mut words = iterable.split_whitespace();
				let iterable = Operand::Path(words.next().ok_or_else(malformed)?.to_owned());
				let reversed = match words.next() {
					None => false,
					Some("reversed") => true,
					Some(_) => return Err(malformed()),
				};
				let (body, end) = self.parse_block("for", offset, &["empty", "endfor"])?;
				let empty = if end.name == "empty" { self.parse_block("for", offset, &["endfor"])?.0 } else { Vec::new() };
				Ok(Fragment::For {
					bindings,
					iterable,
					reversed,
					body,
					empty,
				})
			}
			"include" | "live_child" => {
				let argument = arguments.trim();
				let unquoted = argument
					.strip_prefix('"')
					.and_then(|a| a.strip_suffix('"'))
					.or_else(|| argument.strip_prefix('\'').and_then(|a| a.strip_suffix('\'')))
					.filter(|a| !a.is_empty())
					.ok_or_else(|| TemplateError::Malformed { tag: name.to_owned(), offset })?;
				Ok(if name == "include" {
					Fragment::Include(unquoted.to_owned())
				} else {
					Fragment::LiveChild(unquoted.to_owned())
				})
			}
			"elif" | "else" | "endif" | "empty" | "endfor" => Err(TemplateError::Unexpected { tag: name.to_owned(), offset }),
			_ => Err(TemplateError::UnknownTag { tag: name.to_owned(), offset }),
		}
	}
}

/// Finds the closing tag matching an element of type `tag` whose start tag ends right before `from`.
///
/// Returns the byte range of the closing tag, or [`None`] if there is none (unbalanced markup).
///
/// The branches of one `{% if %}`/`{% elif %}`/`{% else %}` construct are alternatives:
/// each branch starts from the depth at the `{% if %}`, and after `{% endif %}` the depth is the deepest any branch reached.
/// This way, branches that each open an element closed by one shared closing tag are only counted once.
#[must_use]
pub fn find_closing_tag(source: &str, from: usize, tag: &str) -> Option<(usize, usize)> {
	struct Branches {
		checkpoint: usize,
		ends: Vec<usize>,
	}

	if !source.is_char_boundary(from) {
		return None;
	}
	let bytes = source.as_bytes();
	let mut depth = 1_usize;
	let mut branches: Vec<Branches> = Vec::new();
	let mut i = from;
	while i < bytes.len() {
		let rest = &source[i..];
		if rest.starts_with("{%") {
			let end = rest[2..].find("%}")? + 2;
			let inner = rest[2..end].trim();
			match inner.split_whitespace().next() {
				Some("if") => branches.push(Branches { checkpoint: depth, ends: Vec::new() }),
				Some("elif" | "else") => {
					if let Some(frame) = branches.last_mut() {
						frame.ends.push(depth);
						depth = frame.checkpoint;
					}
				}
				Some("endif") => {
					if let Some(frame) = branches.pop() {
						depth = frame.ends.into_iter().fold(depth, usize::max);
					}
				}
				_ => {}
			}
			i += end + 2;
		} else if rest.starts_with("{{") || rest.starts_with("{#") {
			let close = if rest.starts_with("{{") { "}}" } else { "#}" };
			i += rest[2..].find(close)? + 4;
		} else if rest.starts_with("<!--") {
			i += rest[4..].find("-->")? + 7;
		} else if let Some(after) = rest.strip_prefix("</") {
			if starts_with_tag(after, tag) {
				let end = rest.find('>')? + 1;
				depth -= 1;
				if depth == 0 {
					return Some((i, i + end));
				}
				i += end;
			} else {
				i += 2;
			}
		} else if let Some(after) = rest.strip_prefix('<') {
			if starts_with_tag(after, tag) {
				let end = rest.find('>')?;
				if !rest[..end].ends_with('/') {
					depth += 1;
				}
				i += end + 1;
			} else {
				i += 1;
			}
		} else {
			i += rest.chars().next().map_or(1, char::len_utf8);
		}
	}
	None
}

fn starts_with_tag(after_bracket: &str, tag: &str) -> bool {
	after_bracket.len() >= tag.len()
		&& after_bracket.is_char_boundary(tag.len())
		&& after_bracket[..tag.len()].eq_ignore_ascii_case(tag)
		&& after_bracket[tag.len()..].chars().next().map_or(false, |c| c.is_whitespace() || c == '>' || c == '/')
}

/// Cuts the live region, the element carrying [`ROOT_ATTRIBUTE`], out of a page template.
///
/// Falls back to the whole source if there is no such element or it is never closed.
#[must_use]
pub fn extract_root(source: &str) -> &str {
	let Some(attribute) = source.find(ROOT_ATTRIBUTE) else {
		return source;
	};
	let Some(start) = source[..attribute].rfind('<') else {
		return source;
	};
	let name_end = source[start + 1..].find(|c: char| !c.is_ascii_alphanumeric()).map_or(source.len(), |end| start + 1 + end);
	let tag = &source[start + 1..name_end];
	let Some(open_end) = source[attribute..].find('>').map(|end| attribute + end + 1) else {
		return source;
	};
	match find_closing_tag(source, open_end, tag) {
		Some((_, close_end)) => &source[start..close_end],
		None => {
			trace!("Live root is never closed. Using the whole template.");
			source
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn statics(template: &Template) -> Vec<&str> {
		template
			.fragments
			.iter()
			.filter_map(|f| match f {
				Fragment::Static(s) => Some(s.as_str()),
				_ => None,
			})
			.collect()
	}

	#[test]
	fn shared_close_across_else_matches_outer_div() {
		let t = "<div root>{% if a %}<div class=a>{% else %}<div class=b>{% endif %}content</div></div>";
		let open_end = t.find('>').unwrap() + 1;
		let (start, end) = find_closing_tag(t, open_end, "div").unwrap();
		assert_eq!(end, t.len());
		assert_eq!(&t[start..end], "</div>");
		assert_eq!(start, t.len() - "</div>".len());
	}

	#[test]
	fn shared_close_across_elif() {
		let t = "<div dj-root>{% if a %}<div class='a'>{% elif b %}<div class='b'>{% else %}<div class='c'>{% endif %}content</div></div><p>after</p>";
		let (_, end) = find_closing_tag(t, "<div dj-root>".len(), "div").unwrap();
		assert_eq!(&t[end..], "<p>after</p>");
	}

	#[test]
	fn balanced_branches() {
		let t = "<div dj-root>{% if a %}<div class='a'>x</div>{% else %}<div class='b'>y</div>{% endif %}</div>";
		assert_eq!(find_closing_tag(t, "<div dj-root>".len(), "div").map(|(_, end)| end), Some(t.len()));
	}

	#[test]
	fn unbalanced_is_none() {
		let t = "<div dj-root><p>unclosed";
		assert_eq!(find_closing_tag(t, "<div dj-root>".len(), "div"), None);
		let t = "<div dj-root><div></div>";
		assert_eq!(find_closing_tag(t, "<div dj-root>".len(), "div"), None);
	}

	#[test]
	fn malformed_directives_are_no_match() {
		assert_eq!(find_closing_tag("<div x>{%}</div>", 7, "div"), None);
		assert_eq!(find_closing_tag("<div x>{{}</div>", 7, "div"), None);
		assert_eq!(find_closing_tag("<div x>{#}</div>", 7, "div"), None);
		assert_eq!(find_closing_tag("<div x><!--></div>", 7, "div"), None);
		assert_eq!(find_closing_tag("<p>\u{e9}</p>", 4, "p"), None);
		assert_eq!(extract_root("<div dj-root>{%}</div>"), "<div dj-root>{%}</div>");

		let t = "<div x>{%}</div>%}</div>";
		assert_eq!(find_closing_tag(t, 7, "div").map(|(_, end)| end), Some(t.len()));
	}

	#[test]
	fn branches_inside_an_inner_element() {
		let t = "<div dj-root><div class='wrapper'>{% if x %}<span>yes</span>{% else %}<span>no</span>{% endif %}</div></div>";
		assert_eq!(find_closing_tag(t, "<div dj-root>".len(), "div").map(|(_, end)| end), Some(t.len()));

		let t = "<div dj-root><section>{% if x %}<div class='a'>{% else %}<div class='b'>{% endif %}</div></section></div><p>after</p>";
		assert_eq!(extract_root(t), &t[..t.len() - "<p>after</p>".len()]);
	}

	#[test]
	fn other_tags_and_prefixes_are_ignored() {
		let t = "<div x><divider></divider><span>a</span><div/></div>";
		assert_eq!(find_closing_tag(t, "<div x>".len(), "div").map(|(_, end)| end), Some(t.len()));
	}

	#[test]
	fn extract_root_cuts_live_region() {
		let t = "<header>nav</header><div dj-root><p>hello</p></div><footer>f</footer>";
		assert_eq!(extract_root(t), "<div dj-root><p>hello</p></div>");
		assert_eq!(extract_root("<p>no root</p>"), "<p>no root</p>");
		assert_eq!(extract_root("<div dj-root><p>"), "<div dj-root><p>");
	}

	#[test]
	fn whitespace_is_normalized_outside_preformatted() {
		let t = Template::parse("<div>\n   <p>  a   b  </p>\n  <pre>  x\n  y </pre>  </div>").unwrap();
		assert_eq!(statics(&t), ["<div><p> a b </p><pre>  x\n  y </pre></div>"]);
	}

	#[test]
	fn whitespace_state_spans_directives() {
		let t = Template::parse("<textarea>\n  {{ v }}\n</textarea>").unwrap();
		assert_eq!(statics(&t), ["<textarea>\n  ", "\n</textarea>"]);
	}

	#[test]
	fn parses_if_chain() {
		let t = Template::parse("{% if a %}A{% elif b %}B{% else %}C{% endif %}").unwrap();
		match &t.fragments[..] {
			[Fragment::If { branches, otherwise, marker }] => {
				assert_eq!(branches.len(), 2);
				assert!(otherwise.is_some());
				assert!(marker);
			}
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn conditional_inside_start_tag_has_no_marker() {
		let t = Template::parse("<input {% if on %}checked{% endif %}>").unwrap();
		assert!(t.fragments.iter().any(|f| matches!(f, Fragment::If { marker: false, .. })));
	}

	#[test]
	fn block_tag_in_attribute_value_is_rejected() {
		let error = Template::parse(r#"<div class="{% if a %}x{% endif %}"></div>"#).unwrap_err();
		assert!(matches!(error, TemplateError::BlockTagInAttribute { ref tag, .. } if tag == "if"));
		assert!(Template::parse(r#"<div class="{{ "x" if a }}"></div>"#).is_ok());
	}

	#[test]
	fn parses_for_with_empty_and_reversed() {
		let t = Template::parse("{% for k, v in pairs reversed %}{{ k }}{% empty %}none{% endfor %}").unwrap();
		match &t.fragments[..] {
			[Fragment::For { bindings, reversed, empty, .. }] => {
				assert_eq!(bindings, &["k", "v"]);
				assert!(reversed);
				assert_eq!(empty, &[Fragment::Static("none".to_owned())]);
			}
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn structure_errors() {
		assert!(matches!(Template::parse("{% if a %}x"), Err(TemplateError::Unclosed { ref tag, offset: 0 }) if tag == "if"));
		assert!(matches!(Template::parse("x{% endif %}"), Err(TemplateError::Unexpected { offset: 1, .. })));
		assert!(matches!(Template::parse("{% frob %}"), Err(TemplateError::UnknownTag { .. })));
		assert!(matches!(Template::parse("{{ a "), Err(TemplateError::Unterminated { delimiter: "{{", .. })));
		assert!(matches!(Template::parse("{% for x %}{% endfor %}"), Err(TemplateError::Malformed { .. })));
		assert!(matches!(Template::parse("{% include name %}"), Err(TemplateError::Malformed { .. })));
	}

	#[test]
	fn comments_and_lone_braces() {
		let t = Template::parse("a{# hidden #}b { c }").unwrap();
		assert_eq!(statics(&t), ["ab { c }"]);
	}

	#[test]
	fn referenced_events_are_collected() {
		let t = Template::parse(r#"<button dj-click="increment">+</button>{% if a %}<input dj-keydown.enter="submit">{% endif %}<a dj-click="{{ x }}">"#).unwrap();
		assert_eq!(t.referenced_events(), ["increment", "submit"]);
	}
}
