//! Expressions inside `{{ … }}` and conditions inside `{% if … %}`.

use crate::{
	node::escape_html,
	value::{display, is_truthy, Context, Value},
};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
	#[error("empty expression")]
	Empty,
	#[error("unterminated string literal in {0:?}")]
	UnterminatedString(String),
	#[error("unexpected {found:?} in {source_text:?}")]
	Unexpected { found: String, source_text: String },
	#[error("unknown filter {0:?}")]
	UnknownFilter(String),
}

/// A literal or a variable path.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
	Literal(Value),
	Path(String),
}

impl Operand {
	fn parse(word: &str) -> Result<Self, ExpressionError> {
		let word = word.trim();
		if word.is_empty() {
			return Err(ExpressionError::Empty);
		}
		if let Some(quote) = word.chars().next().filter(|c| *c == '"' || *c == '\'') {
			return if word.len() >= 2 && word.ends_with(quote) {
				Ok(Operand::Literal(Value::String(word[1..word.len() - 1].to_owned())))
			} else {
				Err(ExpressionError::UnterminatedString(word.to_owned()))
			};
		}
		Ok(match word {
			"True" | "true" => Operand::Literal(Value::Bool(true)),
			"False" | "false" => Operand::Literal(Value::Bool(false)),
			"None" | "null" => Operand::Literal(Value::Null),
			_ => {
				if let Ok(i) = word.parse::<i64>() {
					Operand::Literal(i.into())
				} else if let Ok(f) = word.parse::<f64>() {
					Operand::Literal(f.into())
				} else {
					Operand::Path(word.to_owned())
				}
			}
		})
	}

	#[must_use]
	pub fn evaluate(&self, context: &Context) -> Value {
		match self {
			Operand::Literal(value) => value.clone(),
			Operand::Path(path) => context.get(path).cloned().unwrap_or(Value::Null),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
	In,
	NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
	Truthy(Operand),
	Compare(Operand, Comparison, Operand),
	Not(Box<Condition>),
	And(Vec<Condition>),
	Or(Vec<Condition>),
}

impl Condition {
	/// # Errors
	///
	/// Iff `source` is not a well-formed condition.
	pub fn parse(source: &str) -> Result<Self, ExpressionError> {
		let words = split_words(source)?;
		if words.is_empty() {
			return Err(ExpressionError::Empty);
		}
		let mut parser = ConditionParser { words: &words, at: 0, source };
		let condition = parser.or()?;
		match parser.words.get(parser.at) {
			None => Ok(condition),
			Some(extra) => Err(ExpressionError::Unexpected {
				found: extra.clone(),
				source_text: source.to_owned(),
			}),
		}
	}

	#[must_use]
	pub fn evaluate(&self, context: &Context) -> bool {
		match self {
			Condition::Truthy(operand) => is_truthy(&operand.evaluate(context)),
			Condition::Not(inner) => !inner.evaluate(context),
			Condition::And(all) => all.iter().all(|c| c.evaluate(context)),
			Condition::Or(any) => any.iter().any(|c| c.evaluate(context)),
			Condition::Compare(left, comparison, right) => compare(&left.evaluate(context), *comparison, &right.evaluate(context)),
		}
	}
}

struct ConditionParser<'a> {
	words: &'a [String],
	at: usize,
	source: &'a str,
}

impl<'a> ConditionParser<'a> {
	fn peek(&self) -> Option<&'a str> {
		self.words.get(self.at).map(String::as_str)
	}

	fn next(&mut self) -> Result<&'a str, ExpressionError> {
		let words = self.words;
		let word = words.get(self.at).ok_or(ExpressionError::Empty)?;
		self.at += 1;
		Ok(word)
	}

	fn or(&mut self) -> Result<Condition, ExpressionError> {
		let mut terms = vec![self.and()?];
		while self.peek() == Some("or") {
			self.at += 1;
			terms.push(self.and()?);
		}
		Ok(if terms.len() == 1 { terms.remove(0) } else { Condition::Or(terms) })
	}

	fn and(&mut self) -> Result<Condition, ExpressionError> {
		let mut terms = vec![self.not()?];
		while self.peek() == Some("and") {
			self.at += 1;
			terms.push(self.not()?);
		}
		Ok(if terms.len() == 1 { terms.remove(0) } else { Condition::And(terms) })
	}

	fn not(&mut self) -> Result<Condition, ExpressionError> {
		if self.peek() == Some("not") {
			self.at += 1;
			return Ok(Condition::Not(Box::new(self.not()?)));
		}
		self.comparison()
	}

	fn comparison(&mut self) -> Result<Condition, ExpressionError> {
		let left = self.operand()?;
		let comparison = match self.peek() {
			Some("==") => Comparison::Eq,
			Some("!=") => Comparison::Ne,
			Some("<") => Comparison::Lt,
			Some("<=") => Comparison::Le,
			Some(">") => Comparison::Gt,
			Some(">=") => Comparison::Ge,
			Some("in") => Comparison::In,
			Some("not") if self.words.get(self.at + 1).map(String::as_str) == Some("in") => {
				self.at += 1;
				Comparison::NotIn
			}
			_ => return Ok(Condition::Truthy(left)),
		};
		self.at += 1;
		let right = self.operand()?;
		Ok(Condition::Compare(left, comparison, right))
	}

	fn operand(&mut self) -> Result<Operand, ExpressionError> {
		let word = self.next()?;
		if ["and", "or", "not", "in", "==", "!=", "<", "<=", ">", ">="].contains(&word) {
			return Err(ExpressionError::Unexpected {
				found: word.to_owned(),
				source_text: self.source.to_owned(),
			});
		}
		Operand::parse(word)
	}
}

fn as_number(value: &Value) -> Option<f64> {
	match value {
		Value::Number(n) => n.as_f64(),
		Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
		_ => None,
	}
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
	match (left, right) {
		(Value::String(l), Value::String(r)) => Some(l.cmp(r)),
		_ => as_number(left)?.partial_cmp(&as_number(right)?),
	}
}

fn contains(haystack: &Value, needle: &Value) -> bool {
	match haystack {
		Value::String(s) => needle.as_str().map_or(false, |needle| s.contains(needle)),
		Value::Array(items) => items.iter().any(|item| order(item, needle) == Some(Ordering::Equal) || item == needle),
		Value::Object(map) => needle.as_str().map_or(false, |key| map.contains_key(key)),
		_ => false,
	}
}

fn compare(left: &Value, comparison: Comparison, right: &Value) -> bool {
	match comparison {
		Comparison::Eq => left == right || order(left, right) == Some(Ordering::Equal),
		Comparison::Ne => !(left == right || order(left, right) == Some(Ordering::Equal)),
		Comparison::Lt => order(left, right) == Some(Ordering::Less),
		Comparison::Le => matches!(order(left, right), Some(Ordering::Less | Ordering::Equal)),
		Comparison::Gt => order(left, right) == Some(Ordering::Greater),
		Comparison::Ge => matches!(order(left, right), Some(Ordering::Greater | Ordering::Equal)),
		Comparison::In => contains(right, left),
		Comparison::NotIn => !contains(right, left),
	}
}

/// Splits on whitespace outside of string literals.
fn split_words(source: &str) -> Result<Vec<String>, ExpressionError> {
	let mut words = Vec::new();
	let mut current = String::new();
	let mut quote = None;
	for c in source.chars() {
		match quote {
			Some(q) => {
				current.push(c);
				if c == q {
					quote = None;
				}
			}
			None if c == '"' || c == '\'' => {
				quote = Some(c);
				current.push(c);
			}
			None if c.is_whitespace() => {
				if !current.is_empty() {
					words.push(std::mem::take(&mut current));
				}
			}
			None => current.push(c),
		}
	}
	if quote.is_some() {
		return Err(ExpressionError::UnterminatedString(source.to_owned()));
	}
	if !current.is_empty() {
		words.push(current);
	}
	Ok(words)
}

/// Finds `needle` as a whole word outside of string literals, returning its byte offset.
fn find_word(source: &str, needle: &str) -> Option<usize> {
	let mut quote = None;
	let bytes = source.as_bytes();
	for (i, c) in source.char_indices() {
		match quote {
			Some(q) if c == q => quote = None,
			Some(_) => {}
			None if c == '"' || c == '\'' => quote = Some(c),
			None => {
				if source[i..].starts_with(needle)
					&& (i == 0 || bytes[i - 1].is_ascii_whitespace())
					&& bytes.get(i + needle.len()).map_or(true, u8::is_ascii_whitespace)
				{
					return Some(i);
				}
			}
		}
	}
	None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterName {
	Safe,
	Escape,
	Upper,
	Lower,
	Length,
	Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
	pub name: FilterName,
	pub argument: Option<Operand>,
}

impl Filter {
	fn parse(source: &str) -> Result<Self, ExpressionError> {
		let (name, argument) = match source.split_once(':') {
			Some((name, argument)) => (name.trim(), Some(Operand::parse(argument)?)),
			None => (source.trim(), None),
		};
		let name = match name {
			"safe" => FilterName::Safe,
			"escape" | "force_escape" => FilterName::Escape,
			"upper" => FilterName::Upper,
			"lower" => FilterName::Lower,
			"length" => FilterName::Length,
			"default" => FilterName::Default,
			other => return Err(ExpressionError::UnknownFilter(other.to_owned())),
		};
		Ok(Self { name, argument })
	}

	fn apply(&self, value: Value, context: &Context) -> Value {
		match self.name {
			FilterName::Safe | FilterName::Escape => value,
			FilterName::Upper => Value::String(display(&value).to_uppercase()),
			FilterName::Lower => Value::String(display(&value).to_lowercase()),
			FilterName::Length => match &value {
				Value::String(s) => s.chars().count().into(),
				Value::Array(items) => items.len().into(),
				Value::Object(map) => map.len().into(),
				_ => 0.into(),
			},
			FilterName::Default => {
				if is_truthy(&value) {
					value
				} else {
					self.argument.as_ref().map_or(Value::Null, |argument| argument.evaluate(context))
				}
			}
		}
	}
}

/// The body of a `{{ … }}` interpolation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
	Value { operand: Operand, filters: Vec<Filter> },
	/// `then if condition else otherwise`. A missing `else` renders as the empty string.
	InlineIf {
		then: Operand,
		condition: Condition,
		otherwise: Option<Operand>,
		filters: Vec<Filter>,
	},
}

impl Expression {
	/// # Errors
	///
	/// Iff `source` is not a well-formed expression.
	pub fn parse(source: &str) -> Result<Self, ExpressionError> {
		let source = source.trim();
		if source.is_empty() {
			return Err(ExpressionError::Empty);
		}
		let (body, filters) = split_filters(source)?;
		if let Some(at) = find_word(body, "if") {
			let then = Operand::parse(&body[..at])?;
			let rest = &body[at + 2..];
			let (condition, otherwise) = match find_word(rest, "else") {
				Some(at) => (&rest[..at], Some(Operand::parse(&rest[at + 4..])?)),
				None => (rest, None),
			};
			return Ok(Expression::InlineIf {
				then,
				condition: Condition::parse(condition)?,
				otherwise,
				filters,
			});
		}
		Ok(Expression::Value {
			operand: Operand::parse(body)?,
			filters,
		})
	}

	fn filters(&self) -> &[Filter] {
		match self {
			Expression::Value { filters, .. } | Expression::InlineIf { filters, .. } => filters,
		}
	}

	/// Evaluates to display text, escaped unless marked safe.
	#[must_use]
	pub fn render(&self, context: &Context) -> String {
		let (operand, value) = match self {
			Expression::Value { operand, .. } => (Some(operand), operand.evaluate(context)),
			Expression::InlineIf { then, condition, otherwise, .. } => {
				if condition.evaluate(context) {
					(Some(then), then.evaluate(context))
				} else {
					(otherwise.as_ref(), otherwise.as_ref().map_or(Value::Null, |otherwise| otherwise.evaluate(context)))
				}
			}
		};
		let value = self.filters().iter().fold(value, |value, filter| filter.apply(value, context));
		let text = display(&value);

		let marked_safe = self.filters().iter().any(|f| f.name == FilterName::Safe) || matches!(operand, Some(Operand::Path(path)) if context.is_safe(path));
		let forced = self.filters().iter().any(|f| f.name == FilterName::Escape);
		if marked_safe && !forced {
			text
		} else {
			escape_html(&text)
		}
	}
}

fn split_filters(source: &str) -> Result<(&str, Vec<Filter>), ExpressionError> {
	let mut parts = Vec::new();
	let mut quote = None;
	let mut start = 0;
	for (i, c) in source.char_indices() {
		match quote {
			Some(q) if c == q => quote = None,
			Some(_) => {}
			None if c == '"' || c == '\'' => quote = Some(c),
			None if c == '|' => {
				parts.push(&source[start..i]);
				start = i + 1;
			}
			None => {}
		}
	}
	if quote.is_some() {
		return Err(ExpressionError::UnterminatedString(source.to_owned()));
	}
	parts.push(&source[start..]);
	let body = parts.remove(0);
	let filters = parts.into_iter().map(Filter::parse).collect::<Result<_, _>>()?;
	Ok((body.trim(), filters))
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn context(value: Value) -> Context {
		Context::from_value(value)
	}

	fn render(source: &str, value: Value) -> String {
		Expression::parse(source).unwrap().render(&context(value))
	}

	#[test]
	fn inline_if_truthiness() {
		assert_eq!(render(r#""yes" if n else "no""#, json!({"n": 0})), "no");
		assert_eq!(render(r#""yes" if s else "no""#, json!({"s": ""})), "no");
		assert_eq!(render(r#""yes" if s else "no""#, json!({"s": "x"})), "yes");
		assert_eq!(render(r#""yes" if missing else "no""#, json!({})), "no");
		assert_eq!(render(r#""yes" if b"#, json!({"b": false})), "");
		assert_eq!(render(r#""yes" if b"#, json!({"b": true})), "yes");
	}

	#[test]
	fn inline_if_with_comparison_and_variables() {
		assert_eq!(render(r#"name if count > 0 else "none""#, json!({"count": 2, "name": "Ada"})), "Ada");
		assert_eq!(render(r#"name if count > 0 else "none""#, json!({"count": 0, "name": "Ada"})), "none");
	}

	#[test]
	fn words_inside_literals_are_not_keywords() {
		assert_eq!(render(r#""if you else" if on else "off""#, json!({"on": true})), "if you else");
	}

	#[test]
	fn escapes_unless_safe() {
		assert_eq!(render("v", json!({"v": "<b>"})), "&lt;b&gt;");
		assert_eq!(render("v|safe", json!({"v": "<b>"})), "<b>");
		let mut context = context(json!({"v": "<b>"}));
		context.mark_safe("v");
		assert_eq!(Expression::parse("v").unwrap().render(&context), "<b>");
		assert_eq!(Expression::parse("v|escape").unwrap().render(&context), "&lt;b&gt;");
	}

	#[test]
	fn filters() {
		assert_eq!(render("v|upper", json!({"v": "ab"})), "AB");
		assert_eq!(render("v|length", json!({"v": [1, 2, 3]})), "3");
		assert_eq!(render(r#"v|default:"-""#, json!({"v": ""})), "-");
		assert_eq!(render(r#"v|default:"a|b""#, json!({})), "a|b");
		assert!(matches!(Expression::parse("v|frobnicate"), Err(ExpressionError::UnknownFilter(_))));
	}

	#[test]
	fn conditions() {
		let c = context(json!({"a": 1, "b": 0, "s": "abc", "xs": [1, 2], "user": {"admin": true}}));
		let check = |source: &str| Condition::parse(source).unwrap().evaluate(&c);
		assert!(check("a and not b"));
		assert!(check("b or a"));
		assert!(!check("a and b"));
		assert!(check("a == 1"));
		assert!(check("a != 2"));
		assert!(check("a >= 1.0"));
		assert!(check(r#""b" in s"#));
		assert!(check("2 in xs"));
		assert!(check("3 not in xs"));
		assert!(check("user.admin"));
		assert!(check("s == 'abc'"));
	}

	#[test]
	fn malformed_conditions() {
		assert_eq!(Condition::parse("  "), Err(ExpressionError::Empty));
		assert!(matches!(Condition::parse("a b"), Err(ExpressionError::Unexpected { .. })));
		assert!(matches!(Condition::parse("a and"), Err(ExpressionError::Empty)));
		assert!(matches!(Condition::parse("'open"), Err(ExpressionError::UnterminatedString(_))));
	}
}
