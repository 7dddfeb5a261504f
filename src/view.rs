//! Live views: application state plus a template and a table of event handlers.
//!
//! Views are plain serializable structs. A view's serialized fields are its template context,
//! and handlers are registered by name once per view type (see [`Handlers`]).
//! Sessions hold views type-erased behind [`Component`].

use crate::{
	config::LiveConfig,
	error::{HandlerError, MountError, SessionError},
	render::{Renderer, DEFAULT_INCLUDE_DEPTH},
	template::{extract_root, Template, TemplateError, TemplateSet},
	value::{Context, Map, Value},
};
use hashbrown::HashMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
	any::{type_name, Any},
	fmt,
	future::Future,
	marker::PhantomData,
	pin::Pin,
	sync::Arc,
};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Event and mount parameters.
pub type Params = Map<String, Value>;

/// What a background task hands back to its view.
pub type TaskOutput = Box<dyn Any + Send>;
pub type TaskFuture = Pin<Box<dyn Future<Output = TaskOutput> + Send>>;

pub type Handler<V> = fn(&mut V, &Params, &mut Effects<V>) -> Result<(), HandlerError>;

type Completion<V> = Box<dyn FnOnce(&mut V, TaskOutput, &mut Effects<V>) -> Result<(), HandlerError> + Send>;

/// Stable identity of an embedded child component within its session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub String);

impl fmt::Display for ComponentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ComponentId {
	fn from(id: &str) -> Self {
		Self(id.to_owned())
	}
}

/// A server-rendered, event-driven view.
pub trait LiveView: Serialize + DeserializeOwned + Send + 'static {
	/// Template source. If it contains an element marked `dj-root`, only that element is live.
	fn template() -> &'static str;

	/// # Errors
	///
	/// Iff the view can't be created from `params`. The mount is then rejected as a whole.
	fn mount(params: &Params, effects: &mut Effects<Self>) -> Result<Self, HandlerError>;

	fn register(handlers: &mut Handlers<Self>);

	/// Fields holding pre-escaped markup, interpolated without escaping.
	fn safe_fields() -> &'static [&'static str] {
		&[]
	}

	/// Named templates available to `{% include %}`, as `(name, source)` pairs.
	fn includes() -> &'static [(&'static str, &'static str)] {
		&[]
	}

	/// The upload capability, for views that accept file chunks.
	fn uploads(&mut self) -> Option<&mut dyn UploadSink> {
		None
	}
}

/// Receives raw upload chunks. Framing and validation happen before this point.
pub trait UploadSink {
	/// # Errors
	///
	/// Iff the chunk is rejected.
	fn ingest_chunk(&mut self, name: &str, bytes: &[u8], is_final: bool) -> Result<(), HandlerError>;
}

/// A view type's handler table.
pub struct Handlers<V> {
	table: HashMap<&'static str, Handler<V>>,
}

impl<V> Default for Handlers<V> {
	fn default() -> Self {
		Self { table: HashMap::new() }
	}
}

impl<V> fmt::Debug for Handlers<V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.table.keys()).finish()
	}
}

impl<V> Handlers<V> {
	pub fn on(&mut self, event: &'static str, handler: Handler<V>) -> &mut Self {
		if self.table.insert(event, handler).is_some() {
			warn!("Handler {:?} registered twice. Keeping the later one.", event);
		}
		self
	}

	#[must_use]
	pub fn get(&self, event: &str) -> Option<Handler<V>> {
		self.table.get(event).copied()
	}

	#[must_use]
	pub fn names(&self) -> Vec<&'static str> {
		let mut names: Vec<_> = self.table.keys().copied().collect();
		names.sort_unstable();
		names
	}
}

/// Side effects a handler requests besides mutating its view.
pub struct Effects<V> {
	tasks: Vec<TaskOp<V>>,
	client_events: Vec<(String, Value)>,
	skip_render: bool,
	parent_messages: Vec<(String, Params)>,
	children: Vec<(ComponentId, Box<dyn Component>, Outcome)>,
}

enum TaskOp<V> {
	Start { name: String, future: TaskFuture, complete: Completion<V> },
	Cancel(String),
}

impl<V> Default for Effects<V> {
	fn default() -> Self {
		Self {
			tasks: Vec::new(),
			client_events: Vec::new(),
			skip_render: false,
			parent_messages: Vec::new(),
			children: Vec::new(),
		}
	}
}

impl<V: 'static> Effects<V> {
	/// Runs `future` outside the session's turn. Its output is handed to `complete` in a later turn, followed by a render.
	///
	/// Starting a task under a name that is still pending replaces it. The replaced task's completion is ignored.
	pub fn start_async<T, F, C>(&mut self, name: impl Into<String>, future: F, complete: C)
	where
		T: Send + 'static,
		F: Future<Output = T> + Send + 'static,
		C: FnOnce(&mut V, T, &mut Effects<V>) -> Result<(), HandlerError> + Send + 'static,
	{
		let name = name.into();
		let expected = name.clone();
		self.tasks.push(TaskOp::Start {
			name,
			future: Box::pin(async move { Box::new(future.await) as TaskOutput }),
			complete: Box::new(move |view: &mut V, output: TaskOutput, effects: &mut Effects<V>| match output.downcast::<T>() {
				Ok(output) => complete(view, *output, effects),
				Err(_) => Err(HandlerError::Failed(format!("background task {:?} completed with an unexpected output type", expected))),
			}),
		});
	}

	/// Forgets a pending task. If it's already running, its completion is ignored.
	pub fn cancel_async(&mut self, name: impl Into<String>) {
		self.tasks.push(TaskOp::Cancel(name.into()));
	}

	/// Sends an event straight to client-side code.
	pub fn push_event(&mut self, event: impl Into<String>, payload: Value) {
		self.client_events.push((event.into(), payload));
	}

	/// Suppresses this turn's automatic render.
	pub fn skip_render(&mut self) {
		self.skip_render = true;
	}

	/// Delivers an event to the parent component's handlers. The parent then re-renders in full.
	pub fn send_parent(&mut self, event: impl Into<String>, params: Params) {
		self.parent_messages.push((event.into(), params));
	}

	/// Mounts `C` as an embedded child, placed by `{% live_child "id" %}`.
	/// Embedding under an existing id replaces that child.
	///
	/// # Errors
	///
	/// Iff `C`'s template is broken or its mount fails.
	pub fn embed_child<C: LiveView>(&mut self, id: impl Into<String>, params: &Params) -> Result<(), HandlerError> {
		let spec = Arc::new(ViewSpec::<C>::build(type_name::<C>())?);
		let (instance, outcome) = Instance::mount(type_name::<C>().to_owned(), spec, params)?;
		self.children.push((ComponentId(id.into()), Box::new(instance), outcome));
		Ok(())
	}
}

/// A view's effects after the view's tasks were filed.
#[derive(Default)]
pub(crate) struct Outcome {
	pub scheduled: Vec<ScheduledTask>,
	pub cancelled: Vec<String>,
	pub client_events: Vec<(String, Value)>,
	pub skip_render: bool,
	pub parent_messages: Vec<(String, Params)>,
	pub children: Vec<(ComponentId, Box<dyn Component>, Outcome)>,
}

/// Background work ready to be spawned by whatever runs the session.
///
/// Its output goes back through [`crate::session::Session::complete_async`] with the same `component`, `name` and `id`.
pub struct ScheduledTask {
	/// [`None`] for the root view.
	pub component: Option<ComponentId>,
	pub name: String,
	pub id: u64,
	pub future: TaskFuture,
}

impl fmt::Debug for ScheduledTask {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ScheduledTask")
			.field("component", &self.component)
			.field("name", &self.name)
			.field("id", &self.id)
			.finish_non_exhaustive()
	}
}

#[derive(Debug, Error)]
pub enum ViewError {
	#[error("template of {view} is invalid: {source}")]
	Template {
		view: String,
		#[source]
		source: TemplateError,
	},
	#[error("template of {view} binds events without handlers: {events:?}")]
	UnhandledEvents { view: String, events: Vec<String> },
	#[error("invalid view descriptor {0:?}")]
	InvalidDescriptor(String),
}

/// Everything about a view type that doesn't change per instance.
struct ViewSpec<V> {
	template: Template,
	includes: TemplateSet,
	handlers: Handlers<V>,
}

impl<V: LiveView> ViewSpec<V> {
	fn build(view: &str) -> Result<Self, ViewError> {
		let template_error = |source| ViewError::Template { view: view.to_owned(), source };
		let template = Template::parse(extract_root(V::template())).map_err(template_error)?;
		let mut includes = TemplateSet::new();
		for (name, source) in V::includes() {
			includes.insert(*name, source).map_err(template_error)?;
		}
		let mut handlers = Handlers::default();
		V::register(&mut handlers);

		let unhandled: Vec<String> = template.referenced_events().into_iter().filter(|event| handlers.get(event).is_none()).collect();
		if !unhandled.is_empty() {
			return Err(ViewError::UnhandledEvents {
				view: view.to_owned(),
				events: unhandled,
			});
		}
		Ok(Self { template, includes, handlers })
	}
}

/// A type-erased live view instance.
pub(crate) trait Component: Send {
	fn name(&self) -> &str;

	/// Renders to markup, with embedded children already rendered by id.
	fn render(&self, children: &HashMap<String, String>) -> Result<String, SessionError>;

	fn handler_names(&self) -> Vec<&'static str>;

	/// [`None`] iff there's no such handler.
	fn dispatch(&mut self, event: &str, params: &Params) -> Option<Result<Outcome, HandlerError>>;

	/// Schedules a handler to run on the output of `future`, which must be [`Params`].
	fn schedule_handler(&mut self, name: &str, future: TaskFuture, handler: &str) -> Option<ScheduledTask>;

	/// Applies a JSON merge patch to the view's serialized state. The view is unchanged on error.
	fn merge_state(&mut self, patch: Map<String, Value>) -> Result<(), serde_json::Error>;

	/// [`None`] iff the task was cancelled or replaced.
	fn complete(&mut self, name: &str, id: u64, output: TaskOutput) -> Option<Result<Outcome, HandlerError>>;

	/// Returns whether a task by that name was pending.
	fn cancel(&mut self, name: &str) -> bool;

	/// [`None`] iff the view lacks the upload capability.
	fn ingest_chunk(&mut self, name: &str, bytes: &[u8], is_final: bool) -> Option<Result<(), HandlerError>>;
}

struct Instance<V> {
	name: String,
	view: V,
	spec: Arc<ViewSpec<V>>,
	pending: HashMap<String, (u64, Completion<V>)>,
	next_task: u64,
}

impl<V: LiveView> Instance<V> {
	fn mount(name: String, spec: Arc<ViewSpec<V>>, params: &Params) -> Result<(Self, Outcome), HandlerError> {
		let mut effects = Effects::default();
		let view = V::mount(params, &mut effects)?;
		let mut instance = Self {
			name,
			view,
			spec,
			pending: HashMap::new(),
			next_task: 0,
		};
		let outcome = instance.file(effects);
		Ok((instance, outcome))
	}

	/// Takes ownership of requested effects, keeping task completions for later.
	fn file(&mut self, effects: Effects<V>) -> Outcome {
		let mut outcome = Outcome {
			client_events: effects.client_events,
			skip_render: effects.skip_render,
			parent_messages: effects.parent_messages,
			children: effects.children,
			..Outcome::default()
		};
		for op in effects.tasks {
			match op {
				TaskOp::Start { name, future, complete } => {
					self.next_task += 1;
					let id = self.next_task;
					if self.pending.insert(name.clone(), (id, complete)).is_some() {
						debug!("Replacing pending task {:?}.", name);
					}
					outcome.scheduled.retain(|task| task.name != name);
					outcome.scheduled.push(ScheduledTask {
						component: None,
						name,
						id,
						future,
					});
				}
				TaskOp::Cancel(name) => {
					self.pending.remove(&name);
					outcome.scheduled.retain(|task| task.name != name);
					outcome.cancelled.push(name);
				}
			}
		}
		outcome
	}

	fn context(&self) -> Result<Context, serde_json::Error> {
		let mut context = Context::from_value(serde_json::to_value(&self.view)?);
		for field in V::safe_fields() {
			context.mark_safe(*field);
		}
		Ok(context)
	}
}

impl<V: LiveView> Component for Instance<V> {
	fn name(&self) -> &str {
		&self.name
	}

	fn render(&self, children: &HashMap<String, String>) -> Result<String, SessionError> {
		let mut context = self.context()?;
		let html = Renderer::new()
			.with_templates(&self.spec.includes)
			.with_children(children)
			.with_include_depth(DEFAULT_INCLUDE_DEPTH)
			.render(&self.spec.template, &mut context)?;
		Ok(html)
	}

	fn handler_names(&self) -> Vec<&'static str> {
		self.spec.handlers.names()
	}

	fn dispatch(&mut self, event: &str, params: &Params) -> Option<Result<Outcome, HandlerError>> {
		let handler = self.spec.handlers.get(event)?;
		if cfg!(feature = "dangerous-logging") {
			trace!(view = self.name.as_str(), event, "Dispatching.");
		} else {
			trace!(view = self.name.as_str(), "Dispatching.");
		}
		let mut effects = Effects::default();
		Some(handler(&mut self.view, params, &mut effects).map(|()| self.file(effects)))
	}

	fn schedule_handler(&mut self, name: &str, future: TaskFuture, handler: &str) -> Option<ScheduledTask> {
		let handler = self.spec.handlers.get(handler)?;
		let mut effects = Effects::default();
		effects.tasks.push(TaskOp::Start {
			name: name.to_owned(),
			future,
			complete: Box::new(move |view: &mut V, output: TaskOutput, effects: &mut Effects<V>| match output.downcast::<Params>() {
				Ok(params) => handler(view, &params, effects),
				Err(_) => Err(HandlerError::Failed("background task did not produce parameters".to_owned())),
			}),
		});
		self.file(effects).scheduled.pop()
	}

	fn merge_state(&mut self, patch: Map<String, Value>) -> Result<(), serde_json::Error> {
		let mut state = serde_json::to_value(&self.view)?;
		merge(&mut state, Value::Object(patch));
		self.view = serde_json::from_value(state)?;
		Ok(())
	}

	fn complete(&mut self, name: &str, id: u64, output: TaskOutput) -> Option<Result<Outcome, HandlerError>> {
		match self.pending.get(name) {
			Some((pending_id, _)) if *pending_id == id => {}
			_ => return None,
		}
		let (_, complete) = self.pending.remove(name)?;
		let mut effects = Effects::default();
		Some(complete(&mut self.view, output, &mut effects).map(|()| self.file(effects)))
	}

	fn cancel(&mut self, name: &str) -> bool {
		self.pending.remove(name).is_some()
	}

	fn ingest_chunk(&mut self, name: &str, bytes: &[u8], is_final: bool) -> Option<Result<(), HandlerError>> {
		self.view.uploads().map(|sink| sink.ingest_chunk(name, bytes, is_final))
	}
}

/// JSON merge patch: objects merge recursively, `null` removes, anything else replaces.
fn merge(target: &mut Value, patch: Value) {
	match (target, patch) {
		(Value::Object(target), Value::Object(patch)) => {
			for (key, value) in patch {
				if value.is_null() {
					target.remove(&key);
				} else {
					merge(target.entry(key).or_insert(Value::Null), value);
				}
			}
		}
		(target, patch) => *target = patch,
	}
}

trait Factory: Send + Sync {
	fn mount(&self, name: &str, params: &Params) -> Result<(Box<dyn Component>, Outcome), HandlerError>;
}

struct ViewFactory<V> {
	spec: Arc<ViewSpec<V>>,
	_view: PhantomData<fn() -> V>,
}

impl<V: LiveView> Factory for ViewFactory<V> {
	fn mount(&self, name: &str, params: &Params) -> Result<(Box<dyn Component>, Outcome), HandlerError> {
		let (instance, outcome) = Instance::mount(name.to_owned(), Arc::clone(&self.spec), params)?;
		Ok((Box::new(instance), outcome))
	}
}

/// The views that may be mounted, by `module.path.ViewName` descriptor.
#[derive(Default)]
pub struct ViewRegistry {
	factories: HashMap<String, Box<dyn Factory>>,
}

impl fmt::Debug for ViewRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.factories.keys()).finish()
	}
}

impl ViewRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `V` under `descriptor`, checking its template and handler table.
	///
	/// # Errors
	///
	/// Iff `descriptor` is malformed, `V`'s template doesn't parse
	/// or binds an event `V` has no handler for.
	pub fn register<V: LiveView>(&mut self, descriptor: &str) -> Result<&mut Self, ViewError> {
		if !is_valid_descriptor(descriptor) {
			return Err(ViewError::InvalidDescriptor(descriptor.to_owned()));
		}
		let spec = Arc::new(ViewSpec::<V>::build(descriptor)?);
		self.factories.insert(
			descriptor.to_owned(),
			Box::new(ViewFactory {
				spec,
				_view: PhantomData,
			}),
		);
		Ok(self)
	}

	#[must_use]
	pub fn contains(&self, descriptor: &str) -> bool {
		self.factories.contains_key(descriptor)
	}

	/// Validates `descriptor` before anything is instantiated.
	pub(crate) fn mount(&self, config: &LiveConfig, descriptor: &str, params: &Params) -> Result<(Box<dyn Component>, Outcome), MountError> {
		if !is_valid_descriptor(descriptor) {
			return Err(MountError::InvalidDescriptor(descriptor.to_owned()));
		}
		if !config.allows_module(descriptor) {
			if cfg!(feature = "dangerous-logging") {
				warn!("Rejected mount of {:?} outside allowed modules.", descriptor);
			} else {
				warn!("Rejected mount outside allowed modules.");
			}
			return Err(MountError::NotAllowed(descriptor.to_owned()));
		}
		let factory = self.factories.get(descriptor).ok_or_else(|| MountError::UnknownView(descriptor.to_owned()))?;
		factory.mount(descriptor, params).map_err(|source| MountError::Init {
			view: descriptor.to_owned(),
			source,
		})
	}
}

/// `module.path.ViewName`: at least two dot-separated identifiers.
fn is_valid_descriptor(descriptor: &str) -> bool {
	let mut segments = 0;
	for segment in descriptor.split('.') {
		let mut chars = segment.chars();
		match chars.next() {
			Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
			_ => return false,
		}
		if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
			return false;
		}
		segments += 1;
	}
	segments >= 2
}

/// Reads a parameter, deserializing it into `T`.
///
/// # Errors
///
/// Iff the parameter is missing or has the wrong shape.
pub fn param<T: DeserializeOwned>(params: &Params, name: &str) -> Result<T, HandlerError> {
	let value = params.get(name).ok_or_else(|| HandlerError::MissingParam(name.to_owned()))?;
	serde_json::from_value(value.clone()).map_err(|error| HandlerError::InvalidParam {
		name: name.to_owned(),
		reason: error.to_string(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[derive(Debug, Serialize, Deserialize)]
	struct Counter {
		count: i64,
	}

	impl LiveView for Counter {
		fn template() -> &'static str {
			r#"<html><body><div dj-root><span>{{ count }}</span><button dj-click="increment">+</button></div></body></html>"#
		}

		fn mount(params: &Params, _: &mut Effects<Self>) -> Result<Self, HandlerError> {
			Ok(Self {
				count: params.get("start").and_then(Value::as_i64).unwrap_or(0),
			})
		}

		fn register(handlers: &mut Handlers<Self>) {
			handlers.on("increment", |view, _, _| {
				view.count += 1;
				Ok(())
			});
		}
	}

	#[derive(Debug, Serialize, Deserialize)]
	struct Broken;

	impl LiveView for Broken {
		fn template() -> &'static str {
			r#"<div><button dj-click="missing">x</button></div>"#
		}

		fn mount(_: &Params, _: &mut Effects<Self>) -> Result<Self, HandlerError> {
			Ok(Self)
		}

		fn register(_: &mut Handlers<Self>) {}
	}

	#[derive(Debug, Serialize, Deserialize)]
	struct Malformed;

	impl LiveView for Malformed {
		fn template() -> &'static str {
			"<div dj-root>{%}</div>"
		}

		fn mount(_: &Params, _: &mut Effects<Self>) -> Result<Self, HandlerError> {
			Ok(Self)
		}

		fn register(_: &mut Handlers<Self>) {}
	}

	#[test]
	fn descriptors() {
		assert!(is_valid_descriptor("app.views.Counter"));
		assert!(is_valid_descriptor("a.B"));
		assert!(!is_valid_descriptor("Counter"));
		assert!(!is_valid_descriptor("app..Counter"));
		assert!(!is_valid_descriptor("app.views.Counter; rm -rf"));
		assert!(!is_valid_descriptor("app.1views.Counter"));
	}

	#[test]
	fn registration_checks_handlers() {
		let mut registry = ViewRegistry::new();
		assert!(registry.register::<Counter>("app.views.Counter").is_ok());
		assert!(matches!(
			registry.register::<Broken>("app.views.Broken"),
			Err(ViewError::UnhandledEvents { ref events, .. }) if events == &["missing"]
		));
		assert!(matches!(registry.register::<Counter>("Counter"), Err(ViewError::InvalidDescriptor(_))));
		assert!(matches!(registry.register::<Malformed>("app.views.Malformed"), Err(ViewError::Template { .. })));
		assert!(registry.contains("app.views.Counter"));
		assert!(!registry.contains("app.views.Broken"));
	}

	#[test]
	fn mount_validation_order() {
		let mut registry = ViewRegistry::new();
		registry.register::<Counter>("app.views.Counter").unwrap();
		let config = LiveConfig {
			allowed_modules: vec!["app.views".to_owned()],
			..LiveConfig::default()
		};
		let params = Params::new();
		assert!(matches!(registry.mount(&config, "os.system", &params), Err(MountError::NotAllowed(_))));
		assert!(matches!(registry.mount(&config, "not a view", &params), Err(MountError::InvalidDescriptor(_))));
		assert!(matches!(registry.mount(&config, "app.views.Missing", &params), Err(MountError::UnknownView(_))));
		assert!(registry.mount(&config, "app.views.Counter", &params).is_ok());
	}

	#[test]
	fn instances_render_only_the_live_root() {
		let spec = Arc::new(ViewSpec::<Counter>::build("app.views.Counter").unwrap());
		let mut params = Params::new();
		params.insert("start".to_owned(), json!(41));
		let (mut instance, _) = Instance::mount("app.views.Counter".to_owned(), spec, &params).unwrap();
		instance.dispatch("increment", &Params::new()).unwrap().unwrap();
		assert_eq!(
			instance.render(&HashMap::new()).unwrap(),
			r#"<div dj-root><span>42</span><button dj-click="increment">+</button></div>"#
		);
		assert!(instance.dispatch("decrement", &Params::new()).is_none());
	}

	#[test]
	fn merge_patches() {
		let mut target = json!({"a": 1, "b": {"c": 2, "d": 3}});
		merge(&mut target, json!({"a": 5, "b": {"c": null, "e": 4}}));
		assert_eq!(target, json!({"a": 5, "b": {"d": 3, "e": 4}}));
	}

	#[test]
	fn task_filing_keeps_latest_and_honors_cancel() {
		let spec = Arc::new(ViewSpec::<Counter>::build("app.views.Counter").unwrap());
		let (mut instance, _) = Instance::mount("c".to_owned(), spec, &Params::new()).unwrap();

		let mut effects = Effects::default();
		effects.start_async("load", async { 1_i64 }, |view: &mut Counter, n, _| {
			view.count += n;
			Ok(())
		});
		effects.start_async("load", async { 10_i64 }, |view: &mut Counter, n, _| {
			view.count += n;
			Ok(())
		});
		let outcome = instance.file(effects);
		assert_eq!(outcome.scheduled.len(), 1);
		let task = &outcome.scheduled[0];
		assert_eq!(task.id, 2);

		assert!(instance.complete("load", 1, Box::new(1_i64)).is_none());
		assert!(instance.complete("load", 2, Box::new(10_i64)).unwrap().is_ok());
		assert_eq!(instance.view.count, 10);
		assert!(instance.complete("load", 2, Box::new(10_i64)).is_none());

		let mut effects = Effects::default();
		effects.start_async("later", async {}, |_: &mut Counter, (), _| Ok(()));
		effects.cancel_async("later");
		let outcome = instance.file(effects);
		assert!(outcome.scheduled.is_empty());
		assert_eq!(outcome.cancelled, ["later"]);
	}

	#[test]
	fn params() {
		let mut params = Params::new();
		params.insert("n".to_owned(), json!(3));
		assert_eq!(param::<i64>(&params, "n").unwrap(), 3);
		assert!(matches!(param::<i64>(&params, "m"), Err(HandlerError::MissingParam(_))));
		assert!(matches!(param::<String>(&params, "n"), Err(HandlerError::InvalidParam { .. })));
	}
}
