//! The per-connection session state machine.
//!
//! A [`Session`] is synchronous: every operation is one turn that mutates the session and returns the
//! messages for the client. Serializing turns and running background work is up to the caller,
//! see [`crate::actor`] for the tokio runner.

use crate::{
	config::{LiveConfig, Mode},
	diff::Differ,
	error::SessionError,
	load::{load_fragment, load_root},
	node::{Node, NodeKind, Tree, COMPONENT_ATTRIBUTE, STREAM_ATTRIBUTE},
	observe::{emit, snippet, FallbackReason, FullHtmlUpdate},
	patch::{serialized_size, Patch},
	protocol::{ClientMessage, ServerMessage},
	render::RenderError,
	value::{Map, Value},
	view::{Component, ComponentId, Outcome, Params, ScheduledTask, TaskFuture, TaskOutput, ViewRegistry},
};
use hashbrown::HashMap;
use serde::Serialize;
use std::{fmt, future::Future, sync::Arc};
use tracing::{debug, debug_span, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
	Connecting,
	Mounted,
	Active,
	Disconnected,
	Closed,
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Phase::Connecting => "connecting",
			Phase::Mounted => "mounted",
			Phase::Active => "active",
			Phase::Disconnected => "disconnected",
			Phase::Closed => "closed",
		})
	}
}

/// An update injected from outside the live connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPush {
	/// A JSON merge patch against the root view's state.
	State(Map<String, Value>),
	/// Runs a root view handler as if the client had sent the event.
	Handler { name: String, payload: Params },
}

/// Single-slot, destructive-read store of the last full markup.
#[derive(Debug, Default)]
pub struct RecoveryCache {
	slot: Option<(String, u64)>,
}

impl RecoveryCache {
	pub fn store(&mut self, html: String, version: u64) {
		self.slot = Some((html, version));
	}

	pub fn take(&mut self) -> Option<(String, u64)> {
		self.slot.take()
	}

	pub fn clear(&mut self) {
		self.slot = None;
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.slot.is_none()
	}
}

struct Child {
	component: Box<dyn Component>,
	/// [`None`] if the parent is the root view.
	parent: Option<ComponentId>,
}

#[derive(Debug, Default)]
struct Stream {
	buffer: String,
	open: bool,
}

pub struct Session {
	id: String,
	config: Arc<LiveConfig>,
	registry: Arc<ViewRegistry>,
	phase: Phase,
	root: Option<Box<dyn Component>>,
	children: HashMap<ComponentId, Child>,
	current: Option<Tree>,
	version: u64,
	recovery: RecoveryCache,
	streams: HashMap<String, Stream>,
	scheduled: Vec<ScheduledTask>,
	differ: Differ,
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("id", &self.id)
			.field("phase", &self.phase)
			.field("view", &self.root.as_ref().map(|root| root.name()))
			.field("children", &self.children.len())
			.field("version", &self.version)
			.field("streams", &self.streams)
			.field("scheduled", &self.scheduled)
			.finish_non_exhaustive()
	}
}

enum Decision {
	Patches(Vec<Patch>),
	Fallback { reason: FallbackReason, patch_count: usize },
}

impl Session {
	#[must_use]
	pub fn new(id: impl Into<String>, config: Arc<LiveConfig>, registry: Arc<ViewRegistry>) -> Self {
		let differ = Differ::new(config.max_render_depth);
		Self {
			id: id.into(),
			config,
			registry,
			phase: Phase::Connecting,
			root: None,
			children: HashMap::new(),
			current: None,
			version: 0,
			recovery: RecoveryCache::default(),
			streams: HashMap::new(),
			scheduled: Vec::new(),
			differ,
		}
	}

	#[must_use]
	pub fn id(&self) -> &str {
		&self.id
	}

	#[must_use]
	pub fn phase(&self) -> Phase {
		self.phase
	}

	#[must_use]
	pub fn mode(&self) -> Mode {
		self.config.mode
	}

	/// The number of the last successful render.
	#[must_use]
	pub fn version(&self) -> u64 {
		self.version
	}

	/// The tree the client is expected to show.
	#[must_use]
	pub fn current_tree(&self) -> Option<&Tree> {
		self.current.as_ref()
	}

	#[must_use]
	pub fn is_streaming(&self) -> bool {
		self.streams.values().any(|stream| stream.open)
	}

	/// Background tasks waiting to be spawned.
	#[must_use]
	pub fn scheduled(&self) -> &[ScheduledTask] {
		&self.scheduled
	}

	pub fn take_scheduled(&mut self) -> Vec<ScheduledTask> {
		std::mem::take(&mut self.scheduled)
	}

	fn ensure_active(&self) -> Result<(), SessionError> {
		match self.phase {
			Phase::Mounted | Phase::Active => Ok(()),
			Phase::Connecting => Err(SessionError::NotMounted),
			phase @ (Phase::Disconnected | Phase::Closed) => Err(SessionError::Terminated(phase)),
		}
	}

	/// Handles one decoded client message. Errors become [`ServerMessage::Error`]s.
	pub fn handle_client_message(&mut self, message: ClientMessage) -> Vec<ServerMessage> {
		let result = match message {
			ClientMessage::Mount { view, params } => self.mount(&view, &params),
			ClientMessage::Event { event, params, component_id } => self.event(&event, &params, component_id.as_ref()),
			ClientMessage::RequestHtml => self.request_html().map(|message| vec![message]),
		};
		result.unwrap_or_else(|error| vec![self.error_message(&error)])
	}

	/// Turns an error into the message the client may see.
	#[must_use]
	pub fn error_message(&self, error: &SessionError) -> ServerMessage {
		if cfg!(feature = "dangerous-logging") {
			warn!(session = self.id.as_str(), "Turn failed: {}", error);
		} else {
			warn!(session = self.id.as_str(), kind = error.kind(), "Turn failed.");
		}
		ServerMessage::Error {
			error: error.client_message(self.config.mode),
		}
	}

	/// Validates and instantiates a view, then renders it for the first time.
	///
	/// # Errors
	///
	/// Iff the descriptor is rejected, the view fails to mount or its first render fails.
	/// The session is then left unmounted.
	pub fn mount(&mut self, view: &str, params: &Params) -> Result<Vec<ServerMessage>, SessionError> {
		match self.phase {
			Phase::Connecting => {}
			Phase::Mounted | Phase::Active => return Err(SessionError::AlreadyMounted),
			phase => return Err(SessionError::Terminated(phase)),
		}
		let _span = debug_span!("mount", session = self.id.as_str()).entered();

		let (component, outcome) = self.registry.mount(&self.config, view, params)?;
		self.root = Some(component);
		self.phase = Phase::Mounted;

		let mut messages = Vec::new();
		let (_, upward) = self.file(None, outcome, &mut messages);
		if !upward.is_empty() {
			warn!("Root view sent {} message(s) to a parent it doesn't have.", upward.len());
		}
		let mount = match self.update_root(None, None) {
			Ok(ServerMessage::HtmlUpdate { html, .. }) => ServerMessage::Mount { html },
			Ok(other) => other,
			Err(error) => {
				self.release();
				self.phase = Phase::Connecting;
				self.version = 0;
				return Err(error);
			}
		};
		messages.insert(0, mount);
		self.phase = Phase::Active;
		info!(session = self.id.as_str(), version = self.version, "Mounted.");
		Ok(messages)
	}

	/// Runs a client event on the root view or, with `component_id`, on an embedded child.
	///
	/// # Errors
	///
	/// Iff nothing is mounted, there is no such component or handler, or the handler or render fails.
	pub fn event(&mut self, event: &str, params: &Params, component_id: Option<&ComponentId>) -> Result<Vec<ServerMessage>, SessionError> {
		self.ensure_active()?;
		let span = if cfg!(feature = "dangerous-logging") {
			debug_span!("event", session = self.id.as_str(), event)
		} else {
			debug_span!("event", session = self.id.as_str())
		};
		let _span = span.entered();
		if let Some(id) = component_id {
			if !self.children.contains_key(id) {
				return Err(SessionError::UnknownComponent(id.clone()));
			}
		}
		let outcome = self.dispatch(component_id, event, params)?;
		self.run_turn(component_id.cloned(), event, outcome)
	}

	/// # Errors
	///
	/// Like [`Session::event`], or iff a state patch doesn't fit the view.
	pub fn server_push(&mut self, push: ServerPush) -> Result<Vec<ServerMessage>, SessionError> {
		self.ensure_active()?;
		let _span = debug_span!("server_push", session = self.id.as_str()).entered();
		match push {
			ServerPush::State(patch) => {
				self.component_mut(None)?.merge_state(patch)?;
				Ok(vec![self.update_root(None, None)?])
			}
			ServerPush::Handler { name, payload } => {
				let outcome = self.dispatch(None, &name, &payload)?;
				self.run_turn(None, &name, outcome)
			}
		}
	}

	/// Opens (or reopens, emptied) the stream into the element marked `dj-stream="{target}"`.
	///
	/// # Errors
	///
	/// Iff nothing is mounted or the current tree has no such target.
	pub fn stream_start(&mut self, target: &str) -> Result<(), SessionError> {
		self.ensure_active()?;
		self.stream_path(target)?;
		debug!(session = self.id.as_str(), target, "Stream started.");
		self.streams.insert(target.to_owned(), Stream { buffer: String::new(), open: true });
		Ok(())
	}

	/// Appends `data` to an open stream and patches only the stream target.
	///
	/// # Errors
	///
	/// Iff the stream isn't open or its target is gone.
	pub fn stream_token(&mut self, target: &str, data: &str) -> Result<Vec<ServerMessage>, SessionError> {
		self.ensure_active()?;
		let stream = self
			.streams
			.get_mut(target)
			.filter(|stream| stream.open)
			.ok_or_else(|| SessionError::StreamNotOpen(target.to_owned()))?;
		stream.buffer.push_str(data);
		let text = stream.buffer.clone();
		let path = self.stream_path(target)?;

		let version = self.version + 1;
		let tree = self.current.as_mut().ok_or(SessionError::NotMounted)?;
		let node = tree.root.at_mut(&path).ok_or_else(|| SessionError::UnknownStreamTarget(target.to_owned()))?;
		let mut updated = node.clone();
		updated.children = if text.is_empty() { Vec::new() } else { vec![Node::text(text)] };

		match self.differ.diff_subtree(node, &updated, path) {
			Ok(patches) if patches.is_empty() => Ok(Vec::new()),
			Ok(patches) => {
				*node = updated;
				tree.version = version;
				self.version = version;
				self.recovery.store(tree.to_html(), version);
				trace!(target, count = patches.len(), version, "Streamed.");
				Ok(vec![ServerMessage::Patches { patches, version }])
			}
			Err(incompatible) => {
				warn!("Can't patch stream target: {}", incompatible);
				Ok(vec![self.update_root(None, Some(FallbackReason::DiffIncompatible))?])
			}
		}
	}

	/// Closes a stream. Its content stays in place through later renders.
	///
	/// # Errors
	///
	/// Iff the stream isn't open.
	pub fn stream_done(&mut self, target: &str) -> Result<(), SessionError> {
		let stream = self
			.streams
			.get_mut(target)
			.filter(|stream| stream.open)
			.ok_or_else(|| SessionError::StreamNotOpen(target.to_owned()))?;
		stream.open = false;
		debug!(session = self.id.as_str(), target, "Stream done.");
		Ok(())
	}

	fn stream_path(&self, target: &str) -> Result<Vec<usize>, SessionError> {
		self.current
			.as_ref()
			.and_then(|tree| tree.root.find_path(&mut |node| node.attribute(STREAM_ATTRIBUTE) == Some(target)))
			.ok_or_else(|| SessionError::UnknownStreamTarget(target.to_owned()))
	}

	/// Schedules `future` as background work for the root view. Its output is passed to the root view's `handler` as parameters.
	/// Replaces a pending task of the same name.
	///
	/// # Errors
	///
	/// Iff nothing is mounted or there is no such handler.
	pub fn start_async<F>(&mut self, name: &str, future: F, handler: &str) -> Result<(), SessionError>
	where
		F: Future<Output = Params> + Send + 'static,
	{
		self.ensure_active()?;
		let future: TaskFuture = Box::pin(async move { Box::new(future.await) as TaskOutput });
		let component = self.component_mut(None)?;
		let Some(task) = component.schedule_handler(name, future, handler) else {
			return Err(SessionError::HandlerNotFound {
				view: component.name().to_owned(),
				event: handler.to_owned(),
				suggestions: Vec::new(),
			});
		};
		self.scheduled.retain(|scheduled| !(scheduled.component.is_none() && scheduled.name == name));
		self.scheduled.push(task);
		Ok(())
	}

	/// Drops a task that hasn't been spawned yet, or makes sure a running one's completion is ignored.
	/// Returns whether there was such a task.
	pub fn cancel_async(&mut self, name: &str, component: Option<&ComponentId>) -> bool {
		let before = self.scheduled.len();
		self.scheduled.retain(|task| !(task.component.as_ref() == component && task.name == name));
		let pending = self.component_mut(component).map_or(false, |target| target.cancel(name));
		if pending {
			debug!(session = self.id.as_str(), task = name, "Cancelled task.");
		}
		pending || before != self.scheduled.len()
	}

	/// Hands a background task's output back to its view and renders.
	/// Completions of cancelled or replaced tasks, or arriving after termination, are ignored.
	///
	/// # Errors
	///
	/// Iff the completion handler or the render fails.
	pub fn complete_async(&mut self, component: Option<ComponentId>, name: &str, id: u64, output: TaskOutput) -> Result<Vec<ServerMessage>, SessionError> {
		if self.ensure_active().is_err() {
			debug!(session = self.id.as_str(), task = name, "Ignoring completion outside an active session.");
			return Ok(Vec::new());
		}
		let _span = debug_span!("complete_async", session = self.id.as_str(), task = name, id).entered();
		let Ok(target) = self.component_mut(component.as_ref()) else {
			debug!("Ignoring completion for a component that is gone.");
			return Ok(Vec::new());
		};
		match target.complete(name, id, output) {
			None => {
				debug!("Ignoring completion of a cancelled or replaced task.");
				Ok(Vec::new())
			}
			Some(Err(source)) => Err(SessionError::Handler { event: name.to_owned(), source }),
			Some(Ok(outcome)) => self.run_turn(component, name, outcome),
		}
	}

	/// One-shot recovery: hands out the markup of the last render, at most once per render.
	///
	/// # Errors
	///
	/// [`SessionError::RecoveryUnavailable`] iff the markup was already handed out, or nothing was rendered yet.
	pub fn request_html(&mut self) -> Result<ServerMessage, SessionError> {
		if let phase @ (Phase::Disconnected | Phase::Closed) = self.phase {
			return Err(SessionError::Terminated(phase));
		}
		let (html, version) = self.recovery.take().ok_or(SessionError::RecoveryUnavailable)?;
		debug!(session = self.id.as_str(), version, "Handing out recovery markup.");
		Ok(ServerMessage::HtmlRecovery { html, version })
	}

	/// Passes an upload chunk to the root view. The final chunk triggers a render.
	///
	/// # Errors
	///
	/// [`SessionError::CapabilityMissing`] iff the root view doesn't accept uploads.
	pub fn ingest_chunk(&mut self, name: &str, bytes: &[u8], is_final: bool) -> Result<Vec<ServerMessage>, SessionError> {
		self.ensure_active()?;
		let component = self.component_mut(None)?;
		match component.ingest_chunk(name, bytes, is_final) {
			None => Err(SessionError::CapabilityMissing {
				view: component.name().to_owned(),
				capability: "upload",
			}),
			Some(Err(source)) => Err(SessionError::Handler { event: name.to_owned(), source }),
			Some(Ok(())) if is_final => Ok(vec![self.update_root(None, None)?]),
			Some(Ok(())) => Ok(Vec::new()),
		}
	}

	/// The connection is gone. Releases everything the session owns.
	pub fn disconnect(&mut self) {
		self.release();
		self.phase = Phase::Disconnected;
		info!(session = self.id.as_str(), "Disconnected.");
	}

	/// Ends the session from the server side. Releases everything the session owns.
	pub fn close(&mut self) {
		self.release();
		self.phase = Phase::Closed;
		info!(session = self.id.as_str(), "Closed.");
	}

	fn release(&mut self) {
		self.root = None;
		self.children.clear();
		self.current = None;
		self.recovery.clear();
		self.streams.clear();
		self.scheduled.clear();
	}

	fn component(&self, owner: Option<&ComponentId>) -> Result<&dyn Component, SessionError> {
		match owner {
			None => self.root.as_deref().ok_or(SessionError::NotMounted),
			Some(id) => self
				.children
				.get(id)
				.map(|child| &*child.component)
				.ok_or_else(|| SessionError::UnknownComponent(id.clone())),
		}
	}

	fn component_mut(&mut self, owner: Option<&ComponentId>) -> Result<&mut Box<dyn Component>, SessionError> {
		match owner {
			None => self.root.as_mut().ok_or(SessionError::NotMounted),
			Some(id) => self
				.children
				.get_mut(id)
				.map(|child| &mut child.component)
				.ok_or_else(|| SessionError::UnknownComponent(id.clone())),
		}
	}

	fn dispatch(&mut self, owner: Option<&ComponentId>, event: &str, params: &Params) -> Result<Outcome, SessionError> {
		let mode = self.config.mode;
		let component = self.component_mut(owner)?;
		match component.dispatch(event, params) {
			Some(Ok(outcome)) => Ok(outcome),
			Some(Err(source)) => Err(SessionError::Handler { event: event.to_owned(), source }),
			None => {
				let suggestions = match mode {
					Mode::Development => suggest(event, &component.handler_names()),
					Mode::Production => Vec::new(),
				};
				Err(SessionError::HandlerNotFound {
					view: component.name().to_owned(),
					event: event.to_owned(),
					suggestions,
				})
			}
		}
	}

	/// Files a component's effects with the session.
	/// Returns whether the component skips rendering, and its messages for its parent.
	fn file(&mut self, owner: Option<&ComponentId>, outcome: Outcome, messages: &mut Vec<ServerMessage>) -> (bool, Vec<(String, Params)>) {
		for name in &outcome.cancelled {
			self.scheduled.retain(|task| !(task.component.as_ref() == owner && &task.name == name));
		}
		for mut task in outcome.scheduled {
			task.component = owner.cloned();
			self.scheduled.retain(|scheduled| !(scheduled.component == task.component && scheduled.name == task.name));
			trace!(task = task.name.as_str(), id = task.id, "Scheduled task.");
			self.scheduled.push(task);
		}
		messages.extend(
			outcome
				.client_events
				.into_iter()
				.map(|(event, payload)| ServerMessage::ClientPushEvent { event, payload }),
		);
		for (id, component, child_outcome) in outcome.children {
			debug!(component = %id, view = component.name(), "Embedding child.");
			self.remove_child(&id);
			self.children.insert(id.clone(), Child { component, parent: owner.cloned() });
			let (_, upward) = self.file(Some(&id), child_outcome, messages);
			if !upward.is_empty() {
				warn!("Ignoring {} message(s) a child sent to its parent while mounting.", upward.len());
			}
		}
		(outcome.skip_render, outcome.parent_messages)
	}

	/// Removes a child with its descendants and their tasks.
	fn remove_child(&mut self, id: &ComponentId) {
		if self.children.remove(id).is_none() {
			return;
		}
		self.scheduled.retain(|task| task.component.as_ref() != Some(id));
		let descendants: Vec<ComponentId> = self
			.children
			.iter()
			.filter(|(_, child)| child.parent.as_ref() == Some(id))
			.map(|(id, _)| id.clone())
			.collect();
		for descendant in descendants {
			self.remove_child(&descendant);
		}
	}

	/// Files the effects of a dispatched handler, renders, then walks messages up the component hierarchy.
	fn run_turn(&mut self, owner: Option<ComponentId>, event_name: &str, outcome: Outcome) -> Result<Vec<ServerMessage>, SessionError> {
		let mut messages = Vec::new();
		let (skip_render, mut upward) = self.file(owner.as_ref(), outcome, &mut messages);
		if skip_render {
			trace!("Render skipped.");
		} else {
			messages.push(match &owner {
				None => self.update_root(Some(event_name), None)?,
				Some(id) => self.update_child(id, FallbackReason::EmbeddedChild, Some(event_name))?,
			});
		}

		let mut sender = owner;
		while !upward.is_empty() {
			let Some(parent) = sender.as_ref().and_then(|id| self.children.get(id)).map(|child| child.parent.clone()) else {
				warn!("Root view sent {} message(s) to a parent it doesn't have.", upward.len());
				break;
			};
			let mut skip_render = true;
			let mut next = Vec::new();
			for (event, params) in upward {
				let outcome = self.dispatch(parent.as_ref(), &event, &params)?;
				let (skip, mut further) = self.file(parent.as_ref(), outcome, &mut messages);
				skip_render &= skip;
				next.append(&mut further);
			}
			if !skip_render {
				messages.push(match &parent {
					None => self.update_root(Some(event_name), Some(FallbackReason::ComponentEvent))?,
					Some(id) => self.update_child(id, FallbackReason::ComponentEvent, Some(event_name))?,
				});
			}
			upward = next;
			sender = parent;
		}
		Ok(messages)
	}

	/// Renders a component to markup, with its children embedded.
	fn render_markup(&self, owner: Option<&ComponentId>, depth: usize) -> Result<String, SessionError> {
		if depth > self.config.max_render_depth {
			return Err(RenderError::IncludeDepth(self.config.max_render_depth).into());
		}
		let mut children = HashMap::new();
		for (id, child) in &self.children {
			if child.parent.as_ref() == owner {
				children.insert(id.0.clone(), self.render_markup(Some(id), depth + 1)?);
			}
		}
		self.component(owner)?.render(&children)
	}

	/// Renders the root view to a new tree with streamed content put back in place.
	fn render_root_tree(&self) -> Result<Tree, SessionError> {
		let html = self.render_markup(None, 0)?;
		let mut root = load_root(&html)?;
		for (target, stream) in &self.streams {
			if stream.buffer.is_empty() {
				continue;
			}
			let Some(path) = root.find_path(&mut |node| node.attribute(STREAM_ATTRIBUTE) == Some(target.as_str())) else {
				continue;
			};
			if let Some(node) = root.at_mut(&path) {
				node.children = vec![Node::text(stream.buffer.clone())];
			}
		}
		Ok(Tree::new(root, self.version + 1))
	}

	/// Renders the root view and diffs it against the current tree, unless `forced` demands full markup.
	fn update_root(&mut self, event_name: Option<&str>, forced: Option<FallbackReason>) -> Result<ServerMessage, SessionError> {
		let tree = self.render_root_tree()?;
		let html = tree.to_html();
		let previous = self.current.take();
		let decision = match self.decide(previous.as_ref(), &tree, &html, forced) {
			Ok(decision) => decision,
			Err(error) => {
				self.current = previous;
				return Err(error);
			}
		};

		let version = tree.version;
		let message = match decision {
			Decision::Patches(patches) => {
				debug!(count = patches.len(), version, "Sending patches.");
				ServerMessage::Patches { patches, version }
			}
			Decision::Fallback { reason, patch_count } => {
				let previous_html = previous.as_ref().map(Tree::to_html);
				let dangerous = cfg!(feature = "dangerous-logging") && reason == FallbackReason::NoPatches;
				emit(
					&self.config.observers,
					&FullHtmlUpdate {
						reason,
						event_name: event_name.map(str::to_owned),
						view_name: self.root.as_ref().map(|root| root.name().to_owned()).unwrap_or_default(),
						html_size: html.len(),
						previous_html_size: previous_html.as_ref().map(String::len),
						patch_count,
						version,
						html_snippet: dangerous.then(|| snippet(&html)),
						previous_html_snippet: previous_html.as_deref().filter(|_| dangerous).map(snippet),
					},
				);
				ServerMessage::HtmlUpdate {
					html: html.clone(),
					version,
					reason,
					component_id: None,
				}
			}
		};

		self.version = version;
		self.recovery.store(html, version);
		self.current = Some(tree);
		Ok(message)
	}

	fn decide(&mut self, previous: Option<&Tree>, tree: &Tree, html: &str, forced: Option<FallbackReason>) -> Result<Decision, SessionError> {
		let previous = match (previous, forced) {
			(None, _) => {
				return Ok(Decision::Fallback {
					reason: FallbackReason::FirstRender,
					patch_count: 0,
				})
			}
			(Some(_), Some(reason)) => return Ok(Decision::Fallback { reason, patch_count: 0 }),
			(Some(previous), None) => previous,
		};
		let patches = match self.differ.diff(previous, tree) {
			Ok(patches) => patches,
			Err(incompatible) => {
				warn!("Falling back to full markup: {}", incompatible);
				return Ok(Decision::Fallback {
					reason: FallbackReason::DiffIncompatible,
					patch_count: 0,
				});
			}
		};
		if patches.is_empty() {
			warn!("Render produced no changes. The changed state may not be used by the template.");
			return Ok(Decision::Fallback {
				reason: FallbackReason::NoPatches,
				patch_count: 0,
			});
		}
		let patch_bytes = serialized_size(&patches)?;
		if self.config.patch_compression.prefers_html(patches.len(), patch_bytes, html.len()) {
			debug!(count = patches.len(), patch_bytes, html_bytes = html.len(), "Full markup is smaller than the patches.");
			return Ok(Decision::Fallback {
				reason: FallbackReason::PatchCompression,
				patch_count: patches.len(),
			});
		}
		Ok(Decision::Patches(patches))
	}

	/// Re-renders an embedded child in full and splices it into the current tree.
	fn update_child(&mut self, id: &ComponentId, reason: FallbackReason, event_name: Option<&str>) -> Result<ServerMessage, SessionError> {
		let view_name = self.component(Some(id))?.name().to_owned();
		let nodes = load_fragment(&self.render_markup(Some(id), 0)?)?;
		let html: String = nodes.iter().map(Node::to_html).collect();
		let version = self.version + 1;

		let mut previous_html_size = None;
		if let Some(tree) = &mut self.current {
			let boundary = tree
				.root
				.find_path(&mut |node| node.kind == NodeKind::ComponentBoundary && node.attribute(COMPONENT_ATTRIBUTE) == Some(id.0.as_str()));
			match boundary.and_then(|path| tree.root.at_mut(&path)) {
				Some(boundary) => {
					previous_html_size = Some(boundary.children.iter().map(|child| child.to_html().len()).sum());
					boundary.children = nodes;
				}
				None => warn!(component = %id, "Embedded child is not placed in the current tree."),
			}
			tree.version = version;
			self.recovery.store(tree.to_html(), version);
		}
		self.version = version;

		emit(
			&self.config.observers,
			&FullHtmlUpdate {
				reason,
				event_name: event_name.map(str::to_owned),
				view_name,
				html_size: html.len(),
				previous_html_size,
				patch_count: 0,
				version,
				html_snippet: None,
				previous_html_snippet: None,
			},
		);
		Ok(ServerMessage::HtmlUpdate {
			html,
			version,
			reason,
			component_id: Some(id.clone()),
		})
	}
}

/// Up to three registered handler names close to `event`.
fn suggest(event: &str, names: &[&'static str]) -> Vec<String> {
	let mut scored: Vec<(f64, &str)> = names
		.iter()
		.map(|name| (strsim::normalized_damerau_levenshtein(event, name), *name))
		.filter(|(score, _)| *score >= 0.6)
		.collect();
	scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
	scored.into_iter().take(3).map(|(_, name)| name.to_owned()).collect()
}
