//! Runs a [`Session`] as a tokio task.
//!
//! The actor owns the session and processes one command per turn, so turns never interleave.
//! Background tasks the session schedules are spawned between turns, and their completions come back through the actor's own queue.

use crate::{
	error::SessionError,
	protocol::{ClientMessage, ServerMessage},
	session::{Phase, ServerPush, Session},
	view::{ComponentId, Params, ScheduledTask, TaskOutput},
};
use hashbrown::HashMap;
use std::{future::Future, pin::Pin};
use tokio::{
	sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender},
	task::JoinHandle,
};
use tracing::{debug, debug_span, trace};

type ParamsFuture = Pin<Box<dyn Future<Output = Params> + Send>>;

enum Command {
	Client(ClientMessage),
	Push(ServerPush),
	StreamStart { target: String },
	StreamToken { target: String, data: String },
	StreamDone { target: String },
	Upload { name: String, bytes: Vec<u8>, is_final: bool },
	StartAsync { name: String, future: ParamsFuture, handler: String },
	CancelAsync { name: String, component: Option<ComponentId> },
	Completed { component: Option<ComponentId>, name: String, id: u64, output: TaskOutput },
	Disconnect,
}

impl Command {
	fn kind(&self) -> &'static str {
		match self {
			Command::Client(_) => "client",
			Command::Push(_) => "push",
			Command::StreamStart { .. } => "stream_start",
			Command::StreamToken { .. } => "stream_token",
			Command::StreamDone { .. } => "stream_done",
			Command::Upload { .. } => "upload",
			Command::StartAsync { .. } => "start_async",
			Command::CancelAsync { .. } => "cancel_async",
			Command::Completed { .. } => "completed",
			Command::Disconnect => "disconnect",
		}
	}
}

/// Queues work for a running session. Cheap to clone.
///
/// Every method fails with [`SessionError::ActorGone`] once the actor has stopped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
	commands: UnboundedSender<Command>,
}

impl SessionHandle {
	fn send(&self, command: Command) -> Result<(), SessionError> {
		self.commands.send(command).map_err(|_| SessionError::ActorGone)
	}

	/// Queues a decoded client message.
	///
	/// # Errors
	///
	/// Iff the actor has stopped.
	pub fn client_message(&self, message: ClientMessage) -> Result<(), SessionError> {
		self.send(Command::Client(message))
	}

	/// # Errors
	///
	/// Iff the actor has stopped.
	pub fn push(&self, push: ServerPush) -> Result<(), SessionError> {
		self.send(Command::Push(push))
	}

	/// # Errors
	///
	/// Iff the actor has stopped.
	pub fn stream_start(&self, target: impl Into<String>) -> Result<(), SessionError> {
		self.send(Command::StreamStart { target: target.into() })
	}

	/// # Errors
	///
	/// Iff the actor has stopped.
	pub fn stream_token(&self, target: impl Into<String>, data: impl Into<String>) -> Result<(), SessionError> {
		self.send(Command::StreamToken {
			target: target.into(),
			data: data.into(),
		})
	}

	/// # Errors
	///
	/// Iff the actor has stopped.
	pub fn stream_done(&self, target: impl Into<String>) -> Result<(), SessionError> {
		self.send(Command::StreamDone { target: target.into() })
	}

	/// # Errors
	///
	/// Iff the actor has stopped.
	pub fn upload(&self, name: impl Into<String>, bytes: Vec<u8>, is_final: bool) -> Result<(), SessionError> {
		self.send(Command::Upload {
			name: name.into(),
			bytes,
			is_final,
		})
	}

	/// Runs `future` in the background and hands its output to the root view's `handler`.
	///
	/// # Errors
	///
	/// Iff the actor has stopped.
	pub fn start_async<F>(&self, name: impl Into<String>, future: F, handler: impl Into<String>) -> Result<(), SessionError>
	where
		F: Future<Output = Params> + Send + 'static,
	{
		self.send(Command::StartAsync {
			name: name.into(),
			future: Box::pin(future),
			handler: handler.into(),
		})
	}

	/// Cancels a background task, aborting it if it already runs.
	///
	/// # Errors
	///
	/// Iff the actor has stopped.
	pub fn cancel_async(&self, name: impl Into<String>, component: Option<ComponentId>) -> Result<(), SessionError> {
		self.send(Command::CancelAsync { name: name.into(), component })
	}

	/// Disconnects the session. The actor stops after this turn.
	///
	/// # Errors
	///
	/// Iff the actor has stopped.
	pub fn disconnect(&self) -> Result<(), SessionError> {
		self.send(Command::Disconnect)
	}

	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.commands.is_closed()
	}
}

/// Spawns an actor for `session` that writes its messages to `outbound`.
///
/// The actor stops once every [`SessionHandle`] is dropped, after [`SessionHandle::disconnect`], or when `outbound` closes.
/// Its [`JoinHandle`] then yields the released session.
#[must_use]
pub fn spawn_session(session: Session, outbound: mpsc::Sender<ServerMessage>) -> (SessionHandle, JoinHandle<Session>) {
	let (commands, receiver) = mpsc::unbounded_channel();
	let weak = commands.downgrade();
	let actor = Actor {
		session,
		outbound,
		completions: weak,
		running: HashMap::new(),
	};
	(SessionHandle { commands }, tokio::spawn(actor.run(receiver)))
}

struct Actor {
	session: Session,
	outbound: mpsc::Sender<ServerMessage>,
	/// Weak, so that pending completions don't keep the actor alive on their own.
	completions: WeakUnboundedSender<Command>,
	running: HashMap<(Option<ComponentId>, String), (u64, JoinHandle<()>)>,
}

impl Actor {
	async fn run(mut self, mut commands: UnboundedReceiver<Command>) -> Session {
		debug!(session = self.session.id(), "Session actor started.");
		while let Some(command) = commands.recv().await {
			let disconnect = matches!(command, Command::Disconnect);
			let span = debug_span!("turn", session = self.session.id(), command = command.kind());
			let messages = span.in_scope(|| self.turn(command));

			let mut client_gone = false;
			for message in messages {
				if self.outbound.send(message).await.is_err() {
					client_gone = true;
					break;
				}
			}
			if client_gone {
				debug!(session = self.session.id(), "Outbound channel closed.");
				break;
			}

			self.spawn_scheduled();
			if disconnect || matches!(self.session.phase(), Phase::Disconnected | Phase::Closed) {
				break;
			}
		}

		for (_, (_, task)) in self.running.drain() {
			task.abort();
		}
		if !matches!(self.session.phase(), Phase::Disconnected | Phase::Closed) {
			self.session.disconnect();
		}
		debug!(session = self.session.id(), "Session actor stopped.");
		self.session
	}

	fn turn(&mut self, command: Command) -> Vec<ServerMessage> {
		let session = &mut self.session;
		let result = match command {
			Command::Client(message) => return session.handle_client_message(message),
			Command::Push(push) => session.server_push(push),
			Command::StreamStart { target } => session.stream_start(&target).map(|()| Vec::new()),
			Command::StreamToken { target, data } => session.stream_token(&target, &data),
			Command::StreamDone { target } => session.stream_done(&target).map(|()| Vec::new()),
			Command::Upload { name, bytes, is_final } => session.ingest_chunk(&name, &bytes, is_final),
			Command::StartAsync { name, future, handler } => session.start_async(&name, future, &handler).map(|()| Vec::new()),
			Command::CancelAsync { name, component } => {
				session.cancel_async(&name, component.as_ref());
				if let Some((_, task)) = self.running.remove(&(component, name)) {
					trace!("Aborting running task.");
					task.abort();
				}
				Ok(Vec::new())
			}
			Command::Completed { component, name, id, output } => {
				let key = (component, name);
				if self.running.get(&key).map_or(false, |(running, _)| *running == id) {
					self.running.remove(&key);
				}
				let (component, name) = key;
				session.complete_async(component, &name, id, output)
			}
			Command::Disconnect => {
				session.disconnect();
				Ok(Vec::new())
			}
		};
		result.unwrap_or_else(|error| vec![session.error_message(&error)])
	}

	fn spawn_scheduled(&mut self) {
		for task in self.session.take_scheduled() {
			let Some(completions) = self.completions.upgrade() else {
				return;
			};
			let ScheduledTask { component, name, id, future } = task;
			trace!(task = name.as_str(), id, "Spawning task.");
			let key = (component.clone(), name.clone());
			let handle = tokio::spawn(async move {
				let output = future.await;
				// The actor may be gone by now.
				let _ = completions.send(Command::Completed { component, name, id, output });
			});
			if let Some((_, replaced)) = self.running.insert(key, (id, handle)) {
				replaced.abort();
			}
		}
	}
}
