use crate::{
	config::Mode,
	load::LoadError,
	render::RenderError,
	session::Phase,
	template::TemplateError,
	view::{ComponentId, ViewError},
};
use thiserror::Error;

/// Returned by view code: mounts and event handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
	#[error("missing parameter {0:?}")]
	MissingParam(String),
	#[error("invalid parameter {name:?}: {reason}")]
	InvalidParam { name: String, reason: String },
	#[error("{0}")]
	Failed(String),
	#[error(transparent)]
	View(#[from] ViewError),
	#[error(transparent)]
	State(#[from] serde_json::Error),
}

/// Why a mount attempt was rejected. Mount failures never leave a partially mounted session behind.
#[derive(Debug, Error)]
pub enum MountError {
	#[error("invalid view descriptor {0:?}")]
	InvalidDescriptor(String),
	#[error("view {0} is not in allowed modules")]
	NotAllowed(String),
	#[error("{0} is not a registered live view")]
	UnknownView(String),
	#[error("failed to mount {view}: {source}")]
	Init {
		view: String,
		#[source]
		source: HandlerError,
	},
}

#[derive(Debug, Error)]
pub enum SessionError {
	#[error("no view is mounted")]
	NotMounted,
	#[error("a view is already mounted")]
	AlreadyMounted,
	#[error("session is {0}")]
	Terminated(Phase),
	#[error(transparent)]
	Mount(#[from] MountError),
	#[error("no handler found for event {event:?} on {view}")]
	HandlerNotFound {
		view: String,
		event: String,
		/// Close matches among the registered handlers. Only filled in development mode.
		suggestions: Vec<String>,
	},
	#[error("handler {event:?} failed: {source}")]
	Handler {
		event: String,
		#[source]
		source: HandlerError,
	},
	#[error("no recovery HTML available")]
	RecoveryUnavailable,
	#[error(transparent)]
	Template(#[from] TemplateError),
	#[error(transparent)]
	Render(#[from] RenderError),
	#[error(transparent)]
	Load(#[from] LoadError),
	#[error("unknown component {0}")]
	UnknownComponent(ComponentId),
	#[error("no streaming target {0:?} in the current tree")]
	UnknownStreamTarget(String),
	#[error("stream {0:?} is not open")]
	StreamNotOpen(String),
	#[error("{view} has no {capability} capability")]
	CapabilityMissing { view: String, capability: &'static str },
	#[error("invalid view state: {0}")]
	State(#[from] serde_json::Error),
	#[error("session actor has stopped")]
	ActorGone,
}

impl SessionError {
	/// The variant's name, for logs that mustn't carry any details.
	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			SessionError::NotMounted => "not_mounted",
			SessionError::AlreadyMounted => "already_mounted",
			SessionError::Terminated(_) => "terminated",
			SessionError::Mount(_) => "mount",
			SessionError::HandlerNotFound { .. } => "handler_not_found",
			SessionError::Handler { .. } => "handler",
			SessionError::RecoveryUnavailable => "recovery_unavailable",
			SessionError::Template(_) => "template",
			SessionError::Render(_) => "render",
			SessionError::Load(_) => "load",
			SessionError::UnknownComponent(_) => "unknown_component",
			SessionError::UnknownStreamTarget(_) => "unknown_stream_target",
			SessionError::StreamNotOpen(_) => "stream_not_open",
			SessionError::CapabilityMissing { .. } => "capability_missing",
			SessionError::State(_) => "state",
			SessionError::ActorGone => "actor_gone",
		}
	}

	/// Text to send to the client.
	///
	/// In [`Mode::Production`], this never names handlers, views or template details beyond what the client sent.
	#[must_use]
	pub fn client_message(&self, mode: Mode) -> String {
		match (self, mode) {
			(SessionError::HandlerNotFound { event, suggestions, .. }, Mode::Development) => {
				let mut message = format!("No handler found for event: {}", event);
				if !suggestions.is_empty() {
					message.push_str(&format!(". Did you mean: {}?", suggestions.join(", ")));
				}
				message
			}
			(SessionError::HandlerNotFound { event, .. }, Mode::Production) => format!("No handler found for event: {}", event),
			(SessionError::RecoveryUnavailable, _) | (_, Mode::Development) => self.to_string(),
			(SessionError::Mount(MountError::Init { .. }), Mode::Production) => "Failed to mount view".to_owned(),
			(SessionError::Mount(_), Mode::Production) => "View not found".to_owned(),
			(SessionError::NotMounted | SessionError::AlreadyMounted | SessionError::Terminated(_), Mode::Production) => self.to_string(),
			(_, Mode::Production) => "An error occurred while processing your request".to_owned(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn production_messages_are_generic() {
		let not_allowed = SessionError::Mount(MountError::NotAllowed("os.system".to_owned()));
		assert_eq!(not_allowed.client_message(Mode::Production), "View not found");
		assert_eq!(not_allowed.client_message(Mode::Development), "view os.system is not in allowed modules");

		let handler = SessionError::Handler {
			event: "save".to_owned(),
			source: HandlerError::Failed("database at 10.0.0.3 is down".to_owned()),
		};
		assert!(!handler.client_message(Mode::Production).contains("10.0.0.3"));
		assert!(handler.client_message(Mode::Development).contains("10.0.0.3"));
	}

	#[test]
	fn handler_not_found_suggestions_only_in_development() {
		let error = SessionError::HandlerNotFound {
			view: "app.views.Counter".to_owned(),
			event: "incremnt".to_owned(),
			suggestions: vec!["increment".to_owned()],
		};
		assert_eq!(error.client_message(Mode::Production), "No handler found for event: incremnt");
		assert_eq!(error.client_message(Mode::Development), "No handler found for event: incremnt. Did you mean: increment?");
	}

	#[test]
	fn kinds_carry_no_details() {
		let error = SessionError::Mount(MountError::NotAllowed("os.system".to_owned()));
		assert_eq!(error.kind(), "mount");
		let error = SessionError::HandlerNotFound {
			view: "app.views.Counter".to_owned(),
			event: "secret_admin_action".to_owned(),
			suggestions: Vec::new(),
		};
		assert_eq!(error.kind(), "handler_not_found");
	}

	#[test]
	fn recovery_message_is_stable() {
		for mode in [Mode::Development, Mode::Production] {
			assert_eq!(SessionError::RecoveryUnavailable.client_message(mode), "no recovery HTML available");
		}
	}
}
