//! JSON message shapes exchanged with the client.

use crate::{observe::FallbackReason, patch::Patch, value::Value, view::{ComponentId, Params}};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
	Mount {
		view: String,
		#[serde(default)]
		params: Params,
	},
	Event {
		event: String,
		#[serde(default)]
		params: Params,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		component_id: Option<ComponentId>,
	},
	RequestHtml,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
	Mount {
		html: String,
	},
	Patches {
		patches: Vec<Patch>,
		version: u64,
	},
	HtmlUpdate {
		html: String,
		version: u64,
		reason: FallbackReason,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		component_id: Option<ComponentId>,
	},
	HtmlRecovery {
		html: String,
		version: u64,
	},
	ClientPushEvent {
		event: String,
		payload: Value,
	},
	Error {
		error: String,
	},
}
