//! Observability for full-markup fallbacks.
//!
//! Every time a session sends full markup instead of patches, a [`FullHtmlUpdate`] is emitted
//! as a `tracing` event (target `live_dom::fallback`) and handed to each registered [`FallbackObserver`].

use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::info;

/// Size of the markup excerpts attached to `no_patches` events in `dangerous-logging` builds.
pub const SNIPPET_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
	/// No previous tree to diff against.
	FirstRender,
	/// An embedded component's message re-rendered its parent.
	ComponentEvent,
	/// An embedded child re-rendered on its own.
	EmbeddedChild,
	/// A render was requested but changed nothing.
	NoPatches,
	/// The patch list wasn't worth it compared to the full markup.
	PatchCompression,
	/// The trees can't be diffed, e.g. because the root element changed.
	DiffIncompatible,
}

impl FallbackReason {
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			FallbackReason::FirstRender => "first_render",
			FallbackReason::ComponentEvent => "component_event",
			FallbackReason::EmbeddedChild => "embedded_child",
			FallbackReason::NoPatches => "no_patches",
			FallbackReason::PatchCompression => "patch_compression",
			FallbackReason::DiffIncompatible => "diff_incompatible",
		}
	}
}

impl fmt::Display for FallbackReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FullHtmlUpdate {
	pub reason: FallbackReason,
	pub event_name: Option<String>,
	pub view_name: String,
	pub html_size: usize,
	pub previous_html_size: Option<usize>,
	pub patch_count: usize,
	pub version: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub html_snippet: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub previous_html_snippet: Option<String>,
}

/// Receives every [`FullHtmlUpdate`].
///
/// Implemented for matching closures.
pub trait FallbackObserver: Send + Sync {
	fn full_html_update(&self, update: &FullHtmlUpdate);
}

impl<F: Fn(&FullHtmlUpdate) + Send + Sync> FallbackObserver for F {
	fn full_html_update(&self, update: &FullHtmlUpdate) {
		self(update);
	}
}

pub(crate) fn emit(observers: &[Arc<dyn FallbackObserver>], update: &FullHtmlUpdate) {
	// Observers always get the event name. Logs only with `dangerous-logging`.
	let event_name = update.event_name.as_deref().filter(|_| cfg!(feature = "dangerous-logging"));
	info!(
		target: "live_dom::fallback",
		reason = update.reason.as_str(),
		event_name,
		view_name = update.view_name.as_str(),
		html_size = update.html_size,
		previous_html_size = update.previous_html_size,
		patch_count = update.patch_count,
		version = update.version,
		"Sending full markup instead of patches."
	);
	for observer in observers {
		observer.full_html_update(update);
	}
}

/// The first [`SNIPPET_LEN`] bytes of `html`, shortened to a character boundary.
#[must_use]
pub fn snippet(html: &str) -> String {
	let mut end = html.len().min(SNIPPET_LEN);
	while !html.is_char_boundary(end) {
		end -= 1;
	}
	html[..end].to_owned()
}
