//! Per-process configuration, passed explicitly to every session.

use crate::observe::FallbackObserver;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// Controls how much detail user-facing errors carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
	Development,
	#[default]
	Production,
}

/// When to send full markup although patches are available.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchCompression {
	/// Patch lists of at most this many patches are always sent as-is.
	pub patch_count_threshold: usize,
	/// Full markup wins if it is smaller than this fraction of the serialized patches.
	pub html_ratio: f64,
}

/// Only falls back for lists of more than 100 patches, and only when the markup is under 70% of their size.
/// Smaller patch lists are sent even if the markup would be shorter.
/// Use [`PatchCompression::by_size`] to fall back whenever the patches are larger than the full markup.
impl Default for PatchCompression {
	fn default() -> Self {
		Self {
			patch_count_threshold: 100,
			html_ratio: 0.7,
		}
	}
}

impl PatchCompression {
	/// Falls back whenever the full markup is smaller than the patches.
	#[must_use]
	pub fn by_size() -> Self {
		Self {
			patch_count_threshold: 0,
			html_ratio: 1.0,
		}
	}

	#[must_use]
	#[allow(clippy::cast_precision_loss)]
	pub fn prefers_html(&self, patch_count: usize, patch_bytes: usize, html_bytes: usize) -> bool {
		patch_count > self.patch_count_threshold && (html_bytes as f64) < patch_bytes as f64 * self.html_ratio
	}
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
	pub mode: Mode,
	pub patch_compression: PatchCompression,
	/// Module prefixes views may be mounted from, like `app.views`. Empty allows every registered view.
	pub allowed_modules: Vec<String>,
	/// Nesting limit for diffing and includes.
	pub max_render_depth: usize,
	#[serde(skip)]
	pub observers: Vec<Arc<dyn FallbackObserver>>,
}

impl Default for LiveConfig {
	fn default() -> Self {
		Self {
			mode: Mode::default(),
			patch_compression: PatchCompression::default(),
			allowed_modules: Vec::new(),
			max_render_depth: 256,
			observers: Vec::new(),
		}
	}
}

impl fmt::Debug for LiveConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LiveConfig")
			.field("mode", &self.mode)
			.field("patch_compression", &self.patch_compression)
			.field("allowed_modules", &self.allowed_modules)
			.field("max_render_depth", &self.max_render_depth)
			.field("observers", &self.observers.len())
			.finish()
	}
}

impl LiveConfig {
	#[must_use]
	pub fn development() -> Self {
		Self {
			mode: Mode::Development,
			..Self::default()
		}
	}

	#[must_use]
	pub fn with_observer(mut self, observer: Arc<dyn FallbackObserver>) -> Self {
		self.observers.push(observer);
		self
	}

	/// Whether a `module.path.ViewName` descriptor lies inside one of [`LiveConfig::allowed_modules`].
	#[must_use]
	pub fn allows_module(&self, descriptor: &str) -> bool {
		self.allowed_modules.is_empty()
			|| self.allowed_modules.iter().any(|prefix| {
				descriptor
					.strip_prefix(prefix.as_str())
					.map_or(false, |rest| rest.starts_with('.'))
			})
	}
}
