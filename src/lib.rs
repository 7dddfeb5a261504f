#![doc(html_root_url = "https://docs.rs/live-dom/0.0.3")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
//! Server-driven live DOM sessions.
//!
//! A [`LiveView`] is rendered through its [`Template`] to markup, loaded into a [`Node`] tree and diffed against the previous render.
//! The resulting [`Patch`]es (or the full markup, where patches wouldn't do) go to the connected client as [`ServerMessage`]s.
//!
//! [`Session`] is the synchronous per-connection state machine. [`spawn_session`] runs one as a tokio task.
//!
//! # Features
//!
//! - `dangerous-logging`: Logs may contain page content and event names. Fallback reports then include markup snippets.
//! - `log-paths`: Logs VDOM paths in diff trace events, which is expensive.

pub mod actor;
pub mod config;
pub mod diff;
pub mod error;
pub mod expr;
pub mod load;
pub mod node;
pub mod observe;
pub mod patch;
pub mod protocol;
pub mod render;
pub mod session;
pub mod template;
pub mod value;
pub mod view;

pub use actor::{spawn_session, SessionHandle};
pub use config::{LiveConfig, Mode, PatchCompression};
pub use diff::{diff, DiffIncompatible, Differ};
pub use error::{HandlerError, MountError, SessionError};
pub use load::{load_fragment, load_root, LoadError};
pub use node::{Node, NodeKind, Tree};
pub use observe::{FallbackObserver, FallbackReason, FullHtmlUpdate};
pub use patch::Patch;
pub use protocol::{ClientMessage, ServerMessage};
pub use render::{render, RenderError, Renderer};
pub use session::{Phase, RecoveryCache, ServerPush, Session};
pub use template::{Template, TemplateError, TemplateSet};
pub use value::{Context, Map, Value};
pub use view::{param, ComponentId, Effects, Handlers, LiveView, Params, ScheduledTask, UploadSink, ViewError, ViewRegistry};
