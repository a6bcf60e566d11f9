//! Host abstraction layer.
//!
//! This module defines the traits the bridge uses to reach everything it
//! does not own: the background script engine, content-script pages, the
//! toolbar widget, window/tab lookups and bundle resources. Keeping them
//! behind traits lets the routing core run against in-memory fakes.
//!
//! Implementations may be called from the bridge control task only, but
//! their callbacks (`CompletionCallback`, `PageLookupCallback`) may fire on
//! any thread.

mod bundle;
mod recording;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bridge::protocol::ScriptLogLevel;

pub use bundle::DirectoryBundle;
pub use recording::{Dispatch, RecordingHost, ScriptLog};

/// Opaque handle to one tab/frame's content-script instance.
///
/// The host chooses the value; the bridge only compares and hashes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageHandle(pub u64);

/// Host window identifier used by toolbar events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl std::fmt::Display for PageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page#{}", self.0)
    }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "window#{}", self.0)
    }
}

/// Result of evaluating a script in the background context.
pub type ExecOutcome = Result<Value, String>;

/// Invoked once when a background evaluation finishes, on any thread.
pub type CompletionCallback = Box<dyn FnOnce(ExecOutcome) + Send + 'static>;

/// Invoked once with the active page of a window, on any thread.
pub type PageLookupCallback = Box<dyn FnOnce(Option<PageHandle>) + Send + 'static>;

/// The hidden background script context.
pub trait BackgroundEngine: Send + Sync {
    /// Queue `script` for evaluation. Scripts must be evaluated in the
    /// order this method is called.
    fn execute(&self, script: String, on_complete: CompletionCallback);
}

/// Delivers named messages to content scripts.
pub trait PageMessenger: Send + Sync {
    fn dispatch(&self, page: PageHandle, name: &str, payload: Option<&Value>);
}

/// The extension's toolbar item.
pub trait Toolbar: Send + Sync {
    fn set_title(&self, title: &str);
    fn set_icon(&self, path: &Path);
}

/// Resolves which page is showing in a window's active tab.
pub trait WindowLookup: Send + Sync {
    fn active_page(&self, window: WindowId, reply: PageLookupCallback);
}

/// Read-only access to files shipped with the extension.
pub trait ResourceBundle: Send + Sync {
    /// Text contents of a resource, or `None` if it is not in the bundle.
    fn read_text(&self, name: &str) -> Option<String>;

    /// Filesystem location of a resource, or `None` if it is not in the bundle.
    fn resource_path(&self, name: &str) -> Option<PathBuf>;
}

/// Receives `log` messages emitted by background scripts.
pub trait LogSink: Send + Sync {
    fn log(&self, level: ScriptLogLevel, message: &str);
}

/// Default sink: background logs become tracing events with target `background`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, level: ScriptLogLevel, message: &str) {
        match level {
            ScriptLogLevel::Debug => tracing::debug!(target: "background", "{}", message),
            ScriptLogLevel::Info => tracing::info!(target: "background", "{}", message),
            ScriptLogLevel::Warn => tracing::warn!(target: "background", "{}", message),
            ScriptLogLevel::Error => tracing::error!(target: "background", "{}", message),
        }
    }
}

/// Everything the bridge needs from its host.
#[derive(Clone)]
pub struct HostServices {
    pub engine: Arc<dyn BackgroundEngine>,
    pub pages: Arc<dyn PageMessenger>,
    pub toolbar: Arc<dyn Toolbar>,
    pub windows: Arc<dyn WindowLookup>,
    pub bundle: Arc<dyn ResourceBundle>,
    pub log_sink: Arc<dyn LogSink>,
}

impl HostServices {
    /// Wire every collaborator to the same recording host, with background
    /// logs going to tracing.
    pub fn recording(host: Arc<RecordingHost>) -> Self {
        Self {
            engine: host.clone(),
            pages: host.clone(),
            toolbar: host.clone(),
            windows: host.clone(),
            bundle: host,
            log_sink: Arc::new(TracingLogSink),
        }
    }
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}
