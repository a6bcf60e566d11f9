//! In-memory host that records every call the bridge makes.
//!
//! Used by the `replay` command and by tests in place of a real browser.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;

use crate::bridge::protocol::ScriptLogLevel;

use super::{
    BackgroundEngine, CompletionCallback, LogSink, PageHandle, PageLookupCallback, PageMessenger,
    ResourceBundle, Toolbar, WindowId, WindowLookup,
};

/// A message delivered to a content script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dispatch {
    pub page: PageHandle,
    pub name: String,
    pub payload: Option<Value>,
}

/// A `log` message received from the background context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptLog {
    pub level: ScriptLogLevel,
    pub message: String,
}

#[derive(Default)]
struct Recorded {
    scripts: Vec<String>,
    dispatches: Vec<Dispatch>,
    titles: Vec<String>,
    icons: Vec<PathBuf>,
    logs: Vec<ScriptLog>,
    active_pages: HashMap<WindowId, PageHandle>,
    resources: HashMap<String, String>,
    fail_scripts: bool,
}

/// Recording implementation of every host trait.
#[derive(Default)]
pub struct RecordingHost {
    inner: Mutex<Recorded>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a text resource to the in-memory bundle.
    pub fn add_resource(&self, name: impl Into<String>, text: impl Into<String>) {
        self.lock().resources.insert(name.into(), text.into());
    }

    /// Make `page` the active page of `window`.
    pub fn set_active_page(&self, window: WindowId, page: PageHandle) {
        self.lock().active_pages.insert(window, page);
    }

    /// Make every subsequent script evaluation report failure.
    pub fn fail_scripts(&self, fail: bool) {
        self.lock().fail_scripts = fail;
    }

    pub fn scripts(&self) -> Vec<String> {
        self.lock().scripts.clone()
    }

    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.lock().dispatches.clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.lock().titles.clone()
    }

    pub fn icons(&self) -> Vec<PathBuf> {
        self.lock().icons.clone()
    }

    pub fn logs(&self) -> Vec<ScriptLog> {
        self.lock().logs.clone()
    }
}

impl BackgroundEngine for RecordingHost {
    fn execute(&self, script: String, on_complete: CompletionCallback) {
        let fail = {
            let mut inner = self.lock();
            inner.scripts.push(script);
            inner.fail_scripts
        };

        if fail {
            on_complete(Err("evaluation failed".to_string()));
        } else {
            on_complete(Ok(Value::Null));
        }
    }
}

impl PageMessenger for RecordingHost {
    fn dispatch(&self, page: PageHandle, name: &str, payload: Option<&Value>) {
        self.lock().dispatches.push(Dispatch {
            page,
            name: name.to_string(),
            payload: payload.cloned(),
        });
    }
}

impl Toolbar for RecordingHost {
    fn set_title(&self, title: &str) {
        self.lock().titles.push(title.to_string());
    }

    fn set_icon(&self, path: &Path) {
        self.lock().icons.push(path.to_path_buf());
    }
}

impl WindowLookup for RecordingHost {
    fn active_page(&self, window: WindowId, reply: PageLookupCallback) {
        let page = self.lock().active_pages.get(&window).copied();
        reply(page);
    }
}

impl ResourceBundle for RecordingHost {
    fn read_text(&self, name: &str) -> Option<String> {
        self.lock().resources.get(name).cloned()
    }

    fn resource_path(&self, name: &str) -> Option<PathBuf> {
        self.lock()
            .resources
            .contains_key(name)
            .then(|| PathBuf::from("bundle").join(name))
    }
}

impl LogSink for RecordingHost {
    fn log(&self, level: ScriptLogLevel, message: &str) {
        self.lock().logs.push(ScriptLog {
            level,
            message: message.to_string(),
        });
    }
}
