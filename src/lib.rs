//! tabrelay - message bridge for hosted browser extensions.
//!
//! tabrelay connects per-tab content scripts, a single hidden background
//! script context and native toolbar events so they behave like one
//! extension runtime. It keeps tab identities stable across navigations and
//! holds outbound traffic until the background context reports ready.
//!
//! # Architecture
//!
//! The library is organized into these main modules:
//!
//! - [`bridge`] - Control task, page registry, background channel and router
//! - [`host`] - Traits for the engine, pages, toolbar and bundle the bridge drives
//! - [`config`] - Configuration loading and validation
//! - [`cli`] - Developer tooling (`tabrelay replay`)
//!
//! # Example
//!
//! ```ignore
//! use tabrelay::{Bridge, BridgeConfig, HostServices};
//!
//! let bridge = Bridge::start(BridgeConfig::load(), services)?;
//! let handle = bridge.handle();
//!
//! // From any host thread:
//! handle.content_message(page, "hello", body)?;
//! let tab_id = handle.page_to_tab_id_blocking(page)?;
//! ```

pub mod bridge;
pub mod cli;
pub mod config;
pub mod host;

mod error;

pub use bridge::{Bridge, BridgeHandle, BridgeSnapshot, SetupRequest, TabId};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use host::{HostServices, PageHandle, WindowId};
