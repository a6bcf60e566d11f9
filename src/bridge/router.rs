//! Message classification and routing.
//!
//! The router owns the page registry and the background channel and is only
//! ever driven from the bridge control task. Every inbound message is decoded
//! once, applied to the registry, then forwarded to its destination.
//! Problems with a single message are logged and that message is dropped.

use serde_json::{json, Value};

use crate::config::IconOverride;
use crate::host::{HostServices, PageHandle};

use super::channel::BackgroundChannel;
use super::icons::select_icon;
use super::protocol::{
    AppexControl, BackgroundMessage, ContentEvent, ContentMessage, DecodeError, IconPaths, TabId,
    ToolbarEvent,
};
use super::registry::{PageRegistry, TouchOutcome};

/// Name of the reply telling a content script which tab id it owns.
pub const FORCE_TAB_ID: &str = "forceTabId";

pub struct Router {
    registry: PageRegistry,
    channel: BackgroundChannel,
    services: HostServices,
    icon_overrides: Vec<IconOverride>,
}

impl Router {
    pub fn new(services: HostServices, entry_point: &str, icon_overrides: Vec<IconOverride>) -> Self {
        let channel = BackgroundChannel::new(services.engine.clone(), entry_point);
        Self {
            registry: PageRegistry::new(),
            channel,
            services,
            icon_overrides,
        }
    }

    pub fn registry(&self) -> &PageRegistry {
        &self.registry
    }

    pub fn channel(&self) -> &BackgroundChannel {
        &self.channel
    }

    pub fn services(&self) -> &HostServices {
        &self.services
    }

    // ─────────────────────────────────────────────────────────────────────
    // Content scripts
    // ─────────────────────────────────────────────────────────────────────

    /// Decode and route a raw message from a content script.
    pub fn route_content(&mut self, page: PageHandle, name: &str, body: Value) {
        match ContentMessage::decode(name, body) {
            Ok(message) => {
                tracing::trace!("{} from {}", message.name(), page);
                self.handle_content(page, message)
            }
            Err(DecodeError::UnknownMessage(name)) => {
                tracing::error!("Unknown message '{}' from {}, dropping", name, page);
            }
            Err(e) => tracing::warn!("Dropping message from {}: {}", page, e),
        }
    }

    pub fn handle_content(&mut self, page: PageHandle, message: ContentMessage) {
        match message {
            ContentMessage::Hello(hello) => {
                let tab_id = self.registry.hello(
                    page,
                    hello.tab_id,
                    &hello.referrer,
                    hello.history_length,
                );
                tracing::debug!("hello from {} bound to {}", page, tab_id);

                if let Some(payload) = hello.payload {
                    self.channel.send(&with_tab_id(payload, tab_id));
                }

                let reply = json!({ "tabId": tab_id });
                self.services.pages.dispatch(page, FORCE_TAB_ID, Some(&reply));
            }
            ContentMessage::Alive(activity) | ContentMessage::Request(activity) => {
                if let Some(tab_id) = activity.tab_id {
                    self.touch(page, tab_id);
                }
                if let Some(payload) = activity.payload {
                    self.channel.send(&payload);
                }
            }
            ContentMessage::Bye(bye) => {
                if !self.registry.bye(page, &bye.url, bye.history_length) {
                    tracing::debug!("bye from unregistered {}", page);
                }
                if let Some(tab_id) = bye.tab_id {
                    self.touch(page, tab_id);
                }
                if let Some(payload) = bye.payload {
                    self.channel.send(&payload);
                }
            }
        }
    }

    fn touch(&mut self, page: PageHandle, tab_id: TabId) {
        match self.registry.touch(page, tab_id) {
            TouchOutcome::Touched => {}
            TouchOutcome::Mismatch { bound } => tracing::warn!(
                "{} reported {} but is registered as {}",
                page,
                tab_id,
                bound
            ),
            TouchOutcome::UnknownPage => {
                tracing::warn!("{} reported {} before saying hello", page, tab_id)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Background context
    // ─────────────────────────────────────────────────────────────────────

    /// Decode and route a raw message from the background context.
    pub fn route_background(&mut self, channel: &str, body: Value) {
        match BackgroundMessage::decode(channel, body) {
            Ok(message) => self.handle_background(message),
            Err(DecodeError::UnknownMessage(name)) => {
                tracing::error!("Unknown background channel '{}', dropping", name);
            }
            Err(e) => tracing::warn!("Dropping background message: {}", e),
        }
    }

    pub fn handle_background(&mut self, message: BackgroundMessage) {
        match message {
            BackgroundMessage::Log { level, message } => {
                self.services.log_sink.log(level, &message);
            }
            BackgroundMessage::Content(event) => self.deliver_content_event(event),
            BackgroundMessage::Appex(AppexControl::Ready) => {
                self.channel.on_ready();
            }
            BackgroundMessage::Appex(AppexControl::SetIconTitle { title }) => {
                self.services.toolbar.set_title(&title);
            }
            BackgroundMessage::Appex(AppexControl::SetIcon { path }) => self.set_icon(&path),
        }
    }

    fn deliver_content_event(&mut self, event: ContentEvent) {
        let Some(page) = self.registry.tab_id_to_page(event.tab_id) else {
            // Tab closed while the event was in flight.
            tracing::debug!("No page for {}, dropping '{}'", event.tab_id, event.event_name);
            return;
        };

        self.services
            .pages
            .dispatch(page, &event.event_name, event.payload.as_ref());
    }

    fn set_icon(&mut self, paths: &IconPaths) {
        let Some(resource) = select_icon(paths, &self.icon_overrides) else {
            tracing::warn!("setIcon without any icon paths");
            return;
        };

        match self.services.bundle.resource_path(&resource) {
            Some(path) => self.services.toolbar.set_icon(&path),
            None => tracing::warn!("Icon resource '{}' not found in bundle", resource),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Native host events
    // ─────────────────────────────────────────────────────────────────────

    /// Report a toolbar event for the page active when it happened.
    pub fn toolbar_event(&mut self, event: ToolbarEvent, page: Option<PageHandle>) {
        let tab_id = page.and_then(|page| self.registry.page_to_tab_id(page));
        if tab_id.is_none() {
            tracing::debug!("{} with no registered active tab", event.event_name());
        }

        self.channel.send(&json!({
            "event": event.event_name(),
            "tabId": tab_id,
        }));
    }

    /// The host closed the tab showing `page`.
    pub fn tab_closed(&mut self, page: PageHandle) -> Option<TabId> {
        let closed = self.registry.close(page);
        if let Some(tab_id) = closed {
            tracing::debug!("{} closed, released {}", page, tab_id);
        }
        closed
    }

    /// Notify the channel that the background context is ready. Used by
    /// hosts that learn about readiness out of band.
    pub fn mark_ready(&mut self) -> usize {
        self.channel.on_ready()
    }
}

fn with_tab_id(payload: Value, tab_id: TabId) -> Value {
    match payload {
        Value::Object(mut map) => {
            map.insert("tabId".to_string(), json!(tab_id));
            Value::Object(map)
        }
        other => other,
    }
}
