//! The bridge control task.
//!
//! # Architecture
//!
//! ```text
//! Bridge
//! ├── handle: BridgeHandle ──── mpsc ────┐   (any thread)
//! ├── task: BridgeActor (control task) ◄─┘
//! │   └── Router
//! │       ├── registry: PageRegistry
//! │       ├── channel: BackgroundChannel
//! │       └── services: HostServices
//! └── watchdog: one-shot readiness check
//! ```
//!
//! Host callbacks arrive on arbitrary threads. They never touch state
//! directly: each one becomes a [`BridgeCommand`] processed in order by the
//! actor. Notifications are fire-and-forget; lookups carry a oneshot
//! responder and come in async and blocking flavours.

pub mod bootstrap;
pub mod channel;
pub mod icons;
pub mod protocol;
pub mod registry;
pub mod router;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::host::{HostServices, PageHandle, WindowId};

pub use bootstrap::SetupRequest;
pub use channel::{BackgroundChannel, SendOutcome};
pub use protocol::{BackgroundMessage, ContentMessage, NativeEvent, TabId, ToolbarEvent};
pub use registry::{PageRegistry, PageSummary};
pub use router::Router;

/// Commands processed by the control task.
#[derive(Debug)]
pub enum BridgeCommand {
    /// Configure the background context.
    Setup {
        request: SetupRequest,
        respond_to: oneshot::Sender<BridgeResult<()>>,
    },

    /// Raw message from a content script.
    Content {
        page: PageHandle,
        name: String,
        body: Value,
    },

    /// Raw message from the background context on a named channel.
    Background { channel: String, body: Value },

    /// UI or lifecycle event from the host.
    Native(NativeEvent),

    /// Result of an active-page lookup started by a toolbar event.
    ToolbarResolved {
        event: ToolbarEvent,
        page: Option<PageHandle>,
    },

    PageToTabId {
        page: PageHandle,
        respond_to: oneshot::Sender<Option<TabId>>,
    },

    TabIdToPage {
        tab_id: TabId,
        respond_to: oneshot::Sender<Option<PageHandle>>,
    },

    Snapshot {
        respond_to: oneshot::Sender<BridgeSnapshot>,
    },

    /// Fired once by the watchdog.
    ReadyCheck,

    Shutdown,
}

/// Point-in-time view of bridge state, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeSnapshot {
    pub configured: bool,
    pub ready: bool,
    pub pending: usize,
    pub pages: Vec<PageSummary>,
}

/// Sole owner of registry and channel state.
pub struct BridgeActor {
    receiver: mpsc::UnboundedReceiver<BridgeCommand>,
    /// Lets host lookups post their answers back without keeping us alive.
    loopback: mpsc::WeakUnboundedSender<BridgeCommand>,
    router: Router,
    config: BridgeConfig,
    setup: Option<SetupRequest>,
}

impl BridgeActor {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<BridgeCommand>,
        loopback: mpsc::WeakUnboundedSender<BridgeCommand>,
        config: BridgeConfig,
        services: HostServices,
    ) -> Self {
        let router = Router::new(
            services,
            &config.background.entry_point,
            config.icons.overrides.clone(),
        );

        Self {
            receiver,
            loopback,
            router,
            config,
            setup: None,
        }
    }

    /// Process commands until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        info!("Bridge control task starting");

        while let Some(cmd) = self.receiver.recv().await {
            if !self.handle_command(cmd) {
                break;
            }
        }

        info!(
            "Bridge control task stopped (pages: {}, pending: {})",
            self.router.registry().len(),
            self.router.channel().pending_len()
        );
    }

    /// Returns false when the loop should stop.
    fn handle_command(&mut self, cmd: BridgeCommand) -> bool {
        match cmd {
            BridgeCommand::Setup {
                request,
                respond_to,
            } => {
                let result = self.handle_setup(request);
                // Ignore send error - caller may have given up waiting
                let _ = respond_to.send(result);
            }
            BridgeCommand::Content { page, name, body } => {
                self.router.route_content(page, &name, body);
            }
            BridgeCommand::Background { channel, body } => {
                self.router.route_background(&channel, body);
            }
            BridgeCommand::Native(event) => self.handle_native(event),
            BridgeCommand::ToolbarResolved { event, page } => {
                self.router.toolbar_event(event, page);
            }
            BridgeCommand::PageToTabId { page, respond_to } => {
                let _ = respond_to.send(self.router.registry().page_to_tab_id(page));
            }
            BridgeCommand::TabIdToPage { tab_id, respond_to } => {
                let _ = respond_to.send(self.router.registry().tab_id_to_page(tab_id));
            }
            BridgeCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
            BridgeCommand::ReadyCheck => {
                if !self.router.channel().is_ready() {
                    warn!(
                        "Background context not ready after {}s ({} message(s) waiting)",
                        self.config.background.ready_timeout_secs,
                        self.router.channel().pending_len()
                    );
                }
            }
            BridgeCommand::Shutdown => return false,
        }
        true
    }

    fn handle_setup(&mut self, request: SetupRequest) -> BridgeResult<()> {
        match &self.setup {
            Some(existing) if *existing == request => {
                debug!("Repeated setup for {}, ignoring", request.describe());
                Ok(())
            }
            Some(existing) => Err(BridgeError::ConflictingSetup {
                existing: existing.describe(),
                requested: request.describe(),
            }),
            None => {
                let services = self.router.services();
                let script =
                    bootstrap::build_script(&request, &self.config, services.bundle.as_ref())?;
                services.engine.execute(
                    script,
                    Box::new(|outcome| match outcome {
                        Ok(_) => debug!("Background bootstrap evaluated"),
                        Err(e) => warn!("Background bootstrap failed: {}", e),
                    }),
                );

                info!("Bridge configured for {}", request.describe());
                self.setup = Some(request);
                Ok(())
            }
        }
    }

    fn handle_native(&mut self, event: NativeEvent) {
        let (toolbar_event, window) = match event {
            NativeEvent::TabClosed { page } => {
                self.router.tab_closed(page);
                return;
            }
            NativeEvent::ToolbarClicked { window } => (ToolbarEvent::Clicked, window),
            NativeEvent::ToolbarNeedsUpdate { window } => (ToolbarEvent::NeedsUpdate, window),
        };

        let Some(loopback) = self.loopback.upgrade() else {
            return;
        };

        // The host answers on its own schedule; the answer re-enters the queue.
        self.router.services().windows.active_page(
            window,
            Box::new(move |page| {
                let _ = loopback.send(BridgeCommand::ToolbarResolved {
                    event: toolbar_event,
                    page,
                });
            }),
        );
    }

    fn snapshot(&self) -> BridgeSnapshot {
        BridgeSnapshot {
            configured: self.setup.is_some(),
            ready: self.router.channel().is_ready(),
            pending: self.router.channel().pending_len(),
            pages: self.router.registry().summaries(),
        }
    }
}

/// Cloneable, thread-safe entry point into a running bridge.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    tx: mpsc::UnboundedSender<BridgeCommand>,
}

impl BridgeHandle {
    fn submit(&self, cmd: BridgeCommand) -> BridgeResult<()> {
        self.tx.send(cmd).map_err(|_| BridgeError::Shutdown)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> BridgeCommand,
    ) -> BridgeResult<T> {
        let (respond_to, rx) = oneshot::channel();
        self.submit(make(respond_to))?;
        rx.await.map_err(|_| BridgeError::Shutdown)
    }

    /// Blocks the calling thread. Must not be called from inside the runtime.
    fn request_blocking<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> BridgeCommand,
    ) -> BridgeResult<T> {
        let (respond_to, rx) = oneshot::channel();
        self.submit(make(respond_to))?;
        rx.blocking_recv().map_err(|_| BridgeError::Shutdown)
    }

    /// Configure the background context. Repeating an identical request is
    /// harmless; a different one fails with [`BridgeError::ConflictingSetup`].
    pub async fn setup(&self, request: SetupRequest) -> BridgeResult<()> {
        self.request(|respond_to| BridgeCommand::Setup {
            request,
            respond_to,
        })
        .await?
    }

    pub fn setup_blocking(&self, request: SetupRequest) -> BridgeResult<()> {
        self.request_blocking(|respond_to| BridgeCommand::Setup {
            request,
            respond_to,
        })?
    }

    /// Hand a content-script message to the bridge.
    pub fn content_message(
        &self,
        page: PageHandle,
        name: impl Into<String>,
        body: Value,
    ) -> BridgeResult<()> {
        self.submit(BridgeCommand::Content {
            page,
            name: name.into(),
            body,
        })
    }

    /// Hand a background-context message to the bridge.
    pub fn background_message(&self, channel: impl Into<String>, body: Value) -> BridgeResult<()> {
        self.submit(BridgeCommand::Background {
            channel: channel.into(),
            body,
        })
    }

    pub fn native_event(&self, event: NativeEvent) -> BridgeResult<()> {
        self.submit(BridgeCommand::Native(event))
    }

    pub fn toolbar_clicked(&self, window: WindowId) -> BridgeResult<()> {
        self.native_event(NativeEvent::ToolbarClicked { window })
    }

    pub fn toolbar_needs_update(&self, window: WindowId) -> BridgeResult<()> {
        self.native_event(NativeEvent::ToolbarNeedsUpdate { window })
    }

    pub fn tab_closed(&self, page: PageHandle) -> BridgeResult<()> {
        self.native_event(NativeEvent::TabClosed { page })
    }

    pub async fn page_to_tab_id(&self, page: PageHandle) -> BridgeResult<Option<TabId>> {
        self.request(|respond_to| BridgeCommand::PageToTabId { page, respond_to })
            .await
    }

    pub fn page_to_tab_id_blocking(&self, page: PageHandle) -> BridgeResult<Option<TabId>> {
        self.request_blocking(|respond_to| BridgeCommand::PageToTabId { page, respond_to })
    }

    pub async fn tab_id_to_page(&self, tab_id: TabId) -> BridgeResult<Option<PageHandle>> {
        self.request(|respond_to| BridgeCommand::TabIdToPage { tab_id, respond_to })
            .await
    }

    pub fn tab_id_to_page_blocking(&self, tab_id: TabId) -> BridgeResult<Option<PageHandle>> {
        self.request_blocking(|respond_to| BridgeCommand::TabIdToPage { tab_id, respond_to })
    }

    pub async fn snapshot(&self) -> BridgeResult<BridgeSnapshot> {
        self.request(|respond_to| BridgeCommand::Snapshot { respond_to })
            .await
    }
}

/// A running bridge: the control task, its watchdog and a handle to both.
pub struct Bridge {
    handle: BridgeHandle,
    task: Option<JoinHandle<()>>,
    watchdog: JoinHandle<()>,
}

impl Bridge {
    /// Start the bridge on the current tokio runtime.
    pub fn start(config: BridgeConfig, services: HostServices) -> BridgeResult<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BridgeError::Config(format!("No tokio runtime available: {}", e)))?;
        Self::start_on(&runtime, config, services)
    }

    /// Start the bridge on an explicit runtime.
    pub fn start_on(
        runtime: &tokio::runtime::Handle,
        config: BridgeConfig,
        services: HostServices,
    ) -> BridgeResult<Self> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let ready_timeout = config.background.ready_timeout();
        let actor = BridgeActor::new(rx, tx.downgrade(), config, services);

        let task = runtime.spawn(actor.run());

        let watchdog_tx = tx.downgrade();
        let watchdog = runtime.spawn(async move {
            tokio::time::sleep(ready_timeout).await;
            if let Some(tx) = watchdog_tx.upgrade() {
                let _ = tx.send(BridgeCommand::ReadyCheck);
            }
        });

        Ok(Self {
            handle: BridgeHandle { tx },
            task: Some(task),
            watchdog,
        })
    }

    pub fn handle(&self) -> BridgeHandle {
        self.handle.clone()
    }

    /// Stop the control task after it drains the commands already queued.
    pub async fn shutdown(mut self) -> BridgeResult<()> {
        self.watchdog.abort();
        let _ = self.handle.submit(BridgeCommand::Shutdown);

        if let Some(task) = self.task.take() {
            task.await.map_err(|e| {
                BridgeError::Config(format!("Bridge control task panicked: {}", e))
            })?;
        }
        Ok(())
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.watchdog.abort();
        if self.task.is_some() {
            let _ = self.handle.submit(BridgeCommand::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManifestInfo;
    use crate::host::{Dispatch, RecordingHost};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Formatted log output collected for assertions.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::WARN)
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn start() -> (Arc<RecordingHost>, Bridge) {
        let host = Arc::new(RecordingHost::new());
        let mut config = BridgeConfig::default();
        config.background.entry_point = "dispatch".to_string();
        let bridge = Bridge::start(config, HostServices::recording(host.clone())).unwrap();
        (host, bridge)
    }

    fn setup_request(version: &str) -> SetupRequest {
        SetupRequest {
            base_uri: "ext://bridge/".to_string(),
            manifest: ManifestInfo {
                name: "Reader".to_string(),
                version: version.to_string(),
                id: "com.example.reader".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let (host, bridge) = start();
        let handle = bridge.handle();
        let p1 = PageHandle(100);

        handle
            .content_message(
                p1,
                "hello",
                json!({"tabId": null, "referrer": "", "historyLength": 1}),
            )
            .unwrap();
        assert_eq!(handle.page_to_tab_id(p1).await.unwrap(), Some(TabId(1)));

        handle
            .content_message(p1, "request", json!({"tabId": 1, "payload": {"q": 1}}))
            .unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.pending, 1);
        assert!(host.scripts().is_empty());

        handle
            .background_message("appex", json!({"type": "ready"}))
            .unwrap();
        handle
            .background_message(
                "content",
                json!({"tabId": 1, "eventName": "update", "payload": {"v": 2}}),
            )
            .unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.ready);
        assert_eq!(snapshot.pending, 0);
        assert_eq!(host.scripts(), vec![r#"dispatch({"q":1});"#]);
        assert_eq!(
            host.dispatches().last(),
            Some(&Dispatch {
                page: p1,
                name: "update".to_string(),
                payload: Some(json!({"v": 2})),
            })
        );

        bridge.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_setup_conflicts_are_rejected() {
        let (host, bridge) = start();
        let handle = bridge.handle();

        handle.setup(setup_request("1.0")).await.unwrap();
        handle.setup(setup_request("1.0")).await.unwrap();
        let err = handle.setup(setup_request("2.0")).await.unwrap_err();

        assert!(matches!(err, BridgeError::ConflictingSetup { .. }));
        // Bootstrap evaluated only once
        assert_eq!(host.scripts().len(), 1);
        assert!(handle.snapshot().await.unwrap().configured);
    }

    #[tokio::test]
    async fn test_toolbar_click_resolves_active_tab() {
        let (host, bridge) = start();
        let handle = bridge.handle();
        let page = PageHandle(8);
        host.set_active_page(WindowId(1), page);

        handle
            .content_message(page, "hello", json!({"tabId": 31, "referrer": "", "historyLength": 1}))
            .unwrap();
        handle.background_message("appex", json!({"type": "ready"})).unwrap();
        handle.toolbar_clicked(WindowId(1)).unwrap();
        handle.toolbar_needs_update(WindowId(2)).unwrap();

        // ToolbarResolved commands are queued behind the snapshot request
        // at most one hop later; a second round trip observes them.
        handle.snapshot().await.unwrap();
        handle.snapshot().await.unwrap();

        assert_eq!(
            host.scripts(),
            vec![
                r#"dispatch({"event":"toolbarItemClicked","tabId":31});"#,
                r#"dispatch({"event":"toolbarItemNeedsUpdate","tabId":null});"#,
            ]
        );
    }

    #[tokio::test]
    async fn test_tab_closed_releases_identity() {
        let (_host, bridge) = start();
        let handle = bridge.handle();

        handle
            .content_message(PageHandle(1), "hello", json!({"referrer": "", "historyLength": 1}))
            .unwrap();
        handle.tab_closed(PageHandle(1)).unwrap();

        assert_eq!(handle.page_to_tab_id(PageHandle(1)).await.unwrap(), None);
        assert_eq!(handle.tab_id_to_page(TabId(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_handle_fails_after_shutdown() {
        let (_host, bridge) = start();
        let handle = bridge.handle();
        bridge.shutdown().await.unwrap();

        assert!(matches!(
            handle.content_message(PageHandle(1), "alive", Value::Null),
            Err(BridgeError::Shutdown)
        ));
        assert!(matches!(
            handle.page_to_tab_id(PageHandle(1)).await,
            Err(BridgeError::Shutdown)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_does_not_disturb_channel() {
        let (host, bridge) = start();
        let handle = bridge.handle();
        handle
            .content_message(PageHandle(1), "alive", json!({"payload": {"a": 1}}))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert!(!snapshot.ready);
        assert_eq!(snapshot.pending, 1);
        assert!(host.scripts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_warns_while_not_ready() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();
        let (_host, bridge) = start();
        let handle = bridge.handle();
        handle
            .content_message(PageHandle(1), "alive", json!({"payload": {"a": 1}}))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.snapshot().await.unwrap();
        assert!(!logs.contents().contains("not ready"));

        tokio::time::sleep(Duration::from_secs(6)).await;
        handle.snapshot().await.unwrap();
        let output = logs.contents();
        assert!(output.contains("Background context not ready after 10s"));
        assert!(output.contains("1 message(s) waiting"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_is_silent_once_ready() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();
        let (_host, bridge) = start();
        let handle = bridge.handle();
        handle
            .background_message("appex", json!({"type": "ready"}))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        let snapshot = handle.snapshot().await.unwrap();

        assert!(snapshot.ready);
        assert!(!logs.contents().contains("not ready"));
    }

    #[test]
    fn test_blocking_lookups_from_host_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let host = Arc::new(RecordingHost::new());
        let bridge = Bridge::start_on(
            runtime.handle(),
            BridgeConfig::default(),
            HostServices::recording(host),
        )
        .unwrap();
        let handle = bridge.handle();

        let worker = std::thread::spawn(move || {
            handle
                .content_message(
                    PageHandle(4),
                    "hello",
                    json!({"tabId": 9, "referrer": "", "historyLength": 1}),
                )
                .unwrap();
            (
                handle.page_to_tab_id_blocking(PageHandle(4)).unwrap(),
                handle.tab_id_to_page_blocking(TabId(9)).unwrap(),
            )
        });

        let (tab_id, page) = worker.join().unwrap();
        assert_eq!(tab_id, Some(TabId(9)));
        assert_eq!(page, Some(PageHandle(4)));
        drop(bridge);
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let host = Arc::new(RecordingHost::new());
        let result = Bridge::start(BridgeConfig::default(), HostServices::recording(host));
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }
}
