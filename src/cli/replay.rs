//! `tabrelay replay`: drive a bridge from a recorded transcript.
//!
//! Each non-empty line of the transcript is one JSON event:
//!
//! ```text
//! {"from": "setup", "baseUri": "ext://reader/"}
//! {"from": "content", "page": 1, "name": "hello", "body": {"referrer": "", "historyLength": 1}}
//! {"from": "background", "channel": "appex", "body": {"type": "ready"}}
//! {"from": "native", "event": {"type": "toolbarClicked", "window": 1}}
//! {"from": "activePage", "window": 1, "page": 1}
//! ```
//!
//! Lines starting with `#` are comments. When the transcript ends, a JSON
//! report of everything the host collaborators received is printed.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bridge::{Bridge, BridgeSnapshot, NativeEvent, SetupRequest};
use crate::config::BridgeConfig;
use crate::host::{
    DirectoryBundle, Dispatch, HostServices, PageHandle, RecordingHost, ScriptLog, WindowId,
};

/// One line of a transcript.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "from", rename_all = "camelCase")]
pub enum TranscriptEvent {
    #[serde(rename_all = "camelCase")]
    Setup { base_uri: String },
    Content {
        page: PageHandle,
        name: String,
        #[serde(default)]
        body: Value,
    },
    Background {
        channel: String,
        #[serde(default)]
        body: Value,
    },
    Native { event: NativeEvent },
    ActivePage { window: WindowId, page: PageHandle },
}

/// Everything the recording host saw during a replay.
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub snapshot: BridgeSnapshot,
    pub scripts: Vec<String>,
    pub dispatches: Vec<Dispatch>,
    pub titles: Vec<String>,
    pub icons: Vec<String>,
    pub logs: Vec<ScriptLog>,
}

/// Parse a transcript, skipping blank lines and comments.
pub fn parse_transcript(reader: impl Read) -> Result<Vec<TranscriptEvent>> {
    let mut events = Vec::new();
    for (index, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.context("Failed to read transcript")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let event = serde_json::from_str(trimmed)
            .with_context(|| format!("Invalid transcript event on line {}", index + 1))?;
        events.push(event);
    }
    Ok(events)
}

/// Run `events` through a fresh bridge and report what the host received.
pub async fn replay(
    events: Vec<TranscriptEvent>,
    config: BridgeConfig,
    bundle_dir: Option<&Path>,
) -> Result<ReplayReport> {
    let host = Arc::new(RecordingHost::new());
    let mut services = HostServices::recording(host.clone());
    services.log_sink = host.clone();
    if let Some(dir) = bundle_dir {
        services.bundle = Arc::new(DirectoryBundle::new(dir));
    }

    let manifest = config.extension.clone();
    let bridge = Bridge::start(config, services)?;
    let handle = bridge.handle();

    for event in events {
        match event {
            TranscriptEvent::Setup { base_uri } => {
                handle
                    .setup(SetupRequest {
                        base_uri,
                        manifest: manifest.clone(),
                    })
                    .await?;
            }
            TranscriptEvent::Content { page, name, body } => {
                handle.content_message(page, name, body)?;
            }
            TranscriptEvent::Background { channel, body } => {
                handle.background_message(channel, body)?;
            }
            TranscriptEvent::Native { event } => handle.native_event(event)?,
            TranscriptEvent::ActivePage { window, page } => host.set_active_page(window, page),
        }
    }

    // Two round trips: the first lets pending toolbar lookups post their
    // answers, the second waits for those answers to be routed.
    handle.snapshot().await?;
    let snapshot = handle.snapshot().await?;
    bridge.shutdown().await?;

    Ok(ReplayReport {
        snapshot,
        scripts: host.scripts(),
        dispatches: host.dispatches(),
        titles: host.titles(),
        icons: host
            .icons()
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        logs: host.logs(),
    })
}

/// Entry point for `tabrelay replay`.
pub async fn run_replay(
    transcript: &str,
    config: BridgeConfig,
    bundle_dir: Option<&Path>,
) -> Result<()> {
    let events = if transcript == "-" {
        parse_transcript(std::io::stdin().lock())?
    } else {
        let file = std::fs::File::open(transcript)
            .with_context(|| format!("Transcript not found: {}", transcript))?;
        parse_transcript(file)?
    };

    tracing::info!("Replaying {} event(s)", events.len());
    let report = replay(events, config, bundle_dir).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
