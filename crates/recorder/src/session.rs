//! Recording session lifecycle.
//!
//! Drives the remote debug controller through initialize → enable state
//! reports → navigate → record, buffers the latest generated source from
//! `sourceChanged` events, and returns the buffer on stop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{RecorderError, Result};
use crate::rpc::channel::{ChannelConfig, RpcChannel};
use crate::rpc::protocol::{RecorderMode, SourceChangedEvent};
use crate::server::{launch, LaunchConfig};

/// Codegen flavor requested from the engine.
const CODEGEN_ID: &str = "playwright-test";
const SDK_LANGUAGE: &str = "javascript";

/// Options for one recording cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordOptions {
    /// URL the recording browser navigates to before the recorder is armed.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// The latest generated source observed from the recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSource {
    pub text: String,
    pub header: String,
    pub footer: String,
    pub actions: Vec<String>,
}

impl From<SourceChangedEvent> for GeneratedSource {
    fn from(event: SourceChangedEvent) -> Self {
        Self {
            text: event.text,
            header: event.header,
            footer: event.footer,
            actions: event.actions,
        }
    }
}

/// Per-cycle state. Built fresh on every start, dropped on stop.
struct ActiveRecording {
    channel: Arc<RpcChannel>,
    source: Arc<Mutex<Option<GeneratedSource>>>,
    listener: JoinHandle<()>,
}

/// Two-phase start/stop recording session.
///
/// At most one cycle is active at a time; start and stop are serialized by
/// the async mutex, so overlapping calls cannot race on shared state.
pub struct RecordingSession {
    launch_config: LaunchConfig,
    channel_config: ChannelConfig,
    active: Mutex<Option<ActiveRecording>>,
}

impl RecordingSession {
    pub fn new(launch_config: LaunchConfig) -> Self {
        Self {
            launch_config,
            channel_config: ChannelConfig::default(),
            active: Mutex::new(None),
        }
    }

    pub fn with_channel_config(mut self, channel_config: ChannelConfig) -> Self {
        self.channel_config = channel_config;
        self
    }

    /// Start a recording cycle: spawn the server, connect the control
    /// channel, navigate to the target URL and arm the recorder.
    ///
    /// Every cycle gets a fresh server, channel and source buffer. If any
    /// handshake step fails the channel is torn down before the error is
    /// returned, so the next start begins from scratch.
    pub async fn start(&self, options: RecordOptions) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(RecorderError::RecordingInProgress);
        }

        tracing::info!(
            url = %options.url,
            locale = ?options.locale,
            base_url = ?options.base_url,
            "starting recording"
        );

        let endpoint = launch(&self.launch_config).await?;
        let controller_url = controller_endpoint(&endpoint.ws_endpoint)?;
        let channel = RpcChannel::connect(&controller_url, self.channel_config.clone()).await?;

        // Subscribe before the first command goes out so no early event is
        // missed.
        let mut events = channel.subscribe("sourceChanged");
        let source = Arc::new(Mutex::new(None));
        let store = Arc::clone(&source);
        let listener = tokio::spawn(async move {
            while let Some(params) = events.recv().await {
                match serde_json::from_value::<SourceChangedEvent>(params) {
                    Ok(event) => {
                        tracing::debug!(actions = event.actions.len(), "source changed");
                        *store.lock().await = Some(GeneratedSource::from(event));
                    }
                    Err(e) => {
                        // Keep the last good value.
                        tracing::warn!("ignoring malformed sourceChanged event: {e}");
                    }
                }
            }
        });

        let handshake = async {
            channel
                .send(
                    "initialize",
                    json!({ "codegenId": CODEGEN_ID, "sdkLanguage": SDK_LANGUAGE }),
                )
                .await?;
            channel
                .send("setReportStateChanged", json!({ "enabled": true }))
                .await?;
            channel
                .send("navigate", json!({ "url": options.url }))
                .await?;
            channel
                .send("setRecorderMode", json!({ "mode": RecorderMode::Recording }))
                .await?;
            Ok::<(), RecorderError>(())
        };

        if let Err(e) = handshake.await {
            listener.abort();
            channel.close().await;
            return Err(e);
        }

        *active = Some(ActiveRecording {
            channel,
            source,
            listener,
        });
        Ok(())
    }

    /// Stop the active cycle and return the last generated source, if any.
    ///
    /// Stopping an idle session is not an error; it yields `None`, as does
    /// stopping a cycle during which no `sourceChanged` event arrived.
    pub async fn stop(&self) -> Result<Option<GeneratedSource>> {
        let mut active = self.active.lock().await;
        let Some(recording) = active.take() else {
            return Ok(None);
        };

        let captured = recording.source.lock().await.take();
        recording.listener.abort();

        // Ask the server to shut itself down. The outcome no longer matters
        // once the capture is taken.
        if let Err(e) = recording.channel.send("kill", json!({})).await {
            tracing::debug!("kill command failed: {e}");
        }
        recording.channel.close().await;

        tracing::info!(captured = captured.is_some(), "recording stopped");
        Ok(captured)
    }

    pub async fn is_recording(&self) -> bool {
        self.active.lock().await.is_some()
    }
}

/// The control connection uses the server endpoint with the
/// debug-controller query suffix.
fn controller_endpoint(ws_endpoint: &str) -> Result<String> {
    let mut url = url::Url::parse(ws_endpoint)?;
    url.set_query(Some("debug-controller"));
    Ok(url.to_string())
}
