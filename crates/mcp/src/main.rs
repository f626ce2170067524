//! MCP server exposing browser-interaction recording as two tools.
//!
//! `start_recording` opens a recording browser at a URL; `stop_recording`
//! returns the code the engine generated from the user's actions, rendered
//! as YAML with an advisory note.

use std::sync::Arc;

use clap::Parser;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::transport::stdio;
use rmcp::{tool, tool_handler, tool_router, ErrorData, ServerHandler, ServiceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use recorder::{LaunchConfig, RecordOptions, RecordingSession};

#[derive(Debug, Clone, Parser)]
#[command(name = "codegen-mcp")]
#[command(about = "Record browser interactions and return generated test code over MCP")]
struct Cli {
    /// Default base URL for the recording browser.
    #[arg(long)]
    base_url: Option<String>,
    /// Default locale for the recording browser.
    #[arg(long)]
    locale: Option<String>,
    /// Path to a storage state file applied by default.
    #[arg(long)]
    default_storage_state: Option<String>,
    /// Default user agent for the recording browser.
    #[arg(long)]
    default_user_agent: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct StartRecordingRequest {
    /// URL the recording browser navigates to first.
    url: String,
    /// Path to a storage state file for this recording.
    #[serde(default)]
    storage_state: Option<String>,
    /// User agent override for this recording.
    #[serde(default)]
    user_agent: Option<String>,
    /// Locale override for this recording.
    #[serde(default)]
    locale: Option<String>,
    /// Base URL override for this recording.
    #[serde(default)]
    base_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct StopReport {
    note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    actions: Vec<String>,
}

fn merge_options(request: StartRecordingRequest, defaults: &Cli) -> RecordOptions {
    RecordOptions {
        url: request.url,
        storage_state: request
            .storage_state
            .or_else(|| defaults.default_storage_state.clone()),
        user_agent: request
            .user_agent
            .or_else(|| defaults.default_user_agent.clone()),
        locale: request.locale.or_else(|| defaults.locale.clone()),
        base_url: request.base_url.or_else(|| defaults.base_url.clone()),
    }
}

#[derive(Clone)]
struct RecorderServer {
    session: Arc<RecordingSession>,
    defaults: Arc<Cli>,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for RecorderServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Records human browser interactions and returns the generated test code. \
                 Call start_recording with a URL, let the user act in the opened browser, \
                 then call stop_recording to retrieve the code."
                    .to_string(),
            ),
        }
    }
}

#[tool_router]
impl RecorderServer {
    fn new(defaults: Cli) -> Self {
        Self {
            session: Arc::new(RecordingSession::new(LaunchConfig::default())),
            defaults: Arc::new(defaults),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "start_recording",
        description = "Start a browser recording session. Opens a recording browser at the given URL; actions the user performs in it are turned into test code, returned later by stop_recording."
    )]
    async fn start_recording(
        &self,
        Parameters(request): Parameters<StartRecordingRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tracing::info!(tool = "start_recording", url = %request.url, "start");

        let options = merge_options(request, &self.defaults);
        let applied = serde_yaml::to_string(&options)
            .map_err(|e| ErrorData::internal_error(format!("render failed: {e}"), None))?;

        self.session.start(options).await.map_err(|e| {
            tracing::error!(tool = "start_recording", "failed: {e}");
            ErrorData::internal_error(format!("start recording failed: {e}"), None)
        })?;

        tracing::info!(tool = "start_recording", "ok");
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Recording started. Perform actions in the opened browser, then call \
             stop_recording to retrieve the generated code.\n{applied}"
        ))]))
    }

    #[tool(
        name = "stop_recording",
        description = "Stop the current recording session and return the generated test code."
    )]
    async fn stop_recording(&self) -> Result<CallToolResult, ErrorData> {
        tracing::info!(tool = "stop_recording", "start");

        let source = self.session.stop().await.map_err(|e| {
            tracing::error!(tool = "stop_recording", "failed: {e}");
            ErrorData::internal_error(format!("stop recording failed: {e}"), None)
        })?;

        let report = match source {
            Some(source) => StopReport {
                note: "Generated code is produced mechanically from recorded interactions \
                       and has not been reviewed; verify it before use."
                    .into(),
                code: Some(source.text),
                actions: source.actions,
            },
            None => StopReport {
                note: "No interactions were captured; no code was generated.".into(),
                code: None,
                actions: Vec::new(),
            },
        };

        let yaml = serde_yaml::to_string(&report)
            .map_err(|e| ErrorData::internal_error(format!("render failed: {e}"), None))?;
        tracing::info!(
            tool = "stop_recording",
            captured = report.code.is_some(),
            "ok"
        );
        Ok(CallToolResult::success(vec![Content::text(yaml)]))
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    // Stdout carries the MCP transport; all diagnostics go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let server = RecorderServer::new(cli);
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Cli {
        Cli {
            base_url: Some("https://default.example".into()),
            locale: Some("en-US".into()),
            default_storage_state: Some("/tmp/state.json".into()),
            default_user_agent: None,
        }
    }

    #[test]
    fn request_values_win_over_cli_defaults() {
        let request = StartRecordingRequest {
            url: "https://example.com".into(),
            storage_state: None,
            user_agent: Some("custom-agent".into()),
            locale: Some("ja-JP".into()),
            base_url: None,
        };

        let options = merge_options(request, &defaults());
        assert_eq!(options.url, "https://example.com");
        assert_eq!(options.storage_state.as_deref(), Some("/tmp/state.json"));
        assert_eq!(options.user_agent.as_deref(), Some("custom-agent"));
        assert_eq!(options.locale.as_deref(), Some("ja-JP"));
        assert_eq!(options.base_url.as_deref(), Some("https://default.example"));
    }

    #[test]
    fn stop_report_omits_absent_code() {
        let report = StopReport {
            note: "No interactions were captured; no code was generated.".into(),
            code: None,
            actions: Vec::new(),
        };
        let yaml = serde_yaml::to_string(&report).unwrap();
        assert!(!yaml.contains("code:"));
        assert!(yaml.contains("note:"));

        let report = StopReport {
            note: "n".into(),
            code: Some("await page.click('a');".into()),
            actions: vec!["click".into()],
        };
        let yaml = serde_yaml::to_string(&report).unwrap();
        assert!(yaml.contains("await page.click('a');"));
        assert!(yaml.contains("- click"));
    }
}
