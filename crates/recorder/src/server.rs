//! Launches the automation engine's server process and resolves the
//! WebSocket endpoint it prints on startup.
//!
//! The child is not supervised afterwards; its lifetime ends with the
//! session's `kill` command.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use uuid::Uuid;

use crate::error::{RecorderError, Result};

/// Banner the server prints once it accepts connections.
const LISTENING_MARKER: &str = "Listening on ";

/// How the server process is launched.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Program to execute.
    pub program: String,
    /// Arguments placed before `run-server --path=/<token>`.
    pub args: Vec<String>,
    /// How long to wait for the listening banner.
    pub startup_timeout: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            program: "npx".into(),
            args: vec!["playwright".into()],
            startup_timeout: Duration::from_secs(30),
        }
    }
}

/// A resolved endpoint, valid for the lifetime of one spawned server.
#[derive(Debug, Clone)]
pub struct ServerEndpoint {
    /// Connection URI taken verbatim from the startup banner.
    pub ws_endpoint: String,
    /// Control path token the server was started with. Fresh per launch so
    /// concurrent or successive runs never collide.
    pub path_token: String,
}

/// Spawn the server and wait for it to report its endpoint.
pub async fn launch(config: &LaunchConfig) -> Result<ServerEndpoint> {
    let token = Uuid::new_v4().simple().to_string();

    tracing::info!(program = %config.program, token = %token, "starting recorder server");

    let mut child = Command::new(&config.program)
        .args(&config.args)
        .arg("run-server")
        .arg(format!("--path=/{token}"))
        // The recorder is driven over the control channel, not by a human
        // in an inspector window.
        .env("PW_CODEGEN_NO_INSPECTOR", "1")
        .env("PW_EXTENSION_MODE", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(RecorderError::Spawn)?;

    let stdout = child.stdout.take().ok_or(RecorderError::StartupEof)?;

    // Stderr output is logged but never fails the launch on its own.
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::warn!("server stderr: {line}");
            }
        });
    }

    match tokio::time::timeout(config.startup_timeout, wait_for_banner(&mut child, stdout)).await {
        Ok(Ok(ws_endpoint)) => {
            tracing::info!(endpoint = %ws_endpoint, "recorder server ready");
            // The child outlives discovery; reap it in the background once
            // the session's kill command shuts it down.
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
            Ok(ServerEndpoint {
                ws_endpoint,
                path_token: token,
            })
        }
        Ok(Err(e)) => {
            let _ = child.start_kill();
            Err(e)
        }
        Err(_) => {
            let _ = child.start_kill();
            Err(RecorderError::StartupTimeout)
        }
    }
}

async fn wait_for_banner(child: &mut Child, stdout: ChildStdout) -> Result<String> {
    let mut lines = BufReader::new(stdout).lines();

    while let Some(line) = lines.next_line().await? {
        tracing::debug!("server stdout: {line}");
        if let Some((_, endpoint)) = line.split_once(LISTENING_MARKER) {
            return Ok(endpoint.trim().to_string());
        }
    }

    // Stdout closed without the banner: the process is gone or never spoke.
    let status = child.wait().await?;
    match status.code() {
        Some(code) => Err(RecorderError::StartupExited { code }),
        None => Err(RecorderError::StartupEof),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> LaunchConfig {
        LaunchConfig {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            startup_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn resolves_endpoint_from_banner() {
        let config = sh("echo 'Listening on ws://127.0.0.1:7777/abc'; sleep 1");
        let endpoint = launch(&config).await.unwrap();
        assert_eq!(endpoint.ws_endpoint, "ws://127.0.0.1:7777/abc");
    }

    #[tokio::test]
    async fn stderr_output_does_not_fail_launch() {
        let config = sh("echo 'scary warning' >&2; echo 'Listening on ws://127.0.0.1:1/x'");
        let endpoint = launch(&config).await.unwrap();
        assert_eq!(endpoint.ws_endpoint, "ws://127.0.0.1:1/x");
    }

    #[tokio::test]
    async fn early_exit_reports_the_exit_code() {
        let config = sh("exit 1");
        let error = launch(&config).await.unwrap_err();
        assert!(matches!(error, RecorderError::StartupExited { code: 1 }));
        assert!(error.to_string().contains('1'));
    }

    #[tokio::test]
    async fn silence_times_out() {
        let mut config = sh("sleep 10");
        config.startup_timeout = Duration::from_millis(200);
        let error = launch(&config).await.unwrap_err();
        assert!(matches!(error, RecorderError::StartupTimeout));
    }

    #[tokio::test]
    async fn successive_launches_use_distinct_tokens() {
        let config = sh("echo 'Listening on ws://127.0.0.1:7777/abc'");
        let first = launch(&config).await.unwrap();
        let second = launch(&config).await.unwrap();
        assert_ne!(first.path_token, second.path_token);
    }
}
