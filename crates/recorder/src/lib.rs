//! Browser interaction recording driven over the automation engine's
//! debug-controller protocol.
//!
//! A human performs actions in a real browser; the engine's own code
//! generator turns them into source code, which this library captures and
//! hands back. Components, leaf first:
//!
//! - [`server`]: spawns the engine's `run-server` process and resolves its
//!   WebSocket endpoint from the startup banner.
//! - [`rpc`]: one bidirectional connection multiplexing correlated
//!   command/reply pairs and out-of-band event notifications.
//! - [`session`]: the two-phase start/stop lifecycle that arms the remote
//!   recorder and buffers the latest generated source.

pub mod error;
pub mod rpc;
pub mod server;
pub mod session;

pub use error::{RecorderError, Result};
pub use rpc::channel::{ChannelConfig, RpcChannel};
pub use server::{launch, LaunchConfig, ServerEndpoint};
pub use session::{GeneratedSource, RecordOptions, RecordingSession};
