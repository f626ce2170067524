//! Debug-controller RPC over a single WebSocket connection.
//!
//! One channel instance owns one connection. Commands are correlated to
//! replies by id; events are fanned out to subscriber queues by method name.

pub mod channel;
pub mod protocol;

pub use channel::{ChannelConfig, RpcChannel};
pub use protocol::{Command, Event, Inbound, RecorderMode, Reply, SourceChangedEvent};
