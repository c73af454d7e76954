//! hostmux-client: session mux backend for hostmux
//!
//! The [`Backend`] owns one host connection. It fans inbound hook events out
//! to subscribers and sends addressed requests to host sessions. A
//! [`LivenessMonitor`] pings the host and reports when it stops answering.

pub mod backend;
pub mod bus;
pub mod config;
pub mod liveness;
pub mod pending;
pub mod transport;

pub use backend::{
    codec_error, Backend, BackendConfig, HookEvent, HookKind, InboundDecoder, PacketDecoder,
    Subscription,
};
pub use bus::{EventBus, SubscriptionId};
pub use config::ClientConfig;
pub use liveness::{DisconnectReason, LivenessConfig, LivenessMonitor, Pinger, ReportPolicy};
pub use pending::{PendingReply, PendingRequests};
