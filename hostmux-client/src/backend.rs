//! Session mux backend
//!
//! Decodes inbound packets into typed messages and fans them out to per-hook
//! subscribers; turns outbound intents into addressed packets. One backend
//! owns one socket for its whole lifetime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hostmux_protocol::codec::{self, CodecError};
use hostmux_protocol::{
    Compression, EditBufferHook, InboundEvent, InboundMessage, InsertTextRequest,
    InterceptRequest, InterceptedKeyHook, MalformedLinePolicy, OutboundMessage, OutboundRequest,
    Packet, PacketOptions, PacketStream, PacketWriter, PostExecHook, PreExecHook, PromptHook,
    RequestId, RunProcessRequest, RunProcessResponse, SessionId, SetBufferRequest, Socket,
    SocketHandle,
};
use hostmux_utils::{HostmuxError, Result};
use tokio::sync::watch;

use crate::bus::{EventBus, SubscriptionId};
use crate::pending::PendingRequests;

/// Default time to wait for a correlated reply
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendConfig {
    /// Applied to every outbound packet
    pub packet_options: PacketOptions,
    /// How long `run_process` and `ping` wait for their reply
    pub request_timeout: Duration,
    pub malformed_line_policy: MalformedLinePolicy,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            packet_options: PacketOptions::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            malformed_line_policy: MalformedLinePolicy::default(),
        }
    }
}

/// A hook payload together with the session that raised it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookEvent<T> {
    pub session_id: SessionId,
    pub hook: T,
}

/// Subscribable hook kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    EditBuffer,
    Prompt,
    PreExec,
    PostExec,
    InterceptedKey,
}

/// Handle returned by the `on_*` methods, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    kind: HookKind,
    id: SubscriptionId,
}

impl Subscription {
    pub fn kind(&self) -> HookKind {
        self.kind
    }
}

// ==================== Inbound Decoding ====================

/// Turns a framed packet into an inbound message
///
/// The backend awaits each decode before starting the next one, so
/// implementations may take arbitrarily long without reordering dispatch.
#[async_trait]
pub trait InboundDecoder: Send + Sync {
    async fn decode(&self, packet: Packet) -> std::result::Result<InboundMessage, CodecError>;
}

/// Default decoder; gzip packets are inflated on the blocking pool
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketDecoder;

#[async_trait]
impl InboundDecoder for PacketDecoder {
    async fn decode(&self, packet: Packet) -> std::result::Result<InboundMessage, CodecError> {
        match packet.compression() {
            Ok(Compression::Gzip) => {
                tokio::task::spawn_blocking(move || codec::decode_inbound(&packet))
                    .await
                    .map_err(|e| {
                        CodecError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
                    })?
            }
            _ => codec::decode_inbound(&packet),
        }
    }
}

/// Map a protocol-level error onto the workspace error type
pub fn codec_error(err: CodecError) -> HostmuxError {
    match err {
        CodecError::Socket(_) => HostmuxError::ConnectionClosed,
        CodecError::VersionMismatch { expected, found } => {
            HostmuxError::ProtocolMismatch { expected, found }
        }
        CodecError::Io(e) => HostmuxError::Io(e),
        other => HostmuxError::protocol(other.to_string()),
    }
}

// ==================== Backend ====================

#[derive(Debug, Default)]
struct Buses {
    edit_buffer: EventBus<HookEvent<EditBufferHook>>,
    prompt: EventBus<HookEvent<PromptHook>>,
    pre_exec: EventBus<HookEvent<PreExecHook>>,
    post_exec: EventBus<HookEvent<PostExecHook>>,
    intercepted_key: EventBus<HookEvent<InterceptedKeyHook>>,
}

/// State shared with the inbound task
#[derive(Debug)]
struct Shared {
    socket: SocketHandle,
    buses: Buses,
    pending: PendingRequests,
}

impl Shared {
    fn dispatch(&self, message: InboundMessage) {
        let InboundMessage {
            session_id,
            in_reply_to,
            event,
        } = message;

        let event = match in_reply_to {
            Some(id) => match self.pending.resolve(id, event) {
                Ok(()) => return,
                Err(event) => event,
            },
            None => event,
        };

        let session_id = match (&event, session_id) {
            (InboundEvent::RunProcessResponse(_) | InboundEvent::Pong, _) => {
                tracing::debug!(
                    event = event.name(),
                    in_reply_to = ?in_reply_to,
                    "Reply with no waiting request, dropping"
                );
                return;
            }
            (_, Some(session_id)) => session_id,
            (_, None) => {
                tracing::warn!(event = event.name(), "Hook event without a session, dropping");
                return;
            }
        };

        let name = event.name();
        let delivered = match event {
            InboundEvent::EditBuffer(hook) => {
                self.buses.edit_buffer.dispatch(&HookEvent { session_id, hook })
            }
            InboundEvent::Prompt(hook) => self.buses.prompt.dispatch(&HookEvent { session_id, hook }),
            InboundEvent::PreExec(hook) => {
                self.buses.pre_exec.dispatch(&HookEvent { session_id, hook })
            }
            InboundEvent::PostExec(hook) => {
                self.buses.post_exec.dispatch(&HookEvent { session_id, hook })
            }
            InboundEvent::InterceptedKey(hook) => {
                self.buses.intercepted_key.dispatch(&HookEvent { session_id, hook })
            }
            InboundEvent::RunProcessResponse(_) | InboundEvent::Pong => 0,
        };
        tracing::trace!(event = name, subscribers = delivered, "Dispatched inbound event");
    }
}

/// Multiplexes one host connection between hook subscribers and request callers
#[derive(Debug)]
pub struct Backend {
    shared: Arc<Shared>,
    writer: PacketWriter,
    config: BackendConfig,
    next_id: AtomicU64,
    done: watch::Receiver<bool>,
}

impl Backend {
    /// Take ownership of `socket` and start the inbound task
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(socket: Socket, config: BackendConfig) -> Self {
        Self::with_decoder(socket, config, PacketDecoder)
    }

    /// Like `new`, with a custom inbound decoder
    pub fn with_decoder<D>(socket: Socket, config: BackendConfig, decoder: D) -> Self
    where
        D: InboundDecoder + 'static,
    {
        let stream = PacketStream::with_policy(socket, config.malformed_line_policy);
        let shared = Arc::new(Shared {
            socket: stream.handle(),
            buses: Buses::default(),
            pending: PendingRequests::new(),
        });
        let writer = stream.writer();
        let (done_tx, done_rx) = watch::channel(false);

        tokio::spawn(inbound_task(stream, Box::new(decoder), shared.clone(), done_tx));

        Self {
            shared,
            writer,
            config,
            next_id: AtomicU64::new(1),
            done: done_rx,
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// False once the backend has been closed
    pub fn is_active(&self) -> bool {
        self.shared.socket.is_active()
    }

    // ==================== Subscriptions ====================

    pub fn on_edit_buffer_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&HookEvent<EditBufferHook>) + Send + Sync + 'static,
    {
        Subscription {
            kind: HookKind::EditBuffer,
            id: self.shared.buses.edit_buffer.subscribe(callback),
        }
    }

    pub fn on_prompt<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&HookEvent<PromptHook>) + Send + Sync + 'static,
    {
        Subscription {
            kind: HookKind::Prompt,
            id: self.shared.buses.prompt.subscribe(callback),
        }
    }

    pub fn on_pre_exec<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&HookEvent<PreExecHook>) + Send + Sync + 'static,
    {
        Subscription {
            kind: HookKind::PreExec,
            id: self.shared.buses.pre_exec.subscribe(callback),
        }
    }

    pub fn on_post_exec<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&HookEvent<PostExecHook>) + Send + Sync + 'static,
    {
        Subscription {
            kind: HookKind::PostExec,
            id: self.shared.buses.post_exec.subscribe(callback),
        }
    }

    pub fn on_intercepted_key<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&HookEvent<InterceptedKeyHook>) + Send + Sync + 'static,
    {
        Subscription {
            kind: HookKind::InterceptedKey,
            id: self.shared.buses.intercepted_key.subscribe(callback),
        }
    }

    /// Detach a subscriber. Returns false if it was already removed.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let buses = &self.shared.buses;
        match subscription.kind {
            HookKind::EditBuffer => buses.edit_buffer.unsubscribe(subscription.id),
            HookKind::Prompt => buses.prompt.unsubscribe(subscription.id),
            HookKind::PreExec => buses.pre_exec.unsubscribe(subscription.id),
            HookKind::PostExec => buses.post_exec.unsubscribe(subscription.id),
            HookKind::InterceptedKey => buses.intercepted_key.unsubscribe(subscription.id),
        }
    }

    // ==================== Outbound ====================

    /// Ask the session to edit its command line buffer
    pub fn insert_text(
        &self,
        session_id: impl Into<SessionId>,
        request: InsertTextRequest,
    ) -> Result<RequestId> {
        let message = self.addressed(session_id.into(), OutboundRequest::InsertText(request));
        self.send(&message)?;
        Ok(message.id)
    }

    /// Replace the session's command line buffer
    pub fn set_buffer(
        &self,
        session_id: impl Into<SessionId>,
        request: SetBufferRequest,
    ) -> Result<RequestId> {
        let message = self.addressed(session_id.into(), OutboundRequest::SetBuffer(request));
        self.send(&message)?;
        Ok(message.id)
    }

    /// Change which keystrokes the session forwards
    pub fn intercept(
        &self,
        session_id: impl Into<SessionId>,
        request: InterceptRequest,
    ) -> Result<RequestId> {
        let message = self.addressed(session_id.into(), OutboundRequest::Intercept(request));
        self.send(&message)?;
        Ok(message.id)
    }

    /// Run a process in the session's environment and wait for its output
    pub async fn run_process(
        &self,
        session_id: impl Into<SessionId>,
        request: RunProcessRequest,
    ) -> Result<RunProcessResponse> {
        let message = self.addressed(session_id.into(), OutboundRequest::RunProcess(request));
        match self.request(&message).await? {
            InboundEvent::RunProcessResponse(response) => Ok(response),
            other => Err(HostmuxError::UnexpectedReply {
                request: label(&message),
                reply: other.name().into(),
            }),
        }
    }

    /// Round-trip a ping through the host
    pub async fn ping(&self) -> Result<()> {
        let message = OutboundMessage::ping(self.next_request_id());
        match self.request(&message).await? {
            InboundEvent::Pong => Ok(()),
            other => Err(HostmuxError::UnexpectedReply {
                request: label(&message),
                reply: other.name().into(),
            }),
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn addressed(&self, session_id: SessionId, request: OutboundRequest) -> OutboundMessage {
        OutboundMessage::to_session(self.next_request_id(), session_id, request)
    }

    fn send(&self, message: &OutboundMessage) -> Result<()> {
        if !self.is_active() {
            return Err(HostmuxError::ConnectionClosed);
        }
        let packet = codec::encode(message, self.config.packet_options).map_err(codec_error)?;
        self.writer.write(&packet).map_err(codec_error)?;
        tracing::debug!(
            request = message.request.name(),
            id = %message.id,
            session_id = ?message.session_id,
            "Sent request"
        );
        Ok(())
    }

    async fn request(&self, message: &OutboundMessage) -> Result<InboundEvent> {
        // Register before sending so a fast reply cannot be missed
        let reply = self.shared.pending.register(message.id, label(message))?;
        self.send(message)?;
        reply.wait(self.config.request_timeout).await
    }

    // ==================== Teardown ====================

    /// Close the connection; later calls are no-ops
    ///
    /// Stops dispatch immediately and fails every pending request.
    pub fn close(&self) {
        if self.is_active() {
            tracing::debug!("Closing backend");
        }
        self.shared.socket.close();
        self.shared.pending.close_all();
    }

    /// Resolves once the inbound task has ended
    pub async fn closed(&self) {
        let mut done = self.done.clone();
        // Err means the task is gone, which is also "closed"
        let _ = done.wait_for(|finished| *finished).await;
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.close();
    }
}

fn label(message: &OutboundMessage) -> String {
    format!("{} {}", message.request.name(), message.id)
}

/// Decode and dispatch packets strictly in wire order
async fn inbound_task(
    mut stream: PacketStream,
    decoder: Box<dyn InboundDecoder>,
    shared: Arc<Shared>,
    done: watch::Sender<bool>,
) {
    while let Some(packet) = stream.next_packet().await {
        let message = match decoder.decode(packet).await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable packet");
                continue;
            }
        };

        // A close during the decode discards its result
        if !shared.socket.is_active() {
            break;
        }
        shared.dispatch(message);
    }

    tracing::debug!("Inbound task finished");
    shared.pending.close_all();
    let _ = done.send(true);
}

#[async_trait]
impl crate::liveness::Pinger for Backend {
    async fn ping(&self) -> Result<()> {
        Backend::ping(self).await
    }
}
