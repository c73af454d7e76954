//! Socket adapter
//!
//! Normalizes the two transport shapes (binary/text frames and plain text
//! messages) into one text interface. A background pump task owns the
//! transport; callers talk to it through [`SocketHandle`] (send/close) and
//! [`SocketEvents`] (incoming text and close notification).

use std::convert::Infallible;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

/// Socket error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SocketError {
    #[error("Socket closed")]
    Closed,
}

/// One frame as delivered by a frame-oriented transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// UTF-8 encoded text in a binary frame
    Binary(Vec<u8>),
}

impl Frame {
    pub fn into_text(self) -> String {
        match self {
            Frame::Text(text) => text,
            Frame::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "Binary frame is not valid UTF-8, decoding lossily");
                    String::from_utf8_lossy(e.as_bytes()).into_owned()
                }
            },
        }
    }
}

/// Underlying transport shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    /// Binary or text frames, binary frames need UTF-8 decoding
    Frames,
    /// Already-decoded text messages
    Text,
}

/// Event delivered by a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Message(String),
    /// The transport ended or failed; delivered at most once
    Closed,
}

enum Command {
    Send(String),
    Close,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Send(text) => write!(f, "Send({} bytes)", text.len()),
            Command::Close => f.write_str("Close"),
        }
    }
}

/// Clonable send/close side of a socket
#[derive(Debug, Clone)]
pub struct SocketHandle {
    kind: SocketKind,
    active: Arc<AtomicBool>,
    commands: mpsc::UnboundedSender<Command>,
}

impl SocketHandle {
    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    /// False once `close` has been called
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Queue one text message for the transport
    pub fn send(&self, text: impl Into<String>) -> Result<(), SocketError> {
        if !self.is_active() {
            return Err(SocketError::Closed);
        }
        self.commands
            .send(Command::Send(text.into()))
            .map_err(|_| SocketError::Closed)
    }

    /// Close the socket; later calls are no-ops
    pub fn close(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            tracing::debug!(kind = ?self.kind, "Closing socket");
            let _ = self.commands.send(Command::Close);
        }
    }
}

/// Receiving side of a socket
#[derive(Debug)]
pub struct SocketEvents {
    active: Arc<AtomicBool>,
    events: mpsc::UnboundedReceiver<SocketEvent>,
}

impl SocketEvents {
    /// Next event, or `None` once the socket is closed locally or the
    /// transport is gone
    pub async fn recv(&mut self) -> Option<SocketEvent> {
        if !self.active.load(Ordering::SeqCst) {
            return None;
        }
        let event = self.events.recv().await?;
        // Suppress anything that raced with a local close
        if self.active.load(Ordering::SeqCst) {
            Some(event)
        } else {
            None
        }
    }
}

/// A text socket over one transport connection
///
/// Constructors spawn the pump task and must be called inside a Tokio runtime.
#[derive(Debug)]
pub struct Socket {
    handle: SocketHandle,
    events: SocketEvents,
}

impl Socket {
    /// Adapt a frame-oriented transport (e.g. a WebSocket)
    pub fn from_frames<R, W, E>(read: R, write: W) -> Self
    where
        R: Stream<Item = Result<Frame, E>> + Send + 'static,
        W: Sink<Frame> + Send + 'static,
        W::Error: Display + Send + 'static,
        E: Display + Send + 'static,
    {
        let read = read.map(|item| item.map(Frame::into_text));
        let write = write.with(|text: String| future::ready(Ok::<_, W::Error>(Frame::Text(text))));
        Self::spawn(SocketKind::Frames, read, write)
    }

    /// Adapt a transport that already speaks text
    pub fn from_text<R, W, E>(read: R, write: W) -> Self
    where
        R: Stream<Item = Result<String, E>> + Send + 'static,
        W: Sink<String> + Send + 'static,
        W::Error: Display + Send + 'static,
        E: Display + Send + 'static,
    {
        Self::spawn(SocketKind::Text, read, write)
    }

    fn spawn<R, W, E>(kind: SocketKind, read: R, write: W) -> Self
    where
        R: Stream<Item = Result<String, E>> + Send + 'static,
        W: Sink<String> + Send + 'static,
        W::Error: Display + Send + 'static,
        E: Display + Send + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(pump(read, write, active.clone(), command_rx, event_tx));

        Self {
            handle: SocketHandle {
                kind,
                active: active.clone(),
                commands: command_tx,
            },
            events: SocketEvents {
                active,
                events: event_rx,
            },
        }
    }

    pub fn kind(&self) -> SocketKind {
        self.handle.kind()
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    pub fn send(&self, text: impl Into<String>) -> Result<(), SocketError> {
        self.handle.send(text)
    }

    pub fn close(&self) {
        self.handle.close()
    }

    pub async fn recv(&mut self) -> Option<SocketEvent> {
        self.events.recv().await
    }

    /// A clonable handle sharing this socket's active flag
    pub fn handle(&self) -> SocketHandle {
        self.handle.clone()
    }

    pub fn split(self) -> (SocketHandle, SocketEvents) {
        (self.handle, self.events)
    }
}

/// Two text sockets wired to each other in memory
pub fn memory_pair() -> (Socket, Socket) {
    let (left_tx, left_rx) = futures::channel::mpsc::unbounded::<String>();
    let (right_tx, right_rx) = futures::channel::mpsc::unbounded::<String>();

    let left = Socket::from_text(right_rx.map(Ok::<_, Infallible>), left_tx);
    let right = Socket::from_text(left_rx.map(Ok::<_, Infallible>), right_tx);
    (left, right)
}

/// Background task that owns the transport
async fn pump<R, W, E>(
    read: R,
    write: W,
    active: Arc<AtomicBool>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SocketEvent>,
) where
    R: Stream<Item = Result<String, E>>,
    W: Sink<String>,
    W::Error: Display,
    E: Display,
{
    let mut read = Box::pin(read);
    let mut write = Box::pin(write);

    let emit_closed = || {
        if active.load(Ordering::SeqCst) {
            let _ = events.send(SocketEvent::Closed);
        }
    };

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(text)) => {
                    if let Err(e) = write.send(text).await {
                        tracing::warn!(error = %e, "Failed to send on transport");
                        emit_closed();
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    if let Err(e) = write.close().await {
                        tracing::debug!(error = %e, "Error closing transport");
                    }
                    break;
                }
            },

            item = read.next() => match item {
                Some(Ok(text)) => {
                    if active.load(Ordering::SeqCst) {
                        let _ = events.send(SocketEvent::Message(text));
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Transport error");
                    emit_closed();
                    break;
                }
                None => {
                    tracing::debug!("Transport ended");
                    emit_closed();
                    break;
                }
            },
        }
    }
}
