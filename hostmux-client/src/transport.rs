//! WebSocket transport
//!
//! Opens a WebSocket with tokio-tungstenite and adapts it to a frames-kind
//! [`Socket`].

use std::time::Duration;

use futures::{future, SinkExt, StreamExt};
use hostmux_protocol::{Frame, Socket};
use hostmux_utils::{HostmuxError, Result};
use tokio_tungstenite::tungstenite::{self, Message};

/// Connect to `url` (`ws://` or `wss://`)
pub async fn connect(url: &str) -> Result<Socket> {
    tracing::debug!(url = %url, "Connecting");
    let (ws, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| HostmuxError::connection(format!("{}: {}", url, e)))?;
    tracing::info!(url = %url, "Connected");

    let (write, read) = ws.split();
    let read = read.filter_map(|item| future::ready(frame_from_message(item)));
    let write = write.with(|frame: Frame| future::ready(Ok::<_, tungstenite::Error>(message_from_frame(frame))));

    Ok(Socket::from_frames(read, write))
}

/// Connect, retrying transient failures up to `attempts` times in total
pub async fn connect_with_retry(url: &str, attempts: u32, delay: Duration) -> Result<Socket> {
    let mut attempt = 1;
    loop {
        match connect(url).await {
            Ok(socket) => return Ok(socket),
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::debug!(attempt, error = %e, "Connect failed, retrying");
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Data frames pass through; control frames are handled by tungstenite
fn frame_from_message(
    item: std::result::Result<Message, tungstenite::Error>,
) -> Option<std::result::Result<Frame, tungstenite::Error>> {
    match item {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
        Ok(Message::Binary(bytes)) => Some(Ok(Frame::Binary(bytes))),
        Ok(Message::Close(frame)) => {
            tracing::debug!(frame = ?frame, "Received close frame");
            None
        }
        Ok(_) => None,
        Err(e) => Some(Err(e)),
    }
}

fn message_from_frame(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(bytes) => Message::Binary(bytes),
    }
}
