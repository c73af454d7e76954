//! Pending-request table
//!
//! Outbound requests that expect an answer register here under their
//! `RequestId`. The inbound task resolves an entry when a message with a
//! matching `in_reply_to` arrives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hostmux_protocol::{InboundEvent, RequestId};
use hostmux_utils::{HostmuxError, Result};
use parking_lot::Mutex;
use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct Table {
    waiting: HashMap<RequestId, oneshot::Sender<InboundEvent>>,
    closed: bool,
}

/// Shared map of requests awaiting a reply
#[derive(Debug, Clone, Default)]
pub struct PendingRequests {
    table: Arc<Mutex<Table>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for the reply to `id`
    ///
    /// Fails with `ConnectionClosed` once `close_all` has run.
    pub fn register(&self, id: RequestId, label: impl Into<String>) -> Result<PendingReply> {
        let (tx, rx) = oneshot::channel();
        {
            let mut table = self.table.lock();
            if table.closed {
                return Err(HostmuxError::ConnectionClosed);
            }
            table.waiting.insert(id, tx);
        }
        Ok(PendingReply {
            id,
            label: label.into(),
            rx,
            requests: self.clone(),
        })
    }

    /// Hand `event` to the request waiting on `id`
    ///
    /// Gives the event back when nobody is waiting for it.
    pub fn resolve(&self, id: RequestId, event: InboundEvent) -> std::result::Result<(), InboundEvent> {
        let sender = self.table.lock().waiting.remove(&id);
        match sender {
            Some(sender) => sender.send(event),
            None => Err(event),
        }
    }

    /// Fail every waiting request and refuse new ones
    pub fn close_all(&self) {
        let drained: Vec<_> = {
            let mut table = self.table.lock();
            table.closed = true;
            table.waiting.drain().collect()
        };
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "Failing pending requests on close");
        }
        // Dropping the senders wakes every waiter with an error
        drop(drained);
    }

    pub fn len(&self) -> usize {
        self.table.lock().waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: RequestId) {
        self.table.lock().waiting.remove(&id);
    }
}

/// Reply slot for one registered request
///
/// Dropping it (including on timeout) removes the table entry.
#[derive(Debug)]
pub struct PendingReply {
    id: RequestId,
    label: String,
    rx: oneshot::Receiver<InboundEvent>,
    requests: PendingRequests,
}

impl PendingReply {
    /// Wait for the reply, failing after `timeout`
    pub async fn wait(mut self, timeout: Duration) -> Result<InboundEvent> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(HostmuxError::ConnectionClosed),
            Err(_) => {
                tracing::debug!(request = %self.label, "Request timed out");
                Err(HostmuxError::request_timeout(self.label.as_str(), timeout))
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.requests.remove(self.id);
    }
}
