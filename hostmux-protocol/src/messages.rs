//! Host/UI message types carried in a packet's `inner` field

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::*;

// ==================== Identifiers ====================

/// Identifies a terminal session on the host side
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Correlates an outbound request with the inbound message answering it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ==================== Inbound (host -> UI) ====================

/// Messages sent from the host to the UI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundMessage {
    /// Session that raised the event; `None` for connection-level replies
    pub session_id: Option<SessionId>,
    /// Set when this message answers an outbound request
    pub in_reply_to: Option<RequestId>,
    pub event: InboundEvent,
}

impl InboundMessage {
    /// An unsolicited event raised by a session
    pub fn event(session_id: impl Into<SessionId>, event: InboundEvent) -> Self {
        Self {
            session_id: Some(session_id.into()),
            in_reply_to: None,
            event,
        }
    }

    /// An answer to the outbound request `request`
    pub fn reply(request: &OutboundMessage, event: InboundEvent) -> Self {
        Self {
            session_id: request.session_id.clone(),
            in_reply_to: Some(request.id),
            event,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum InboundEvent {
    EditBuffer(EditBufferHook),
    Prompt(PromptHook),
    PreExec(PreExecHook),
    PostExec(PostExecHook),
    InterceptedKey(InterceptedKeyHook),
    RunProcessResponse(RunProcessResponse),
    /// Answer to `OutboundRequest::Ping`
    Pong,
}

impl InboundEvent {
    /// Case name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::EditBuffer(_) => "edit_buffer",
            InboundEvent::Prompt(_) => "prompt",
            InboundEvent::PreExec(_) => "pre_exec",
            InboundEvent::PostExec(_) => "post_exec",
            InboundEvent::InterceptedKey(_) => "intercepted_key",
            InboundEvent::RunProcessResponse(_) => "run_process_response",
            InboundEvent::Pong => "pong",
        }
    }
}

// ==================== Outbound (UI -> host) ====================

/// Messages sent from the UI to the host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboundMessage {
    pub id: RequestId,
    /// Target session; `None` for connection-level requests
    pub session_id: Option<SessionId>,
    pub request: OutboundRequest,
}

impl OutboundMessage {
    /// A request addressed to one session
    pub fn to_session(id: RequestId, session_id: SessionId, request: OutboundRequest) -> Self {
        Self {
            id,
            session_id: Some(session_id),
            request,
        }
    }

    pub fn ping(id: RequestId) -> Self {
        Self {
            id,
            session_id: None,
            request: OutboundRequest::Ping,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutboundRequest {
    InsertText(InsertTextRequest),
    SetBuffer(SetBufferRequest),
    Intercept(InterceptRequest),
    RunProcess(RunProcessRequest),
    /// Liveness probe, answered with `InboundEvent::Pong`
    Ping,
}

impl OutboundRequest {
    /// Case name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            OutboundRequest::InsertText(_) => "insert_text",
            OutboundRequest::SetBuffer(_) => "set_buffer",
            OutboundRequest::Intercept(_) => "intercept",
            OutboundRequest::RunProcess(_) => "run_process",
            OutboundRequest::Ping => "ping",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_display() {
        let id = SessionId::new("abcdef");
        assert_eq!(id.to_string(), "abcdef");
        assert_eq!(id.as_str(), "abcdef");
        assert_eq!(SessionId::from("abcdef"), id);
    }

    #[test]
    fn test_request_id_display() {
        assert_eq!(RequestId(42).to_string(), "#42");
    }

    #[test]
    fn test_reply_copies_session_and_id() {
        let request = OutboundMessage::to_session(
            RequestId(7),
            SessionId::new("s1"),
            OutboundRequest::RunProcess(RunProcessRequest::new("ls", ["-la"])),
        );
        let reply = InboundMessage::reply(
            &request,
            InboundEvent::RunProcessResponse(RunProcessResponse::default()),
        );
        assert_eq!(reply.in_reply_to, Some(RequestId(7)));
        assert_eq!(reply.session_id, Some(SessionId::new("s1")));
    }

    #[test]
    fn test_ping_has_no_session() {
        let ping = OutboundMessage::ping(RequestId(1));
        assert!(ping.session_id.is_none());
        assert_eq!(ping.request.name(), "ping");
    }

    #[test]
    fn test_event_names_are_distinct() {
        let events = [
            InboundEvent::EditBuffer(EditBufferHook::default()),
            InboundEvent::Prompt(PromptHook::default()),
            InboundEvent::PreExec(PreExecHook::default()),
            InboundEvent::PostExec(PostExecHook::default()),
            InboundEvent::InterceptedKey(InterceptedKeyHook::default()),
            InboundEvent::RunProcessResponse(RunProcessResponse::default()),
            InboundEvent::Pong,
        ];
        let names: std::collections::HashSet<_> = events.iter().map(|e| e.name()).collect();
        assert_eq!(names.len(), events.len());
    }
}
