//! Packet codec: envelope (de)serialization and base64 line framing

use std::cmp;
use std::io::{Read, Write};

use base64::prelude::*;
use bytes::{Buf, BytesMut};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::messages::{InboundMessage, OutboundMessage, OutboundRequest, RequestId, SessionId};
use crate::packet::{Compression, Packet, PacketOptions};
use crate::socket::SocketError;
use crate::PROTOCOL_VERSION;

/// Maximum length of one base64 line, terminator excluded (16 MB)
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(u32),

    #[error("Malformed base64 line: {0}")]
    MalformedBase64Line(#[source] base64::DecodeError),

    #[error("Malformed packet envelope: {0}")]
    MalformedEnvelope(#[source] bincode::Error),

    #[error("Failed to decode message: {0}")]
    DecodeFailure(#[source] bincode::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[source] bincode::Error),

    #[error("Compression error: {0}")]
    Compression(#[source] std::io::Error),

    #[error("Line too long: exceeds {max} bytes")]
    LineTooLong { max: usize },

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Socket(#[from] SocketError),
}

impl CodecError {
    /// True for errors raised while parsing a single wire line
    pub fn is_malformed_line(&self) -> bool {
        matches!(
            self,
            Self::MalformedBase64Line(_) | Self::MalformedEnvelope(_)
        )
    }
}

// ==================== Envelope ====================

/// Serialize `message` and wrap it in a fresh envelope
pub fn encode<M: Serialize>(message: &M, options: PacketOptions) -> Result<Packet, CodecError> {
    let encoded = bincode::serialize(message).map_err(CodecError::Serialize)?;
    let inner = match options.compression() {
        Compression::None => encoded,
        Compression::Gzip => gzip(&encoded)?,
    };
    Ok(Packet::new(options.compression(), inner))
}

/// Validate the envelope, undo compression and deserialize the inner message
pub fn decode<M: DeserializeOwned>(packet: &Packet) -> Result<M, CodecError> {
    let inner = unwrap_inner(packet)?;
    bincode::deserialize(&inner).map_err(CodecError::DecodeFailure)
}

/// Version check and decompression, without deserializing
pub fn unwrap_inner(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    if packet.version != PROTOCOL_VERSION {
        return Err(CodecError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            found: packet.version,
        });
    }

    match packet.compression() {
        Ok(Compression::None) => Ok(packet.inner.clone()),
        Ok(Compression::Gzip) => gunzip(&packet.inner),
        Err(unknown) => Err(CodecError::UnsupportedCompression(unknown)),
    }
}

/// Build the packet for a request addressed to `session_id`
pub fn encode_outbound(
    id: RequestId,
    session_id: SessionId,
    request: OutboundRequest,
    options: PacketOptions,
) -> Result<Packet, CodecError> {
    encode(&OutboundMessage::to_session(id, session_id, request), options)
}

pub fn decode_inbound(packet: &Packet) -> Result<InboundMessage, CodecError> {
    decode(packet)
}

/// Host-side counterpart of `decode_inbound`
pub fn encode_inbound(message: &InboundMessage, options: PacketOptions) -> Result<Packet, CodecError> {
    encode(message, options)
}

/// Host-side counterpart of `encode_outbound`
pub fn decode_outbound(packet: &Packet) -> Result<OutboundMessage, CodecError> {
    decode(packet)
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len()), flate2::Compression::default());
    encoder.write_all(data).map_err(CodecError::Compression)?;
    encoder.finish().map_err(CodecError::Compression)
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(CodecError::Compression)?;
    Ok(decompressed)
}

// ==================== Line Framing ====================

/// What the line decoder does with a line it cannot parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedLinePolicy {
    /// Drop the line and resynchronize on the next terminator
    #[default]
    Skip,
    /// Leave the line in the buffer and report it on every attempt
    Stall,
}

/// Codec for `base64(bincode(Packet))` lines terminated by `\n` or `\r\n`
///
/// Only the envelope is decoded; inner messages are left to `decode`.
#[derive(Debug, Clone)]
pub struct PacketLineCodec {
    /// Bytes already scanned for a terminator without finding one
    next_index: usize,
    max_length: usize,
    policy: MalformedLinePolicy,
    /// Dropping an oversized line until its terminator shows up
    is_discarding: bool,
}

impl PacketLineCodec {
    pub fn new() -> Self {
        Self::with_policy(MalformedLinePolicy::default())
    }

    pub fn with_policy(policy: MalformedLinePolicy) -> Self {
        Self {
            next_index: 0,
            max_length: MAX_LINE_LENGTH,
            policy,
            is_discarding: false,
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for PacketLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one line without its terminator
fn parse_line(line: &[u8]) -> Result<Packet, CodecError> {
    let bytes = BASE64_STANDARD
        .decode(line)
        .map_err(CodecError::MalformedBase64Line)?;
    bincode::deserialize(&bytes).map_err(CodecError::MalformedEnvelope)
}

impl Decoder for PacketLineCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let read_to = cmp::min(self.max_length.saturating_add(1), buf.len());
            let newline = buf[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match (self.is_discarding, newline) {
                (true, Some(offset)) => {
                    buf.advance(self.next_index + offset + 1);
                    self.is_discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    buf.advance(read_to);
                    self.next_index = 0;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let newline_index = self.next_index + offset;
                    self.next_index = 0;

                    let line = &buf[..newline_index];
                    let line = line.strip_suffix(b"\r").unwrap_or(line);

                    match parse_line(line) {
                        Ok(packet) => {
                            buf.advance(newline_index + 1);
                            return Ok(Some(packet));
                        }
                        Err(err) => match self.policy {
                            MalformedLinePolicy::Skip => {
                                tracing::warn!(
                                    error = %err,
                                    line_len = line.len(),
                                    "Dropping malformed packet line"
                                );
                                buf.advance(newline_index + 1);
                            }
                            MalformedLinePolicy::Stall => return Err(err),
                        },
                    }
                }
                (false, None) if buf.len() > self.max_length => {
                    self.is_discarding = true;
                    self.next_index = 0;
                    return Err(CodecError::LineTooLong {
                        max: self.max_length,
                    });
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }
}

impl<'a> Encoder<&'a Packet> for PacketLineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &'a Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let data = bincode::serialize(item).map_err(CodecError::Serialize)?;
        let line = BASE64_STANDARD.encode(data);

        if line.len() > self.max_length {
            return Err(CodecError::MessageTooLarge {
                size: line.len(),
                max: self.max_length,
            });
        }

        dst.reserve(line.len() + 1);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::InboundEvent;
    use crate::types::*;

    fn edit_buffer_message() -> InboundMessage {
        InboundMessage::event(
            "session-1",
            InboundEvent::EditBuffer(EditBufferHook {
                context: Some(ShellContext {
                    pid: Some(123),
                    shell_path: Some("/bin/zsh".into()),
                    current_working_directory: Some("/home/user".into()),
                    environment_variables: vec![EnvironmentVariable::new("TERM", "xterm")],
                    ..ShellContext::default()
                }),
                text: "git sta".into(),
                cursor: 7,
                histno: 12,
                terminal_cursor_coordinates: Some(CursorCoordinates { x: 9, y: 3 }),
            }),
        )
    }

    fn line_of(packet: &Packet) -> String {
        let mut codec = PacketLineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(packet, &mut buf).unwrap();
        String::from_utf8(buf.to_vec()).unwrap()
    }

    #[test]
    fn test_inbound_roundtrip_uncompressed() {
        let message = edit_buffer_message();
        let packet = encode_inbound(&message, PacketOptions::default()).unwrap();
        assert_eq!(packet.compression(), Ok(Compression::None));
        assert_eq!(decode_inbound(&packet).unwrap(), message);
    }

    #[test]
    fn test_inbound_roundtrip_gzip() {
        let message = edit_buffer_message();
        let packet = encode_inbound(&message, PacketOptions::gzip()).unwrap();
        assert_eq!(packet.compression(), Ok(Compression::Gzip));
        // gzip magic
        assert_eq!(&packet.inner[..2], &[0x1f, 0x8b]);
        assert_eq!(decode_inbound(&packet).unwrap(), message);
    }

    #[test]
    fn test_inbound_roundtrip_all_events() {
        let context = ShellContext {
            pid: Some(4242),
            shell_path: Some("/bin/bash".into()),
            ..ShellContext::default()
        };
        let events = vec![
            edit_buffer_message().event,
            InboundEvent::Prompt(PromptHook {
                context: Some(context.clone()),
            }),
            InboundEvent::PreExec(PreExecHook {
                context: Some(context.clone()),
                command: Some("cargo build".into()),
            }),
            InboundEvent::PostExec(PostExecHook {
                context: Some(context.clone()),
                command: Some("cargo build".into()),
                exit_code: Some(101),
            }),
            InboundEvent::InterceptedKey(InterceptedKeyHook {
                context: Some(context),
                action: "autocomplete.accept".into(),
                key: Some("tab".into()),
            }),
            InboundEvent::RunProcessResponse(RunProcessResponse {
                stdout: "main\n".into(),
                stderr: String::new(),
                exit_code: 0,
            }),
            InboundEvent::Pong,
        ];

        for event in events {
            let unsolicited = InboundMessage::event("session-2", event.clone());
            let reply = InboundMessage {
                session_id: None,
                in_reply_to: Some(RequestId(3)),
                event,
            };
            for message in [unsolicited, reply] {
                for options in [PacketOptions::default(), PacketOptions::gzip()] {
                    let packet = encode_inbound(&message, options).unwrap();
                    assert_eq!(packet.compression(), Ok(options.compression()));
                    assert_eq!(decode_inbound(&packet).unwrap(), message);
                }
            }
        }
    }

    #[test]
    fn test_outbound_roundtrip_all_requests() {
        let requests = vec![
            OutboundRequest::InsertText(InsertTextRequest::text("ls -la")),
            OutboundRequest::InsertText(InsertTextRequest {
                insertion: None,
                deletion: Some(3),
                offset: Some(-1),
                immediate: Some(true),
                insertion_buffer: Some("echo hi".into()),
                insert_during_command: Some(false),
            }),
            OutboundRequest::SetBuffer(SetBufferRequest::new("git commit")),
            OutboundRequest::SetBuffer(SetBufferRequest {
                text: String::new(),
                cursor_position: Some(0),
            }),
            OutboundRequest::Intercept(InterceptRequest::SetIntercepts {
                intercept_bound_keystrokes: true,
                intercept_global_keystrokes: false,
                actions: vec![Action {
                    identifier: "autocomplete.accept".into(),
                    default_bindings: vec!["tab".into()],
                }],
                override_actions: false,
            }),
            OutboundRequest::Intercept(InterceptRequest::SetVisible { visible: true }),
            OutboundRequest::RunProcess(RunProcessRequest::new("git", ["status", "--short"])),
        ];

        for (i, request) in requests.into_iter().enumerate() {
            for options in [PacketOptions::default(), PacketOptions::gzip()] {
                let packet = encode_outbound(
                    RequestId(i as u64),
                    SessionId::new("abcdef"),
                    request.clone(),
                    options,
                )
                .unwrap();
                let decoded = decode_outbound(&packet).unwrap();
                assert_eq!(decoded.id, RequestId(i as u64));
                assert_eq!(decoded.session_id, Some(SessionId::new("abcdef")));
                assert_eq!(decoded.request, request);
            }
        }
    }

    #[test]
    fn test_ping_roundtrip() {
        let packet = encode(&OutboundMessage::ping(RequestId(9)), PacketOptions::default()).unwrap();
        let decoded = decode_outbound(&packet).unwrap();
        assert_eq!(decoded, OutboundMessage::ping(RequestId(9)));
    }

    #[test]
    fn test_version_mismatch() {
        let mut packet = encode_inbound(&edit_buffer_message(), PacketOptions::default()).unwrap();
        packet.version = PROTOCOL_VERSION + 1;
        let result = decode_inbound(&packet);
        assert!(matches!(
            result,
            Err(CodecError::VersionMismatch { expected, found })
                if expected == PROTOCOL_VERSION && found == PROTOCOL_VERSION + 1
        ));
    }

    #[test]
    fn test_unsupported_compression() {
        let mut packet = encode_inbound(&edit_buffer_message(), PacketOptions::default()).unwrap();
        packet.compression = 7;
        assert!(matches!(
            decode_inbound(&packet),
            Err(CodecError::UnsupportedCompression(7))
        ));
    }

    #[test]
    fn test_decode_failure_on_garbage_inner() {
        let packet = Packet::new(Compression::None, vec![0xff; 3]);
        assert!(matches!(
            decode_inbound(&packet),
            Err(CodecError::DecodeFailure(_))
        ));
    }

    #[test]
    fn test_empty_inner_is_decode_failure() {
        let packet = Packet::new(Compression::None, Vec::new());
        assert!(matches!(
            decode_inbound(&packet),
            Err(CodecError::DecodeFailure(_))
        ));
    }

    #[test]
    fn test_gzip_flag_with_plain_bytes_fails() {
        let packet = Packet::new(Compression::Gzip, b"not gzip".to_vec());
        assert!(matches!(
            decode_inbound(&packet),
            Err(CodecError::Compression(_))
        ));
    }

    #[test]
    fn test_line_ends_with_single_newline() {
        let packet = Packet::new(Compression::None, vec![1, 2, 3]);
        let line = line_of(&packet);
        assert!(line.ends_with('\n'));
        assert!(!line.ends_with("\r\n"));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_line_decode_roundtrip() {
        let packet = Packet::new(Compression::None, vec![1, 2, 3]);
        let mut buf = BytesMut::from(line_of(&packet).as_str());
        let mut codec = PacketLineCodec::new();
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(packet));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_crlf_and_lf_decode_identically() {
        let packet = Packet::new(Compression::Gzip, vec![4, 5, 6]);
        let lf = line_of(&packet);
        let crlf = format!("{}\r\n", lf.trim_end_matches('\n'));

        let mut codec = PacketLineCodec::new();
        let a = codec.decode(&mut BytesMut::from(lf.as_str())).unwrap();
        let b = codec.decode(&mut BytesMut::from(crlf.as_str())).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Some(packet));
    }

    #[test]
    fn test_partial_line_returns_none() {
        let packet = Packet::new(Compression::None, vec![7; 40]);
        let line = line_of(&packet);
        let (head, tail) = line.split_at(10);

        let mut codec = PacketLineCodec::new();
        let mut buf = BytesMut::from(head);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), head.len());

        buf.extend_from_slice(tail.as_bytes());
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(packet));
    }

    #[test]
    fn test_skip_policy_drops_malformed_line() {
        let packet = Packet::new(Compression::None, vec![1]);
        let input = format!("not*base64\n{}", line_of(&packet));

        let mut codec = PacketLineCodec::with_policy(MalformedLinePolicy::Skip);
        let mut buf = BytesMut::from(input.as_str());
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(packet));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_stall_policy_keeps_malformed_line() {
        let packet = Packet::new(Compression::None, vec![1]);
        let input = format!("not*base64\n{}", line_of(&packet));

        let mut codec = PacketLineCodec::with_policy(MalformedLinePolicy::Stall);
        let mut buf = BytesMut::from(input.as_str());
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::MalformedBase64Line(_)));
        assert!(err.is_malformed_line());
        assert_eq!(buf.len(), input.len());

        // Stays stuck on the same line
        assert!(codec.decode(&mut buf).is_err());
        assert_eq!(buf.len(), input.len());
    }

    #[test]
    fn test_missing_padding_is_malformed() {
        let mut codec = PacketLineCodec::with_policy(MalformedLinePolicy::Stall);
        let mut buf = BytesMut::from("QUI\n");
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::MalformedBase64Line(_))
        ));
    }

    #[test]
    fn test_valid_base64_bad_envelope() {
        let mut codec = PacketLineCodec::with_policy(MalformedLinePolicy::Stall);
        // "ABC" is too short for an envelope
        let mut buf = BytesMut::from("QUJD\n");
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_line_too_long_then_resync() {
        let packet = Packet::new(Compression::None, vec![1]);
        let line = line_of(&packet);
        let mut codec = PacketLineCodec::new().with_max_length(line.len() + 8);

        let mut buf = BytesMut::from("A".repeat(line.len() + 20).as_str());
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::LineTooLong { .. })
        ));

        buf.extend_from_slice(b"AAAA\n");
        buf.extend_from_slice(line.as_bytes());
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(packet));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_rejects_oversized_line() {
        let packet = Packet::new(Compression::None, vec![0; 64]);
        let mut codec = PacketLineCodec::new().with_max_length(16);
        let mut buf = BytesMut::new();
        assert!(matches!(
            codec.encode(&packet, &mut buf),
            Err(CodecError::MessageTooLarge { max: 16, .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_multiple_lines_in_buffer() {
        let packets: Vec<Packet> = (0..3)
            .map(|i| Packet::new(Compression::None, vec![i; 5]))
            .collect();
        let input: String = packets.iter().map(line_of).collect();

        let mut codec = PacketLineCodec::new();
        let mut buf = BytesMut::from(input.as_str());
        for expected in &packets {
            assert_eq!(codec.decode(&mut buf).unwrap().as_ref(), Some(expected));
        }
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
