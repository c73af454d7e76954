//! Streaming packet reader
//!
//! Transport deliveries can split a line anywhere, so chunks are appended to
//! a buffer and only complete lines are decoded.

use std::cmp;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::{CodecError, MalformedLinePolicy, PacketLineCodec};
use crate::packet::Packet;

/// Reassembles packets from arbitrarily fragmented text chunks
#[derive(Debug, Default)]
pub struct PacketReader {
    buffer: BytesMut,
    codec: PacketLineCodec,
    stalled: bool,
}

impl PacketReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: MalformedLinePolicy) -> Self {
        Self::with_codec(PacketLineCodec::with_policy(policy))
    }

    /// Use a custom line codec (e.g. a smaller line limit)
    pub fn with_codec(codec: PacketLineCodec) -> Self {
        Self {
            buffer: BytesMut::new(),
            codec,
            stalled: false,
        }
    }

    /// Append a chunk and return every packet it completed, in wire order
    ///
    /// A malformed line under `MalformedLinePolicy::Stall` stops processing
    /// and stays at the front of the buffer. While stalled, later input is
    /// kept only up to the codec's line limit and the rest is dropped.
    pub fn feed(&mut self, chunk: &str) -> Vec<Packet> {
        if self.stalled {
            self.append_stalled(chunk.as_bytes());
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk.as_bytes());

        let mut packets = Vec::new();
        loop {
            match self.codec.decode(&mut self.buffer) {
                Ok(Some(packet)) => packets.push(packet),
                Ok(None) => break,
                Err(err @ CodecError::LineTooLong { .. }) => {
                    tracing::warn!(error = %err, "Discarding oversized line");
                }
                Err(err) if err.is_malformed_line() => {
                    tracing::warn!(
                        error = %err,
                        buffered = self.buffer.len(),
                        "Packet reader stalled on malformed line"
                    );
                    self.stalled = true;
                    break;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Packet reader failed");
                    break;
                }
            }
        }
        packets
    }

    fn append_stalled(&mut self, bytes: &[u8]) {
        let room = self.codec.max_length().saturating_sub(self.buffer.len());
        let kept = cmp::min(room, bytes.len());
        self.buffer.extend_from_slice(&bytes[..kept]);
        if kept < bytes.len() {
            tracing::debug!(dropped = bytes.len() - kept, "Stalled reader is full");
        }
    }

    /// True once a malformed line has stopped the reader
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Bytes held back waiting for a terminator (or stalled)
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
