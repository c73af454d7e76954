//! Packet writer: frames packets and hands them to the socket

use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::codec::{CodecError, PacketLineCodec};
use crate::packet::Packet;
use crate::socket::SocketHandle;

/// Writes one framed line per packet
///
/// Cheap to clone; clones share the underlying socket.
#[derive(Debug, Clone)]
pub struct PacketWriter {
    socket: SocketHandle,
    codec: PacketLineCodec,
}

impl PacketWriter {
    pub fn new(socket: SocketHandle) -> Self {
        Self {
            socket,
            codec: PacketLineCodec::new(),
        }
    }

    /// Frame `packet` and send it as exactly one socket message
    pub fn write(&self, packet: &Packet) -> Result<(), CodecError> {
        let mut codec = self.codec.clone();
        let mut buf = BytesMut::new();
        codec.encode(packet, &mut buf)?;

        // base64 output is always ASCII
        let line = String::from_utf8_lossy(&buf).into_owned();
        self.socket.send(line)?;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.socket.is_active()
    }

    pub fn socket(&self) -> &SocketHandle {
        &self.socket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Compression;
    use crate::reader::PacketReader;
    use crate::socket::{memory_pair, SocketEvent};

    #[tokio::test]
    async fn test_one_message_per_write() {
        let (left, mut right) = memory_pair();
        let writer = PacketWriter::new(left.handle());

        let a = Packet::new(Compression::None, vec![1, 2, 3]);
        let b = Packet::new(Compression::Gzip, vec![4, 5]);
        writer.write(&a).unwrap();
        writer.write(&b).unwrap();

        let mut reader = PacketReader::new();
        for expected in [a, b] {
            let Some(SocketEvent::Message(text)) = right.recv().await else {
                panic!("expected a message");
            };
            assert!(text.ends_with('\n'));
            assert_eq!(text.matches('\n').count(), 1);
            assert_eq!(reader.feed(&text), vec![expected]);
        }
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (left, _right) = memory_pair();
        let writer = PacketWriter::new(left.handle());
        left.close();

        let err = writer
            .write(&Packet::new(Compression::None, Vec::new()))
            .unwrap_err();
        assert!(matches!(err, CodecError::Socket(_)));
        assert!(!writer.is_active());
    }
}
