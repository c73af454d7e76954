//! Packet stream: a socket paired with a reader and a writer

use std::collections::VecDeque;

use crate::codec::{CodecError, MalformedLinePolicy};
use crate::packet::Packet;
use crate::reader::PacketReader;
use crate::socket::{Socket, SocketEvent, SocketEvents, SocketHandle};
use crate::writer::PacketWriter;

/// Bidirectional packet channel over a [`Socket`]
#[derive(Debug)]
pub struct PacketStream {
    reader: PacketReader,
    events: SocketEvents,
    writer: PacketWriter,
    ready: VecDeque<Packet>,
}

impl PacketStream {
    pub fn new(socket: Socket) -> Self {
        Self::with_reader(socket, PacketReader::new())
    }

    pub fn with_policy(socket: Socket, policy: MalformedLinePolicy) -> Self {
        Self::with_reader(socket, PacketReader::with_policy(policy))
    }

    pub fn with_reader(socket: Socket, reader: PacketReader) -> Self {
        let (handle, events) = socket.split();
        Self {
            reader,
            events,
            writer: PacketWriter::new(handle),
            ready: VecDeque::new(),
        }
    }

    /// Next complete packet in wire order
    ///
    /// Returns `None` once the socket has closed; packets already completed
    /// before the close are still returned first.
    pub async fn next_packet(&mut self) -> Option<Packet> {
        loop {
            if let Some(packet) = self.ready.pop_front() {
                return Some(packet);
            }

            match self.events.recv().await? {
                SocketEvent::Message(chunk) => {
                    self.ready.extend(self.reader.feed(&chunk));
                }
                SocketEvent::Closed => {
                    if self.reader.buffered() > 0 {
                        tracing::debug!(
                            buffered = self.reader.buffered(),
                            "Socket closed with a partial line buffered"
                        );
                    }
                    return None;
                }
            }
        }
    }

    pub fn write(&self, packet: &Packet) -> Result<(), CodecError> {
        self.writer.write(packet)
    }

    /// Clonable writer for sending from other tasks
    pub fn writer(&self) -> PacketWriter {
        self.writer.clone()
    }

    pub fn handle(&self) -> SocketHandle {
        self.writer.socket().clone()
    }

    pub fn close(&self) {
        self.writer.socket().close()
    }
}
