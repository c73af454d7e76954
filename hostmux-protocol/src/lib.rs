//! hostmux-protocol: wire protocol between a terminal host and its UI
//!
//! Every message travels as a [`Packet`] envelope, serialized with bincode,
//! base64 encoded and terminated by a newline. The envelope carries a
//! protocol version, a compression scheme, a random nonce and the encoded
//! inner message.
//!
//! Layers, bottom-up:
//! - [`socket`]: normalizes frame and text transports into one text socket
//! - [`codec`]: envelope encode/decode and the line codec
//! - [`reader`] / [`writer`]: streaming reassembly and framed sends
//! - [`stream`]: reader and writer bound to one socket

pub mod codec;
pub mod messages;
pub mod packet;
pub mod reader;
pub mod socket;
pub mod stream;
pub mod types;
pub mod writer;

// Re-export main types at crate root
pub use codec::{CodecError, MalformedLinePolicy, PacketLineCodec, MAX_LINE_LENGTH};
pub use messages::{
    InboundEvent, InboundMessage, OutboundMessage, OutboundRequest, RequestId, SessionId,
};
pub use packet::{Compression, Packet, PacketOptions};
pub use reader::PacketReader;
pub use socket::{Frame, Socket, SocketError, SocketEvent, SocketEvents, SocketHandle, SocketKind};
pub use stream::PacketStream;
pub use types::{
    Action, CursorCoordinates, EditBufferHook, EnvironmentVariable, InsertTextRequest,
    InterceptRequest, InterceptedKeyHook, PostExecHook, PreExecHook, PromptHook,
    RunProcessRequest, RunProcessResponse, SetBufferRequest, ShellContext,
};
pub use writer::PacketWriter;

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 0;
