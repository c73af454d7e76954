//! Wire envelope wrapping every inner message

use std::ops::RangeInclusive;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::PROTOCOL_VERSION;

/// Nonce length is drawn uniformly from this range for every packet
pub const NONCE_LEN: RangeInclusive<usize> = 9..=16;

/// Compression applied to a packet's `inner` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum Compression {
    #[default]
    None = 0,
    Gzip = 1,
}

impl Compression {
    /// Value stored in `Packet::compression`
    pub fn wire_value(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Compression {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Gzip),
            other => Err(other),
        }
    }
}

/// Options applied when encoding a message into a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketOptions {
    pub gzip: bool,
}

impl PacketOptions {
    pub fn gzip() -> Self {
        Self { gzip: true }
    }

    pub fn compression(&self) -> Compression {
        if self.gzip {
            Compression::Gzip
        } else {
            Compression::None
        }
    }
}

/// The versioned envelope sent as one base64 line
///
/// `compression` keeps the raw wire value so that an unknown scheme survives
/// framing and is rejected per packet by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub version: u32,
    pub compression: u32,
    pub nonce: Vec<u8>,
    pub inner: Vec<u8>,
}

impl Packet {
    /// Stamp a fresh envelope around already-encoded `inner` bytes
    pub fn new(compression: Compression, inner: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            compression: compression.wire_value(),
            nonce: nonce(),
            inner,
        }
    }

    /// Decoded compression scheme, or the unknown wire value
    pub fn compression(&self) -> Result<Compression, u32> {
        Compression::try_from(self.compression)
    }
}

/// Generate a random freshness marker
pub fn nonce() -> Vec<u8> {
    let mut rng = rand::rng();
    let len = rng.random_range(NONCE_LEN);
    let mut nonce = vec![0u8; len];
    rng.fill(&mut nonce[..]);
    nonce
}
