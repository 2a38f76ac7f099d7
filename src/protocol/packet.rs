use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constant::MAX_PACKET_PAYLOAD;
use crate::error::{Error, Result};

/// MySQL packet header (zero-copy)
///
/// Layout matches MySQL wire protocol:
/// - length: 3 bytes (little-endian, payload length)
/// - sequence_id: 1 byte
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct PacketHeader {
    pub length: [u8; 3],
    pub sequence_id: u8,
}

impl PacketHeader {
    pub fn encode(length: usize, sequence_id: u8) -> Self {
        let len = u32::to_le_bytes(length as u32);
        Self {
            length: [len[0], len[1], len[2]],
            sequence_id,
        }
    }

    pub fn length(&self) -> usize {
        u32::from_le_bytes([self.length[0], self.length[1], self.length[2], 0]) as usize
    }
}

/// Split `payload` into wire packets appended to `out`.
///
/// `sequence` is the id of the first packet and is left pointing at the id
/// that follows the last packet written. A payload whose length is an exact
/// multiple of `max_payload` ends with an empty packet so the reader can tell
/// it is complete.
pub fn write_packets(out: &mut BytesMut, payload: &[u8], sequence: &mut u8, max_payload: usize) {
    out.reserve(payload.len() + 4 * (payload.len() / max_payload + 1));
    let mut rest = payload;
    loop {
        let chunk_len = rest.len().min(max_payload);
        let header = PacketHeader::encode(chunk_len, *sequence);
        out.put_slice(header.as_bytes());
        out.put_slice(&rest[..chunk_len]);
        *sequence = sequence.wrapping_add(1);
        rest = &rest[chunk_len..];
        if chunk_len < max_payload {
            break;
        }
    }
}

/// Frames logical payloads and reassembles inbound packets.
///
/// The decoder checks every inbound sequence id against the expected one and
/// concatenates consecutive maximum-sized packets into a single payload. The
/// encoder shares the same counter, so a strict request/response exchange
/// (the handshake) can alternate reads and writes without bookkeeping.
#[derive(Debug)]
pub struct PacketCodec {
    sequence: u8,
    max_payload: usize,
    partial: BytesMut,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PACKET_PAYLOAD)
    }

    /// Use a smaller split point than the protocol maximum.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            sequence: 0,
            max_payload: max_payload.clamp(1, MAX_PACKET_PAYLOAD),
            partial: BytesMut::new(),
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// The sequence id expected on the next inbound packet.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn set_sequence(&mut self, sequence: u8) {
        self.sequence = sequence;
    }

    /// Frame a payload starting at sequence id 0, as every command does.
    ///
    /// Returns the sequence id the server will use for its first reply.
    pub fn write_command(&self, out: &mut BytesMut, payload: &[u8]) -> u8 {
        let mut sequence = 0;
        write_packets(out, payload, &mut sequence, self.max_payload);
        sequence
    }
}

impl Decoder for PacketCodec {
    type Item = BytesMut;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let Some(header) = src.get(..4).and_then(|h| PacketHeader::read_from_bytes(h).ok())
            else {
                return Ok(None);
            };

            if header.sequence_id != self.sequence {
                return Err(Error::PacketOutOfOrder {
                    expected: self.sequence,
                    actual: header.sequence_id,
                });
            }

            let length = header.length();
            if length > self.max_payload {
                return Err(Error::ProtocolError(format!(
                    "packet length {length} exceeds maximum {}",
                    self.max_payload
                )));
            }
            if src.len() < 4 + length {
                src.reserve(4 + length - src.len());
                return Ok(None);
            }

            src.advance(4);
            let chunk = src.split_to(length);
            self.sequence = self.sequence.wrapping_add(1);
            tracing::trace!(length, sequence = header.sequence_id, "packet received");

            if length == self.max_payload {
                self.partial.extend_from_slice(&chunk);
                continue;
            }

            if self.partial.is_empty() {
                return Ok(Some(chunk));
            }
            self.partial.extend_from_slice(&chunk);
            return Ok(Some(std::mem::take(&mut self.partial)));
        }
    }
}

impl<'a> Encoder<&'a [u8]> for PacketCodec {
    type Error = Error;

    fn encode(&mut self, payload: &'a [u8], dst: &mut BytesMut) -> Result<()> {
        let mut sequence = self.sequence;
        write_packets(dst, payload, &mut sequence, self.max_payload);
        self.sequence = sequence;
        Ok(())
    }
}
