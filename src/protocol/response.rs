use crate::constant::ServerStatusFlags;
use crate::error::{Error, Result};
use crate::protocol::primitive::*;
use zerocopy::byteorder::little_endian::U16 as U16LE;
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Payload of an OK packet, or of the OK-shaped 0xFE packet that terminates
/// a result set when CLIENT_DEPRECATE_EOF is negotiated.
#[derive(Debug, Clone, Copy)]
pub struct OkPayloadBytes<'a>(pub &'a [u8]);

#[derive(Debug, Clone, Copy)]
pub struct ErrPayloadBytes<'a>(pub &'a [u8]);

/// OK packet response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OkPayload {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: ServerStatusFlags,
    pub warnings: u16,
    pub info: String,
}

impl TryFrom<OkPayloadBytes<'_>> for OkPayload {
    type Error = Error;

    fn try_from(bytes: OkPayloadBytes<'_>) -> Result<Self> {
        let (header, data) = read_int_1(bytes.0)?;
        if header != 0x00 && header != 0xFE {
            return Err(Error::InvalidPacket);
        }

        let (affected_rows, rest) = read_int_lenenc(data)?;
        let (last_insert_id, rest) = read_int_lenenc(rest)?;
        let (status_flags, rest) = read_int_2(rest)?;
        let (warnings, rest) = read_int_2(rest)?;

        // without CLIENT_SESSION_TRACK the info string runs to the end of the packet
        let info = String::from_utf8_lossy(rest).into_owned();

        Ok(OkPayload {
            affected_rows,
            last_insert_id,
            status_flags: ServerStatusFlags::from_bits_truncate(status_flags),
            warnings,
            info,
        })
    }
}

/// ERR packet response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ERROR {} ({}): {}", self.error_code, self.sql_state, self.message)]
pub struct ErrPayload {
    pub error_code: u16,
    pub sql_state: String,
    pub message: String,
}

impl TryFrom<ErrPayloadBytes<'_>> for ErrPayload {
    type Error = Error;

    fn try_from(bytes: ErrPayloadBytes<'_>) -> Result<Self> {
        let (header, data) = read_int_1(bytes.0)?;
        if header != 0xFF {
            return Err(Error::InvalidPacket);
        }

        let (error_code, data) = read_int_2(data)?;

        let (sql_state, rest) = match data.split_first() {
            Some((b'#', rest)) => {
                let (state_bytes, rest) = read_string_fix(rest, 5)?;
                (String::from_utf8_lossy(state_bytes).into_owned(), rest)
            }
            _ => (String::new(), data),
        };

        Ok(ErrPayload {
            error_code,
            sql_state,
            message: String::from_utf8_lossy(rest).into_owned(),
        })
    }
}

/// EOF packet response (zero-copy)
///
/// Layout after header byte 0xFE:
/// - warnings: 2 bytes (little-endian)
/// - status_flags: 2 bytes (little-endian)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct EofPacket {
    pub warnings: U16LE,
    pub status_flags: U16LE,
}

impl EofPacket {
    pub fn status_flags(&self) -> ServerStatusFlags {
        ServerStatusFlags::from_bits_truncate(self.status_flags.get())
    }

    pub fn warnings(&self) -> u16 {
        self.warnings.get()
    }
}

/// Read EOF packet (header byte 0xFE, length < 9) - zero-copy
pub fn read_eof_packet(payload: &[u8]) -> Result<&EofPacket> {
    let (header, data) = read_int_1(payload)?;
    if header != 0xFE {
        return Err(Error::InvalidPacket);
    }
    let (eof, _) = EofPacket::ref_from_prefix(data).map_err(|_| Error::UnexpectedEof)?;
    Ok(eof)
}

/// Whether a payload is the 0xFE packet that ends a row stream.
///
/// A row can also begin with 0xFE (an 8-byte length prefix), but such a row
/// is at least 9 bytes long while an EOF is 5 and an OK-as-EOF stays well
/// below the maximum packet size.
pub fn is_end_of_rows(payload: &[u8], deprecate_eof: bool) -> bool {
    match payload.first() {
        Some(0xFE) if deprecate_eof => payload.len() < crate::constant::MAX_PACKET_PAYLOAD,
        Some(0xFE) => payload.len() < 9,
        _ => false,
    }
}

/// Status flags and warnings from whatever terminated a result set.
pub fn read_terminator(payload: &[u8], deprecate_eof: bool) -> Result<OkPayload> {
    if deprecate_eof {
        OkPayload::try_from(OkPayloadBytes(payload))
    } else {
        let eof = read_eof_packet(payload)?;
        Ok(OkPayload {
            status_flags: eof.status_flags(),
            warnings: eof.warnings(),
            ..Default::default()
        })
    }
}
