use crate::constant::CommandByte;
use crate::error::{Error, Result};
use crate::protocol::primitive::*;
use crate::protocol::response::{ErrPayloadBytes, OkPayload, OkPayloadBytes};

/// Write COM_QUIT command
pub fn write_quit(out: &mut Vec<u8>) {
    write_int_1(out, CommandByte::Quit as u8);
}

/// Write COM_PING command
pub fn write_ping(out: &mut Vec<u8>) {
    write_int_1(out, CommandByte::Ping as u8);
}

/// Read the single OK or ERR packet answering a simple command
pub fn read_ok_response(payload: &[u8]) -> Result<OkPayload> {
    match payload.first() {
        Some(0x00) => OkPayload::try_from(OkPayloadBytes(payload)),
        Some(0xFF) => Err(ErrPayloadBytes(payload).into()),
        _ => Err(Error::InvalidPacket),
    }
}
