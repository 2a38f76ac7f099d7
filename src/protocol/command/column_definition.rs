use crate::col::Column;
use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Payload of a column definition packet
#[derive(Debug, Clone, Copy)]
pub struct ColumnDefinitionBytes<'a>(pub &'a [u8]);

/// Fixed-size tail of Column Definition packet (12 bytes)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct ColumnDefinitionTail {
    charset: U16LE,
    column_length: U32LE,
    column_type: u8,
    flags: U16LE,
    decimals: u8,
    reserved: U16LE,
}

impl ColumnDefinitionTail {
    pub fn charset(&self) -> u16 {
        self.charset.get()
    }

    pub fn column_length(&self) -> u32 {
        self.column_length.get()
    }

    pub fn column_type(&self) -> Result<ColumnType> {
        ColumnType::from_u8(self.column_type).ok_or_else(|| {
            Error::ProtocolError(format!("unknown column type: 0x{:02X}", self.column_type))
        })
    }

    pub fn flags(&self) -> ColumnFlags {
        ColumnFlags::from_bits_truncate(self.flags.get())
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }
}

fn utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl TryFrom<ColumnDefinitionBytes<'_>> for Column {
    type Error = Error;

    fn try_from(bytes: ColumnDefinitionBytes<'_>) -> Result<Self> {
        let data = bytes.0;

        let (_catalog, data) = read_string_lenenc(data)?;
        let (schema, data) = read_string_lenenc(data)?;
        let (table, data) = read_string_lenenc(data)?;
        let (org_table, data) = read_string_lenenc(data)?;
        let (name, data) = read_string_lenenc(data)?;
        let (org_name, data) = read_string_lenenc(data)?;

        // length of the fixed fields, always 0x0c
        let (_length, data) = read_int_lenenc(data)?;
        let (tail, _) =
            ColumnDefinitionTail::ref_from_prefix(data).map_err(|_| Error::UnexpectedEof)?;

        Ok(Column {
            schema: utf8(schema),
            table: utf8(table),
            org_table: utf8(org_table),
            name: utf8(name),
            org_name: utf8(org_name),
            collation_id: tail.charset(),
            length: tail.column_length(),
            column_type: tail.column_type()?,
            flags: tail.flags(),
            decimals: tail.decimals(),
        })
    }
}

/// Encode a column definition; the inverse of parsing, used by tests.
#[cfg(test)]
pub fn write_column_definition(out: &mut Vec<u8>, column: &Column) {
    write_string_lenenc(out, "def");
    write_string_lenenc(out, &column.schema);
    write_string_lenenc(out, &column.table);
    write_string_lenenc(out, &column.org_table);
    write_string_lenenc(out, &column.name);
    write_string_lenenc(out, &column.org_name);
    write_int_lenenc(out, 0x0c);
    write_int_2(out, column.collation_id);
    write_int_4(out, column.length);
    write_int_1(out, column.column_type as u8);
    write_int_2(out, column.flags.bits());
    write_int_1(out, column.decimals);
    write_int_2(out, 0);
}
