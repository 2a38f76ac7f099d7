//! Binary protocol value layouts
use crate::col::Column;
use crate::constant::ColumnType;
use crate::error::{Error, Result};
use crate::protocol::primitive::*;
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// A value as laid out in a binary row, before any type mapping
#[derive(Debug, Clone, Copy)]
pub enum BinaryValue<'a> {
    Null,
    SignedInt(i64),
    UnsignedInt(u64),
    Float(f32),
    Double(f64),
    /// DATE/DATETIME/TIMESTAMP - 0 bytes (0000-00-00 00:00:00)
    Timestamp0,
    /// DATE/DATETIME/TIMESTAMP - 4 bytes (ymd)
    Timestamp4(&'a Timestamp4),
    /// DATE/DATETIME/TIMESTAMP - 7 bytes (ymd + hms)
    Timestamp7(&'a Timestamp7),
    /// DATE/DATETIME/TIMESTAMP - 11 bytes (ymd + hms + microseconds)
    Timestamp11(&'a Timestamp11),
    /// TIME - 0 bytes (00:00:00)
    Time0,
    Time8(&'a Time8),
    Time12(&'a Time12),
    /// Everything sent length-encoded: strings, blobs, decimals, bits, json
    Bytes(&'a [u8]),
}

fn fixed<'a, T: FromBytes + KnownLayout + Immutable>(data: &'a [u8]) -> Result<(&'a T, &'a [u8])> {
    T::ref_from_prefix(data).map_err(|_| Error::UnexpectedEof)
}

impl<'a> BinaryValue<'a> {
    /// Parse a single binary protocol value based on the column's type and flags
    ///
    /// Returns the parsed value and the remaining bytes
    pub fn parse(column: &Column, data: &'a [u8]) -> Result<(Self, &'a [u8])> {
        let is_unsigned = column.is_unsigned();

        match column.column_type {
            ColumnType::MYSQL_TYPE_NULL => Ok((BinaryValue::Null, data)),

            ColumnType::MYSQL_TYPE_TINY => {
                let (val, rest) = read_int_1(data)?;
                let value = if is_unsigned {
                    BinaryValue::UnsignedInt(val as u64)
                } else {
                    BinaryValue::SignedInt(val as i8 as i64)
                };
                Ok((value, rest))
            }

            ColumnType::MYSQL_TYPE_SHORT | ColumnType::MYSQL_TYPE_YEAR => {
                let (val, rest) = read_int_2(data)?;
                let value = if is_unsigned {
                    BinaryValue::UnsignedInt(val as u64)
                } else {
                    BinaryValue::SignedInt(val as i16 as i64)
                };
                Ok((value, rest))
            }

            ColumnType::MYSQL_TYPE_INT24 | ColumnType::MYSQL_TYPE_LONG => {
                let (val, rest) = read_int_4(data)?;
                let value = if is_unsigned {
                    BinaryValue::UnsignedInt(val as u64)
                } else {
                    BinaryValue::SignedInt(val as i32 as i64)
                };
                Ok((value, rest))
            }

            ColumnType::MYSQL_TYPE_LONGLONG => {
                let (val, rest) = read_int_8(data)?;
                let value = if is_unsigned {
                    BinaryValue::UnsignedInt(val)
                } else {
                    BinaryValue::SignedInt(val as i64)
                };
                Ok((value, rest))
            }

            ColumnType::MYSQL_TYPE_FLOAT => {
                let (val, rest) = read_int_4(data)?;
                Ok((BinaryValue::Float(f32::from_bits(val)), rest))
            }

            ColumnType::MYSQL_TYPE_DOUBLE => {
                let (val, rest) = read_int_8(data)?;
                Ok((BinaryValue::Double(f64::from_bits(val)), rest))
            }

            ColumnType::MYSQL_TYPE_DATE
            | ColumnType::MYSQL_TYPE_DATETIME
            | ColumnType::MYSQL_TYPE_TIMESTAMP
            | ColumnType::MYSQL_TYPE_TIMESTAMP2
            | ColumnType::MYSQL_TYPE_DATETIME2
            | ColumnType::MYSQL_TYPE_NEWDATE => {
                let (len, rest) = read_int_1(data)?;
                match len {
                    0 => Ok((BinaryValue::Timestamp0, rest)),
                    4 => {
                        let (ts, rest) = fixed(rest)?;
                        Ok((BinaryValue::Timestamp4(ts), rest))
                    }
                    7 => {
                        let (ts, rest) = fixed(rest)?;
                        Ok((BinaryValue::Timestamp7(ts), rest))
                    }
                    11 => {
                        let (ts, rest) = fixed(rest)?;
                        Ok((BinaryValue::Timestamp11(ts), rest))
                    }
                    _ => Err(Error::ProtocolError(format!(
                        "invalid timestamp length: {len}"
                    ))),
                }
            }

            ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => {
                let (len, rest) = read_int_1(data)?;
                match len {
                    0 => Ok((BinaryValue::Time0, rest)),
                    8 => {
                        let (time, rest) = fixed(rest)?;
                        Ok((BinaryValue::Time8(time), rest))
                    }
                    12 => {
                        let (time, rest) = fixed(rest)?;
                        Ok((BinaryValue::Time12(time), rest))
                    }
                    _ => Err(Error::ProtocolError(format!("invalid time length: {len}"))),
                }
            }

            ColumnType::MYSQL_TYPE_VARCHAR
            | ColumnType::MYSQL_TYPE_VAR_STRING
            | ColumnType::MYSQL_TYPE_STRING
            | ColumnType::MYSQL_TYPE_BLOB
            | ColumnType::MYSQL_TYPE_TINY_BLOB
            | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
            | ColumnType::MYSQL_TYPE_LONG_BLOB
            | ColumnType::MYSQL_TYPE_GEOMETRY
            | ColumnType::MYSQL_TYPE_JSON
            | ColumnType::MYSQL_TYPE_DECIMAL
            | ColumnType::MYSQL_TYPE_NEWDECIMAL
            | ColumnType::MYSQL_TYPE_ENUM
            | ColumnType::MYSQL_TYPE_SET
            | ColumnType::MYSQL_TYPE_BIT
            | ColumnType::MYSQL_TYPE_TYPED_ARRAY => {
                let (bytes, rest) = read_string_lenenc(data)?;
                Ok((BinaryValue::Bytes(bytes), rest))
            }
        }
    }
}

/// DATE/DATETIME/TIMESTAMP with date only
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct Timestamp4 {
    pub year: U16LE,
    pub month: u8,
    pub day: u8,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct Timestamp7 {
    pub year: U16LE,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct Timestamp11 {
    pub year: U16LE,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub microsecond: U32LE,
}

/// TIME without microseconds
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct Time8 {
    pub is_negative: u8,
    pub days: U32LE,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// TIME with microseconds
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct Time12 {
    pub is_negative: u8,
    pub days: U32LE,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub microsecond: U32LE,
}

/// Calendar fields shared by the three timestamp layouts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateParts {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub microsecond: u32,
}

/// Clock fields shared by the two time layouts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeParts {
    pub negative: bool,
    pub days: u32,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub microsecond: u32,
}

impl BinaryValue<'_> {
    pub fn date_parts(&self) -> Option<DateParts> {
        match *self {
            BinaryValue::Timestamp0 => Some(DateParts::default()),
            BinaryValue::Timestamp4(ts) => Some(DateParts {
                year: ts.year.get(),
                month: ts.month,
                day: ts.day,
                ..Default::default()
            }),
            BinaryValue::Timestamp7(ts) => Some(DateParts {
                year: ts.year.get(),
                month: ts.month,
                day: ts.day,
                hour: ts.hour,
                minute: ts.minute,
                second: ts.second,
                microsecond: 0,
            }),
            BinaryValue::Timestamp11(ts) => Some(DateParts {
                year: ts.year.get(),
                month: ts.month,
                day: ts.day,
                hour: ts.hour,
                minute: ts.minute,
                second: ts.second,
                microsecond: ts.microsecond.get(),
            }),
            _ => None,
        }
    }

    pub fn time_parts(&self) -> Option<TimeParts> {
        match *self {
            BinaryValue::Time0 => Some(TimeParts::default()),
            BinaryValue::Time8(t) => Some(TimeParts {
                negative: t.is_negative != 0,
                days: t.days.get(),
                hour: t.hour,
                minute: t.minute,
                second: t.second,
                microsecond: 0,
            }),
            BinaryValue::Time12(t) => Some(TimeParts {
                negative: t.is_negative != 0,
                days: t.days.get(),
                hour: t.hour,
                minute: t.minute,
                second: t.second,
                microsecond: t.microsecond.get(),
            }),
            _ => None,
        }
    }
}

/// NULL bitmap for binary protocol
///
/// For result sets (COM_STMT_EXECUTE response), the bitmap has an offset of 2 bits.
/// For prepared statement parameters, the offset is 0 bits.
#[derive(Debug, Clone, Copy)]
pub struct NullBitmap<'a> {
    bitmap: &'a [u8],
    offset: usize,
}

impl<'a> NullBitmap<'a> {
    pub fn for_result_set(bitmap: &'a [u8]) -> Self {
        Self { bitmap, offset: 2 }
    }

    pub fn for_parameters(bitmap: &'a [u8]) -> Self {
        Self { bitmap, offset: 0 }
    }

    /// Bytes needed for `num_columns` entries
    pub fn len_for(num_columns: usize, offset: usize) -> usize {
        (num_columns + offset).div_ceil(8)
    }

    pub fn is_null(&self, idx: usize) -> bool {
        let bit_pos = idx + self.offset;
        let byte_pos = bit_pos >> 3;
        let bit_offset = bit_pos & 7;

        match self.bitmap.get(byte_pos) {
            Some(byte) => (byte & (1 << bit_offset)) != 0,
            None => false,
        }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bitmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::ColumnFlags;

    fn column(column_type: ColumnType, flags: ColumnFlags) -> Column {
        Column {
            schema: String::new(),
            table: String::new(),
            org_table: String::new(),
            name: "c".to_string(),
            org_name: "c".to_string(),
            collation_id: 63,
            length: 0,
            column_type,
            flags,
            decimals: 0,
        }
    }

    #[test]
    fn test_value_parse_signed_integers() {
        let col = column(ColumnType::MYSQL_TYPE_TINY, ColumnFlags::empty());
        let (value, rest) = BinaryValue::parse(&col, &[214u8]).unwrap();
        assert!(matches!(value, BinaryValue::SignedInt(-42)));
        assert_eq!(rest.len(), 0);

        let col = column(ColumnType::MYSQL_TYPE_LONG, ColumnFlags::empty());
        let (value, _) = BinaryValue::parse(&col, &[0x60, 0x79, 0xFE, 0xFF]).unwrap();
        assert!(matches!(value, BinaryValue::SignedInt(-100000)));
    }

    #[test]
    fn test_value_parse_unsigned_integers() {
        let col = column(ColumnType::MYSQL_TYPE_LONGLONG, ColumnFlags::UNSIGNED_FLAG);
        let data = [0xFF; 8];
        let (value, rest) = BinaryValue::parse(&col, &data).unwrap();
        assert!(matches!(value, BinaryValue::UnsignedInt(u64::MAX)));
        assert_eq!(rest.len(), 0);
    }

    #[test]
    fn test_value_parse_timestamp() {
        let col = column(ColumnType::MYSQL_TYPE_DATETIME, ColumnFlags::empty());

        let (value, _) = BinaryValue::parse(&col, &[0]).unwrap();
        assert_eq!(value.date_parts(), Some(DateParts::default()));

        let mut data = vec![11u8];
        data.extend_from_slice(&2024u16.to_le_bytes());
        data.extend_from_slice(&[12, 25, 15, 30, 45]);
        data.extend_from_slice(&123_456u32.to_le_bytes());
        let (value, rest) = BinaryValue::parse(&col, &data).unwrap();
        assert_eq!(
            value.date_parts(),
            Some(DateParts {
                year: 2024,
                month: 12,
                day: 25,
                hour: 15,
                minute: 30,
                second: 45,
                microsecond: 123_456,
            })
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn test_value_parse_truncated_timestamp() {
        let col = column(ColumnType::MYSQL_TYPE_DATE, ColumnFlags::empty());
        assert!(matches!(
            BinaryValue::parse(&col, &[4, 0xE8, 0x07, 1]),
            Err(Error::UnexpectedEof)
        ));
        assert!(matches!(
            BinaryValue::parse(&col, &[5, 0, 0, 0, 0, 0]),
            Err(Error::ProtocolError(_))
        ));
    }

    #[test]
    fn test_value_parse_time() {
        let col = column(ColumnType::MYSQL_TYPE_TIME, ColumnFlags::empty());
        let mut data = vec![8u8, 1];
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&[12, 30, 45]);
        let (value, rest) = BinaryValue::parse(&col, &data).unwrap();
        let parts = value.time_parts().unwrap();
        assert!(parts.negative);
        assert_eq!(parts.days, 1);
        assert_eq!((parts.hour, parts.minute, parts.second), (12, 30, 45));
        assert!(rest.is_empty());
    }

    #[test]
    fn test_value_parse_with_remaining_data() {
        let col = column(ColumnType::MYSQL_TYPE_VAR_STRING, ColumnFlags::empty());
        let data = [5u8, b'H', b'e', b'l', b'l', b'o', 0xFF];
        let (value, rest) = BinaryValue::parse(&col, &data).unwrap();
        assert!(matches!(value, BinaryValue::Bytes(b"Hello")));
        assert_eq!(rest, &[0xFF]);
    }

    #[test]
    fn test_null_bitmap_result_set() {
        let bitmap = [0b00000100, 0b00010000];
        let null_bitmap = NullBitmap::for_result_set(&bitmap);

        assert!(null_bitmap.is_null(0));
        assert!(!null_bitmap.is_null(1));
        assert!(!null_bitmap.is_null(2));
        assert!(null_bitmap.is_null(10));
        assert!(!null_bitmap.is_null(40));
    }

    #[test]
    fn test_null_bitmap_parameters() {
        let bitmap = [0b00000101];
        let null_bitmap = NullBitmap::for_parameters(&bitmap);

        assert!(null_bitmap.is_null(0));
        assert!(!null_bitmap.is_null(1));
        assert!(null_bitmap.is_null(2));
        assert!(!null_bitmap.is_null(3));
        assert_eq!(NullBitmap::len_for(7, 2), 2);
        assert_eq!(NullBitmap::len_for(6, 2), 1);
    }
}
