use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};

use crate::constant::ColumnType;
use crate::decode::to_session_time;
use crate::error::{Error, Result};
use crate::opts::Timezone;
use crate::protocol::primitive::*;
use crate::value::Value;

/// Trait for encoding a single parameter in prepared statements
pub trait Param {
    /// Returns true if this parameter is NULL
    fn is_null(&self) -> bool {
        false
    }

    /// Encode parameter type
    ///
    /// Format:
    /// - Byte 0: MySQL type (MYSQL_TYPE_*)
    /// - Byte 1: Unsigned flag (0x80 if unsigned, 0x00 otherwise)
    fn encode_type(&self, out: &mut Vec<u8>);

    /// Encode parameter value (binary encoded)
    ///
    /// Only called if is_null() returns false. Date-times are written as
    /// wall-clock time in `timezone`.
    fn encode_value(&self, out: &mut Vec<u8>, timezone: Timezone) -> Result<()>;
}

impl Param for Value {
    fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn encode_type(&self, out: &mut Vec<u8>) {
        let (column_type, unsigned) = match self {
            Value::Null => (ColumnType::MYSQL_TYPE_NULL, false),
            Value::Bool(_) => (ColumnType::MYSQL_TYPE_TINY, false),
            Value::Int(_) => (ColumnType::MYSQL_TYPE_LONGLONG, false),
            Value::UInt(_) => (ColumnType::MYSQL_TYPE_LONGLONG, true),
            Value::Float(_) => (ColumnType::MYSQL_TYPE_FLOAT, false),
            Value::Double(_) => (ColumnType::MYSQL_TYPE_DOUBLE, false),
            Value::Decimal(_) => (ColumnType::MYSQL_TYPE_NEWDECIMAL, false),
            Value::String(_) => (ColumnType::MYSQL_TYPE_VAR_STRING, false),
            Value::Bytes(_) => (ColumnType::MYSQL_TYPE_BLOB, false),
            Value::Date(_) => (ColumnType::MYSQL_TYPE_DATE, false),
            Value::DateTime(_) => (ColumnType::MYSQL_TYPE_DATETIME, false),
            Value::Time(_) => (ColumnType::MYSQL_TYPE_TIME, false),
        };
        out.push(column_type as u8);
        out.push(if unsigned { 0x80 } else { 0x00 });
    }

    fn encode_value(&self, out: &mut Vec<u8>, timezone: Timezone) -> Result<()> {
        match self {
            Value::Null => {}
            Value::Bool(b) => write_int_1(out, u8::from(*b)),
            Value::Int(i) => write_int_8(out, *i as u64),
            Value::UInt(u) => write_int_8(out, *u),
            Value::Float(f) => write_int_4(out, f.to_bits()),
            Value::Double(d) => write_int_8(out, d.to_bits()),
            Value::Decimal(s) | Value::String(s) => write_string_lenenc(out, s),
            Value::Bytes(b) => write_bytes_lenenc(out, b),
            Value::Date(d) => write_date(out, d)?,
            Value::DateTime(dt) => write_datetime(out, &to_session_time(dt, timezone))?,
            Value::Time(t) => write_time(out, *t)?,
        }
        Ok(())
    }
}

fn year(date: &NaiveDate) -> Result<u16> {
    u16::try_from(date.year())
        .map_err(|_| Error::InvalidParams(format!("year {} is out of range", date.year())))
}

fn write_date(out: &mut Vec<u8>, date: &NaiveDate) -> Result<()> {
    let year = year(date)?;
    write_int_1(out, 4);
    write_int_2(out, year);
    write_int_1(out, date.month() as u8);
    write_int_1(out, date.day() as u8);
    Ok(())
}

fn write_datetime(out: &mut Vec<u8>, datetime: &NaiveDateTime) -> Result<()> {
    let year = year(&datetime.date())?;
    // leap seconds are folded into the last microsecond of the second
    let micros = (datetime.nanosecond() / 1_000).min(999_999);
    write_int_1(out, if micros == 0 { 7 } else { 11 });
    write_int_2(out, year);
    write_int_1(out, datetime.month() as u8);
    write_int_1(out, datetime.day() as u8);
    write_int_1(out, datetime.hour() as u8);
    write_int_1(out, datetime.minute() as u8);
    write_int_1(out, datetime.second() as u8);
    if micros != 0 {
        write_int_4(out, micros);
    }
    Ok(())
}

fn write_time(out: &mut Vec<u8>, time: TimeDelta) -> Result<()> {
    let negative = time < TimeDelta::zero();
    let abs = time.abs();
    let total_seconds = abs.num_seconds();
    let days = u32::try_from(total_seconds / 86_400)
        .map_err(|_| Error::InvalidParams(format!("time {time} is out of range")))?;
    let micros = abs.subsec_nanos() as u32 / 1_000;

    write_int_1(out, if micros == 0 { 8 } else { 12 });
    write_int_1(out, u8::from(negative));
    write_int_4(out, days);
    write_int_1(out, ((total_seconds % 86_400) / 3_600) as u8);
    write_int_1(out, ((total_seconds % 3_600) / 60) as u8);
    write_int_1(out, (total_seconds % 60) as u8);
    if micros != 0 {
        write_int_4(out, micros);
    }
    Ok(())
}

/// Parameter block of COM_STMT_EXECUTE
pub trait Params {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write NULL bitmap
    ///
    /// The NULL bitmap is (num_params + 7) / 8 bytes long.
    /// Bit is set to 1 if the parameter is NULL.
    fn write_null_bitmap(&self, out: &mut Vec<u8>);

    /// Write parameter types, 2 bytes each
    fn write_types(&self, out: &mut Vec<u8>);

    /// Write non-NULL parameter values (binary encoded)
    fn write_values(&self, out: &mut Vec<u8>, timezone: Timezone) -> Result<()>;
}

impl<P: Param> Params for [P] {
    fn len(&self) -> usize {
        <[P]>::len(self)
    }

    fn write_null_bitmap(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.resize(start + self.len().div_ceil(8), 0);
        for (idx, param) in self.iter().enumerate() {
            if param.is_null() {
                out[start + idx / 8] |= 1 << (idx % 8);
            }
        }
    }

    fn write_types(&self, out: &mut Vec<u8>) {
        for param in self {
            param.encode_type(out);
        }
    }

    fn write_values(&self, out: &mut Vec<u8>, timezone: Timezone) -> Result<()> {
        for param in self.iter().filter(|p| !p.is_null()) {
            param.encode_value(out, timezone)?;
        }
        Ok(())
    }
}
