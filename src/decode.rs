//! Column value decoding for both wire encodings.
//!
//! Every column type maps to one [`Kind`]; the text and binary decoders both
//! dispatch on that kind so the option flags behave identically whichever
//! protocol produced the row.
use std::collections::HashMap;

use chrono::{
    DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone,
};
use simdutf8::basic::from_utf8;

use crate::col::Column;
use crate::constant::ColumnType;
use crate::error::{Error, Result};
use crate::opts::{DecodeOptions, Timezone};
use crate::protocol::primitive::read_string_lenenc;
use crate::protocol::value::{BinaryValue, DateParts, NullBitmap, TimeParts};
use crate::row::Row;
use crate::value::Value;

/// Decode category of a column type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Null,
    Bool,
    Integer,
    BigInt,
    Float,
    Double,
    Decimal,
    Date,
    DateTime,
    Time,
    /// BIT(n) with n > 1
    Bits,
    Text,
    Bytes,
}

impl Kind {
    pub fn of(column: &Column) -> Self {
        match column.column_type {
            ColumnType::MYSQL_TYPE_NULL => Kind::Null,
            ColumnType::MYSQL_TYPE_TINY if column.length == 1 => Kind::Bool,
            ColumnType::MYSQL_TYPE_TINY
            | ColumnType::MYSQL_TYPE_SHORT
            | ColumnType::MYSQL_TYPE_INT24
            | ColumnType::MYSQL_TYPE_LONG
            | ColumnType::MYSQL_TYPE_YEAR => Kind::Integer,
            ColumnType::MYSQL_TYPE_LONGLONG => Kind::BigInt,
            ColumnType::MYSQL_TYPE_FLOAT => Kind::Float,
            ColumnType::MYSQL_TYPE_DOUBLE => Kind::Double,
            ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => Kind::Decimal,
            ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => Kind::Date,
            ColumnType::MYSQL_TYPE_DATETIME
            | ColumnType::MYSQL_TYPE_DATETIME2
            | ColumnType::MYSQL_TYPE_TIMESTAMP
            | ColumnType::MYSQL_TYPE_TIMESTAMP2 => Kind::DateTime,
            ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => Kind::Time,
            ColumnType::MYSQL_TYPE_BIT if column.length == 1 => Kind::Bool,
            ColumnType::MYSQL_TYPE_BIT => Kind::Bits,
            ColumnType::MYSQL_TYPE_JSON => Kind::Text,
            ColumnType::MYSQL_TYPE_VARCHAR
            | ColumnType::MYSQL_TYPE_VAR_STRING
            | ColumnType::MYSQL_TYPE_STRING
            | ColumnType::MYSQL_TYPE_ENUM
            | ColumnType::MYSQL_TYPE_SET
            | ColumnType::MYSQL_TYPE_TINY_BLOB
            | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
            | ColumnType::MYSQL_TYPE_LONG_BLOB
            | ColumnType::MYSQL_TYPE_BLOB => {
                if column.is_binary() {
                    Kind::Bytes
                } else {
                    Kind::Text
                }
            }
            ColumnType::MYSQL_TYPE_GEOMETRY | ColumnType::MYSQL_TYPE_TYPED_ARRAY => Kind::Bytes,
        }
    }
}

/// Per-result-set decoding state: the column list and its kinds.
#[derive(Debug, Clone)]
pub struct RowDecoder {
    columns: std::sync::Arc<[Column]>,
    kinds: Vec<Kind>,
    options: DecodeOptions,
}

impl RowDecoder {
    pub fn new(columns: std::sync::Arc<[Column]>, options: DecodeOptions) -> Self {
        let kinds = columns.iter().map(Kind::of).collect();
        Self {
            columns,
            kinds,
            options,
        }
    }

    pub fn columns(&self) -> &std::sync::Arc<[Column]> {
        &self.columns
    }

    /// Decode a text protocol row: one length-encoded string or 0xFB per column.
    pub fn decode_text(&self, payload: &[u8]) -> Result<Row> {
        let mut values = Vec::with_capacity(self.columns.len());
        let mut data = payload;
        for (column, kind) in self.columns.iter().zip(&self.kinds) {
            if let Some((0xFB, rest)) = data.split_first() {
                values.push(Value::Null);
                data = rest;
                continue;
            }
            let (bytes, rest) = read_string_lenenc(data)?;
            values.push(text_value(column, *kind, bytes, &self.options)?);
            data = rest;
        }
        Ok(self.build_row(values))
    }

    /// Decode a binary protocol row: 0x00, NULL bitmap, then non-NULL values.
    pub fn decode_binary(&self, payload: &[u8]) -> Result<Row> {
        let Some((0x00, data)) = payload.split_first() else {
            return Err(Error::InvalidPacket);
        };
        let bitmap_len = NullBitmap::len_for(self.columns.len(), 2);
        if data.len() < bitmap_len {
            return Err(Error::UnexpectedEof);
        }
        let (bitmap, mut data) = data.split_at(bitmap_len);
        let null_bitmap = NullBitmap::for_result_set(bitmap);

        let mut values = Vec::with_capacity(self.columns.len());
        for (idx, (column, kind)) in self.columns.iter().zip(&self.kinds).enumerate() {
            if null_bitmap.is_null(idx) {
                values.push(Value::Null);
                continue;
            }
            let (raw, rest) = BinaryValue::parse(column, data)?;
            values.push(binary_value(column, *kind, raw, &self.options)?);
            data = rest;
        }
        Ok(self.build_row(values))
    }

    /// Later columns overwrite earlier ones with the same key.
    fn build_row(&self, values: Vec<Value>) -> Row {
        if self.options.rows_as_array {
            Row::Positional(values)
        } else if self.options.nest_tables {
            let mut tables: HashMap<String, HashMap<String, Value>> = HashMap::new();
            for (column, value) in self.columns.iter().zip(values) {
                tables
                    .entry(column.table.clone())
                    .or_default()
                    .insert(column.name.clone(), value);
            }
            Row::Nested(tables)
        } else {
            Row::Named(
                self.columns
                    .iter()
                    .map(|c| c.name.clone())
                    .zip(values)
                    .collect(),
            )
        }
    }
}

fn raw_text(column: &Column, bytes: &[u8]) -> Value {
    if column.is_binary() {
        return Value::Bytes(bytes.to_vec());
    }
    match from_utf8(bytes) {
        Ok(s) => Value::String(s.to_string()),
        Err(_) => Value::Bytes(bytes.to_vec()),
    }
}

fn ascii<'a>(column: &Column, bytes: &'a [u8]) -> Result<&'a str> {
    from_utf8(bytes).map_err(|_| {
        Error::ProtocolError(format!("non-text value in numeric column `{}`", column.name))
    })
}

fn parse_num<T: std::str::FromStr>(column: &Column, bytes: &[u8]) -> Result<T> {
    let text = ascii(column, bytes)?;
    text.parse().map_err(|_| {
        Error::ProtocolError(format!("invalid number `{text}` in column `{}`", column.name))
    })
}

fn integer(column: &Column, bytes: &[u8]) -> Result<Value> {
    if column.is_unsigned() {
        parse_num(column, bytes).map(Value::UInt)
    } else {
        parse_num(column, bytes).map(Value::Int)
    }
}

fn text_value(column: &Column, kind: Kind, bytes: &[u8], opts: &DecodeOptions) -> Result<Value> {
    if !opts.type_cast {
        return Ok(raw_text(column, bytes));
    }
    match kind {
        Kind::Null => Ok(Value::Null),
        Kind::Bool => {
            if column.column_type == ColumnType::MYSQL_TYPE_BIT {
                Ok(Value::Bool(bytes.iter().any(|b| *b != 0)))
            } else {
                let n: i64 = parse_num(column, bytes)?;
                Ok(Value::Bool(n != 0))
            }
        }
        Kind::Integer => integer(column, bytes),
        Kind::BigInt if opts.big_number_strings => {
            Ok(Value::String(ascii(column, bytes)?.to_string()))
        }
        Kind::BigInt => integer(column, bytes),
        Kind::Float => parse_num(column, bytes).map(Value::Float),
        Kind::Double => parse_num(column, bytes).map(Value::Double),
        Kind::Decimal if opts.big_number_strings || opts.support_big_numbers => {
            Ok(Value::Decimal(ascii(column, bytes)?.to_string()))
        }
        Kind::Decimal => parse_num(column, bytes).map(Value::Double),
        Kind::Date | Kind::DateTime | Kind::Time if opts.date_strings => {
            Ok(Value::String(ascii(column, bytes)?.to_string()))
        }
        Kind::Date => {
            let text = ascii(column, bytes)?;
            if is_zero_date(text) {
                return Ok(Value::Null);
            }
            Ok(NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(Value::Date)
                .unwrap_or_else(|_| Value::String(text.to_string())))
        }
        Kind::DateTime => {
            let text = ascii(column, bytes)?;
            if is_zero_date(text) {
                return Ok(Value::Null);
            }
            Ok(NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                .map(|naive| Value::DateTime(with_timezone(naive, opts.timezone)))
                .unwrap_or_else(|_| Value::String(text.to_string())))
        }
        Kind::Time => {
            let text = ascii(column, bytes)?;
            parse_time(text).map(Value::Time).ok_or_else(|| {
                Error::ProtocolError(format!("invalid time `{text}` in column `{}`", column.name))
            })
        }
        Kind::Bits | Kind::Bytes => Ok(Value::Bytes(bytes.to_vec())),
        Kind::Text => Ok(raw_text(column, bytes)),
    }
}

fn binary_value(
    column: &Column,
    kind: Kind,
    raw: BinaryValue<'_>,
    opts: &DecodeOptions,
) -> Result<Value> {
    if !opts.type_cast {
        return Ok(render(column, raw));
    }
    let value = match (kind, raw) {
        (Kind::Null, _) | (_, BinaryValue::Null) => Value::Null,
        (Kind::Bool, BinaryValue::Bytes(bits)) => Value::Bool(bits.iter().any(|b| *b != 0)),
        (Kind::Bool, BinaryValue::SignedInt(n)) => Value::Bool(n != 0),
        (Kind::Bool, BinaryValue::UnsignedInt(n)) => Value::Bool(n != 0),
        (Kind::BigInt, BinaryValue::SignedInt(n)) if opts.big_number_strings => {
            Value::String(n.to_string())
        }
        (Kind::BigInt, BinaryValue::UnsignedInt(n)) if opts.big_number_strings => {
            Value::String(n.to_string())
        }
        (_, BinaryValue::SignedInt(n)) => Value::Int(n),
        (_, BinaryValue::UnsignedInt(n)) => Value::UInt(n),
        (_, BinaryValue::Float(f)) => Value::Float(f),
        (_, BinaryValue::Double(d)) => Value::Double(d),
        (Kind::Decimal, BinaryValue::Bytes(bytes)) => {
            if opts.big_number_strings || opts.support_big_numbers {
                Value::Decimal(ascii(column, bytes)?.to_string())
            } else {
                Value::Double(parse_num(column, bytes)?)
            }
        }
        (Kind::Date | Kind::DateTime | Kind::Time, raw) if opts.date_strings => render(column, raw),
        (Kind::Date, raw) => match raw.date_parts() {
            Some(parts) if parts == DateParts::default() => Value::Null,
            Some(parts) => match naive_date(&parts) {
                Some(date) => Value::Date(date),
                None => render(column, raw),
            },
            None => return Err(mismatch(column)),
        },
        (Kind::DateTime, raw) => match raw.date_parts() {
            Some(parts) if parts == DateParts::default() => Value::Null,
            Some(parts) => match naive_datetime(&parts) {
                Some(naive) => Value::DateTime(with_timezone(naive, opts.timezone)),
                None => render(column, raw),
            },
            None => return Err(mismatch(column)),
        },
        (Kind::Time, raw) => match raw.time_parts() {
            Some(parts) => Value::Time(time_delta(&parts)),
            None => return Err(mismatch(column)),
        },
        (Kind::Bits | Kind::Bytes, BinaryValue::Bytes(bytes)) => Value::Bytes(bytes.to_vec()),
        (Kind::Text, BinaryValue::Bytes(bytes)) => raw_text(column, bytes),
        _ => return Err(mismatch(column)),
    };
    Ok(value)
}

fn mismatch(column: &Column) -> Error {
    Error::ProtocolError(format!(
        "value layout does not match type {:?} of column `{}`",
        column.column_type, column.name
    ))
}

/// The text form the server would have sent for this value.
fn render(column: &Column, raw: BinaryValue<'_>) -> Value {
    let text = match raw {
        BinaryValue::Null => return Value::Null,
        BinaryValue::SignedInt(n) => n.to_string(),
        BinaryValue::UnsignedInt(n) => n.to_string(),
        BinaryValue::Float(f) => f.to_string(),
        BinaryValue::Double(d) => d.to_string(),
        BinaryValue::Bytes(bytes) => return raw_text(column, bytes),
        BinaryValue::Timestamp0
        | BinaryValue::Timestamp4(_)
        | BinaryValue::Timestamp7(_)
        | BinaryValue::Timestamp11(_) => {
            let parts = raw.date_parts().unwrap_or_default();
            let date = format!("{:04}-{:02}-{:02}", parts.year, parts.month, parts.day);
            if Kind::of(column) == Kind::Date {
                date
            } else {
                format!(
                    "{date} {:02}:{:02}:{:02}{}",
                    parts.hour,
                    parts.minute,
                    parts.second,
                    fraction(parts.microsecond, column.decimals)
                )
            }
        }
        BinaryValue::Time0 | BinaryValue::Time8(_) | BinaryValue::Time12(_) => {
            let parts = raw.time_parts().unwrap_or_default();
            let hours = u64::from(parts.days) * 24 + u64::from(parts.hour);
            format!(
                "{}{hours:02}:{:02}:{:02}{}",
                if parts.negative { "-" } else { "" },
                parts.minute,
                parts.second,
                fraction(parts.microsecond, column.decimals)
            )
        }
    };
    Value::String(text)
}

fn fraction(microsecond: u32, decimals: u8) -> String {
    let digits = usize::from(decimals.min(6));
    if digits == 0 {
        return String::new();
    }
    let full = format!("{microsecond:06}");
    format!(".{}", &full[..digits])
}

fn is_zero_date(text: &str) -> bool {
    text.starts_with("0000-00-00")
}

fn naive_date(parts: &DateParts) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        i32::from(parts.year),
        u32::from(parts.month),
        u32::from(parts.day),
    )
}

fn naive_datetime(parts: &DateParts) -> Option<NaiveDateTime> {
    let time = NaiveTime::from_hms_micro_opt(
        u32::from(parts.hour),
        u32::from(parts.minute),
        u32::from(parts.second),
        parts.microsecond,
    )?;
    Some(naive_date(parts)?.and_time(time))
}

fn time_delta(parts: &TimeParts) -> TimeDelta {
    let seconds = i64::from(parts.days) * 86_400
        + i64::from(parts.hour) * 3_600
        + i64::from(parts.minute) * 60
        + i64::from(parts.second);
    let delta = TimeDelta::seconds(seconds) + TimeDelta::microseconds(i64::from(parts.microsecond));
    if parts.negative { -delta } else { delta }
}

/// Parse `[-]H+:MM:SS[.ffffff]`, the text form of TIME.
pub(crate) fn parse_time(text: &str) -> Option<TimeDelta> {
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let mut fields = text.splitn(3, ':');
    let hours: i64 = fields.next()?.parse().ok()?;
    let minutes: i64 = fields.next()?.parse().ok()?;
    let seconds = fields.next()?;
    let (seconds, micros) = match seconds.split_once('.') {
        Some((whole, frac)) => {
            let digits = frac.len().min(6);
            let value: i64 = frac.get(..digits)?.parse().ok()?;
            (whole, value * 10_i64.pow((6 - digits) as u32))
        }
        None => (seconds, 0),
    };
    let seconds: i64 = seconds.parse().ok()?;
    let delta = TimeDelta::seconds(hours * 3_600 + minutes * 60 + seconds)
        + TimeDelta::microseconds(micros);
    Some(if negative { -delta } else { delta })
}

/// Place a wall-clock value read from the server into the session timezone.
pub fn with_timezone(naive: NaiveDateTime, timezone: Timezone) -> DateTime<FixedOffset> {
    let placed = match timezone {
        Timezone::Offset(millis) => FixedOffset::east_opt((millis / 1000) as i32)
            .and_then(|offset| offset.from_local_datetime(&naive).single()),
        Timezone::Local => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.fixed_offset()),
    };
    // wall-clock times skipped by a DST jump have no local instant
    placed.unwrap_or_else(|| naive.and_utc().fixed_offset())
}

/// The wall-clock form of `value` in the session timezone, for parameters.
pub fn to_session_time(value: &DateTime<FixedOffset>, timezone: Timezone) -> NaiveDateTime {
    match timezone {
        Timezone::Offset(millis) => match FixedOffset::east_opt((millis / 1000) as i32) {
            Some(offset) => value.with_timezone(&offset).naive_local(),
            None => value.naive_utc(),
        },
        Timezone::Local => value.with_timezone(&Local).naive_local(),
    }
}
