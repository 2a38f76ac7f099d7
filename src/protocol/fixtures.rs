//! Server-side packet builders shared by protocol and engine tests.
use crate::col::Column;
use crate::constant::{
    CAPABILITIES_ALWAYS_ENABLED, CAPABILITIES_CONFIGURABLE, CapabilityFlags, ColumnFlags,
    ColumnType, ServerStatusFlags,
};
use crate::protocol::command::column_definition::write_column_definition;
use crate::protocol::primitive::*;

pub fn column(name: &str, column_type: ColumnType) -> Column {
    let (collation_id, length) = match column_type {
        ColumnType::MYSQL_TYPE_VAR_STRING | ColumnType::MYSQL_TYPE_STRING => (45, 255),
        _ => (63, 11),
    };
    Column {
        schema: "test".to_string(),
        table: "t".to_string(),
        org_table: "t".to_string(),
        name: name.to_string(),
        org_name: name.to_string(),
        collation_id,
        length,
        column_type,
        flags: ColumnFlags::empty(),
        decimals: 0,
    }
}

pub fn column_definition(column: &Column) -> Vec<u8> {
    let mut out = Vec::new();
    write_column_definition(&mut out, column);
    out
}

pub fn column_count(count: u64) -> Vec<u8> {
    let mut out = Vec::new();
    write_int_lenenc(&mut out, count);
    out
}

pub fn ok(affected_rows: u64, last_insert_id: u64, status: ServerStatusFlags) -> Vec<u8> {
    ok_with_header(0x00, affected_rows, last_insert_id, status)
}

/// The OK packet that ends rows under CLIENT_DEPRECATE_EOF
pub fn ok_eof(status: ServerStatusFlags) -> Vec<u8> {
    ok_with_header(0xFE, 0, 0, status)
}

fn ok_with_header(
    header: u8,
    affected_rows: u64,
    last_insert_id: u64,
    status: ServerStatusFlags,
) -> Vec<u8> {
    let mut out = vec![header];
    write_int_lenenc(&mut out, affected_rows);
    write_int_lenenc(&mut out, last_insert_id);
    write_int_2(&mut out, status.bits());
    write_int_2(&mut out, 0);
    out
}

pub fn eof(status: ServerStatusFlags) -> Vec<u8> {
    let mut out = vec![0xFE];
    write_int_2(&mut out, 0);
    write_int_2(&mut out, status.bits());
    out
}

pub fn err(code: u16, sql_state: &str, message: &str) -> Vec<u8> {
    let mut out = vec![0xFF];
    write_int_2(&mut out, code);
    out.push(b'#');
    out.extend_from_slice(sql_state.as_bytes());
    out.extend_from_slice(message.as_bytes());
    out
}

pub fn text_row(fields: &[Option<&str>]) -> Vec<u8> {
    let mut out = Vec::new();
    for field in fields {
        match field {
            Some(text) => write_string_lenenc(&mut out, text),
            None => out.push(0xFB),
        }
    }
    out
}

pub fn prepare_ok(statement_id: u32, num_columns: u16, num_params: u16) -> Vec<u8> {
    let mut out = vec![0x00];
    write_int_4(&mut out, statement_id);
    write_int_2(&mut out, num_columns);
    write_int_2(&mut out, num_params);
    out.push(0);
    write_int_2(&mut out, 0);
    out
}

/// Everything a modern server advertises, TLS included
pub fn server_capabilities() -> CapabilityFlags {
    CAPABILITIES_ALWAYS_ENABLED | CAPABILITIES_CONFIGURABLE
}

pub fn seed() -> [u8; 20] {
    std::array::from_fn(|i| i as u8 + 1)
}

/// Protocol 10 initial handshake
pub fn greeting(caps: CapabilityFlags, plugin: &str) -> Vec<u8> {
    let seed = seed();
    let mut out = vec![10];
    write_string_null(&mut out, "11.4.2-MariaDB");
    write_int_4(&mut out, 42);
    out.extend_from_slice(&seed[..8]);
    out.push(0);
    write_int_2(&mut out, caps.bits() as u16);
    out.push(45);
    write_int_2(&mut out, ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT.bits());
    write_int_2(&mut out, (caps.bits() >> 16) as u16);
    out.push(21);
    out.extend_from_slice(&[0; 10]);
    out.extend_from_slice(&seed[8..]);
    out.push(0);
    write_string_null(&mut out, plugin);
    out
}

pub fn auth_switch(plugin: &str, data: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFE];
    write_string_null(&mut out, plugin);
    out.extend_from_slice(data);
    out.push(0);
    out
}

/// 1024-bit key, small enough to keep tests fast
pub const RSA_PUBLIC_KEY: &str = "-----BEGIN PUBLIC KEY-----
MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQC/vrGQAOiio4mvy+WfMoGjM5b7
UCRDtJ4GJLqpcQRTFdXlqUVu8WhNbJQv+4QFeB6168jvIq0y0aMoPEqlxSc541bb
Lz3SQDJVyI7L2HOZBrNdyNlEmwgI4Rg7agdMaaUuvrMPi+43MMJmJHdkX4qD4QWE
ZxE2z5gjydE52p7N6wIDAQAB
-----END PUBLIC KEY-----
";
