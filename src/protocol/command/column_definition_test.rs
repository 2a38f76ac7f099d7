use std::mem::size_of;

use zerocopy::FromBytes;

use crate::col::Column;
use crate::constant::{ColumnFlags, ColumnType};
use crate::error::Error;
use crate::protocol::command::column_definition::{
    ColumnDefinitionBytes, ColumnDefinitionTail, write_column_definition,
};

#[test]
fn test_column_definition_tail_size() {
    assert_eq!(size_of::<ColumnDefinitionTail>(), 12);
}

#[test]
fn test_column_definition_tail_with_flags() {
    let data: [u8; 12] = [
        0x21, 0x00, // charset = 33
        0xFF, 0x00, 0x00, 0x00, // column_length = 255
        0x01, // column_type = 1 (TINYINT)
        0x21, 0x00, // flags = NOT_NULL_FLAG | UNSIGNED_FLAG
        0x00, // decimals = 0
        0x00, 0x00, // reserved
    ];

    let tail = ColumnDefinitionTail::ref_from_bytes(&data).unwrap();
    assert_eq!(tail.charset(), 33);
    assert_eq!(tail.column_length(), 255);

    let flags = tail.flags();
    assert!(flags.contains(ColumnFlags::NOT_NULL_FLAG));
    assert!(flags.contains(ColumnFlags::UNSIGNED_FLAG));
    assert!(!flags.contains(ColumnFlags::AUTO_INCREMENT_FLAG));
    assert_eq!(tail.column_type().unwrap(), ColumnType::MYSQL_TYPE_TINY);
}

#[test]
fn test_column_definition_packet() {
    let column = Column {
        schema: "shop".to_string(),
        table: "o".to_string(),
        org_table: "orders".to_string(),
        name: "total".to_string(),
        org_name: "total".to_string(),
        collation_id: 63,
        length: 12,
        column_type: ColumnType::MYSQL_TYPE_NEWDECIMAL,
        flags: ColumnFlags::NOT_NULL_FLAG | ColumnFlags::BINARY_FLAG,
        decimals: 2,
    };
    let mut payload = Vec::new();
    write_column_definition(&mut payload, &column);

    let parsed = Column::try_from(ColumnDefinitionBytes(&payload)).unwrap();
    assert_eq!(parsed, column);
    assert!(parsed.is_binary());
    assert_eq!(parsed.collation().map(|c| c.name), Some("binary"));
}

#[test]
fn test_truncated_column_definition() {
    let payload = [0x03, b'd', b'e', b'f', 0x00];
    assert!(matches!(
        Column::try_from(ColumnDefinitionBytes(&payload)),
        Err(Error::UnexpectedEof)
    ));
}

#[test]
fn test_unknown_column_type_is_protocol_error() {
    let mut payload = Vec::new();
    for _ in 0..6 {
        payload.push(0);
    }
    payload.extend_from_slice(&[0x0c, 0x21, 0, 0, 0, 0, 0, 0x42, 0, 0, 0, 0, 0]);
    let err = Column::try_from(ColumnDefinitionBytes(&payload)).unwrap_err();
    assert!(matches!(err, Error::ProtocolError(_)));
}
