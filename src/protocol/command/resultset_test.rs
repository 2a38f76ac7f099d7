use pretty_assertions::assert_eq;

use crate::constant::{ColumnType, ServerStatusFlags};
use crate::error::Error;
use crate::opts::DecodeOptions;
use crate::protocol::command::Action;
use crate::protocol::command::resultset::{QueryResultCollector, ResultSetReader, RowFormat};
use crate::protocol::fixtures::*;
use crate::row::QueryResult;
use crate::value::Value;

fn run(deprecate_eof: bool, packets: &[Vec<u8>]) -> crate::error::Result<QueryResult> {
    let mut reader = ResultSetReader::new(deprecate_eof);
    let mut collector = QueryResultCollector::new(RowFormat::Text, DecodeOptions::default());
    for (idx, packet) in packets.iter().enumerate() {
        match reader.step(packet, &mut collector)? {
            Action::NeedPacket => assert!(idx + 1 < packets.len(), "response ended early"),
            Action::Finished => {
                assert_eq!(idx + 1, packets.len(), "trailing packets");
                return Ok(collector.finish());
            }
        }
    }
    panic!("response never finished");
}

fn two_by_three(deprecate_eof: bool) -> Vec<Vec<u8>> {
    let mut packets = vec![
        column_count(2),
        column_definition(&column("id", ColumnType::MYSQL_TYPE_LONG)),
        column_definition(&column("name", ColumnType::MYSQL_TYPE_VAR_STRING)),
    ];
    if !deprecate_eof {
        packets.push(eof(ServerStatusFlags::empty()));
    }
    packets.push(text_row(&[Some("1"), Some("a")]));
    packets.push(text_row(&[Some("2"), None]));
    packets.push(text_row(&[Some("3"), Some("c")]));
    if deprecate_eof {
        packets.push(ok_eof(ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT));
    } else {
        packets.push(eof(ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT));
    }
    packets
}

#[test]
fn ok_only_response() {
    let result = run(true, &[ok(3, 77, ServerStatusFlags::empty())]).unwrap();
    assert!(result.result_sets.is_empty());
    assert_eq!(result.affected_rows, 3);
    assert_eq!(result.last_insert_id, 77);
}

#[test]
fn rows_with_deprecate_eof() {
    let result = run(true, &two_by_three(true)).unwrap();
    assert_eq!(result.result_sets.len(), 1);
    let rows = result.rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
    assert_eq!(rows[1].get("name"), Some(&Value::Null));
    assert_eq!(rows[2].get("name"), Some(&Value::String("c".to_string())));
    assert!(result.status.contains(ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT));
}

#[test]
fn rows_with_classic_eof() {
    let with_eof = run(false, &two_by_three(false)).unwrap();
    let without = run(true, &two_by_three(true)).unwrap();
    assert_eq!(with_eof.result_sets, without.result_sets);
}

#[test]
fn multiple_result_sets() {
    let more = ServerStatusFlags::SERVER_MORE_RESULTS_EXISTS;
    let packets = vec![
        column_count(1),
        column_definition(&column("a", ColumnType::MYSQL_TYPE_LONG)),
        text_row(&[Some("1")]),
        ok_eof(more),
        ok(5, 0, more),
        column_count(1),
        column_definition(&column("b", ColumnType::MYSQL_TYPE_VAR_STRING)),
        text_row(&[Some("x")]),
        ok_eof(ServerStatusFlags::empty()),
    ];
    let result = run(true, &packets).unwrap();
    assert_eq!(result.result_sets.len(), 2);
    assert_eq!(result.affected_rows, 5);
    assert_eq!(result.result_sets[1].rows[0].get("b"), Some(&Value::String("x".to_string())));
}

#[test]
fn error_instead_of_result() {
    let err = run(true, &[err(1064, "42000", "You have an error in your SQL syntax")]).unwrap_err();
    assert_eq!(err.server_code(), Some(1064));
    assert!(!err.is_fatal());
}

#[test]
fn error_after_some_rows() {
    let mut reader = ResultSetReader::new(true);
    let mut collector = QueryResultCollector::new(RowFormat::Text, DecodeOptions::default());
    let packets = [
        column_count(1),
        column_definition(&column("a", ColumnType::MYSQL_TYPE_LONG)),
        text_row(&[Some("1")]),
    ];
    for packet in &packets {
        assert_eq!(reader.step(packet, &mut collector).unwrap(), Action::NeedPacket);
    }
    let failure = reader.step(&err(1317, "70100", "Query execution was interrupted"), &mut collector);
    assert!(matches!(failure, Err(Error::ServerError(e)) if e.error_code == 1317));
    // the response is over; nothing more may be fed
    assert!(reader.step(&ok(0, 0, ServerStatusFlags::empty()), &mut collector).is_err());
}

#[test]
fn local_infile_is_refused() {
    let err = run(true, &[vec![0xFB, b'/', b'e', b't', b'c']]).unwrap_err();
    assert!(err.is_fatal());
}
