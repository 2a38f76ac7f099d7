use std::sync::Arc;

use crate::col::Column;
use crate::constant::ServerStatusFlags;
use crate::decode::RowDecoder;
use crate::error::{Error, Result};
use crate::opts::DecodeOptions;
use crate::protocol::command::Action;
use crate::protocol::command::column_definition::ColumnDefinitionBytes;
use crate::protocol::primitive::*;
use crate::protocol::response::{
    ErrPayloadBytes, OkPayload, OkPayloadBytes, is_end_of_rows, read_eof_packet, read_terminator,
};
use crate::protocol::r#trait::ResultSetHandler;
use crate::row::{QueryResult, ResultSet};

enum State {
    /// Waiting for OK, ERR or a column count
    Start,
    ReadingColumns {
        remaining: usize,
        columns: Vec<Column>,
    },
    /// Column definitions done, waiting for the EOF that follows them
    ColumnsEof { columns: Vec<Column> },
    ReadingRows,
    Finished,
}

/// State machine for a COM_QUERY or COM_STMT_EXECUTE response.
///
/// Handles multiple result sets (SERVER_MORE_RESULTS_EXISTS) and both ways of
/// ending a row stream: the classic EOF packet and, with
/// CLIENT_DEPRECATE_EOF, an OK packet carrying the 0xFE header.
pub struct ResultSetReader {
    state: State,
    deprecate_eof: bool,
}

impl ResultSetReader {
    pub fn new(deprecate_eof: bool) -> Self {
        Self {
            state: State::Start,
            deprecate_eof,
        }
    }

    fn next_or_finish(&mut self, status: ServerStatusFlags) -> Action {
        if status.contains(ServerStatusFlags::SERVER_MORE_RESULTS_EXISTS) {
            self.state = State::Start;
            Action::NeedPacket
        } else {
            self.state = State::Finished;
            Action::Finished
        }
    }

    /// Feed the next payload of this command's response.
    ///
    /// An ERR packet ends the response and is returned as a server error.
    pub fn step<H: ResultSetHandler>(&mut self, payload: &[u8], handler: &mut H) -> Result<Action> {
        match &mut self.state {
            State::Start => match payload.first() {
                None => Err(Error::InvalidPacket),
                Some(0xFF) => {
                    self.state = State::Finished;
                    Err(ErrPayloadBytes(payload).into())
                }
                Some(0x00) => {
                    let ok = OkPayload::try_from(OkPayloadBytes(payload))?;
                    let status = ok.status_flags;
                    handler.no_result_set(ok)?;
                    Ok(self.next_or_finish(status))
                }
                Some(0xFB) => Err(Error::ProtocolError(
                    "LOCAL INFILE requests are not supported".to_string(),
                )),
                Some(_) => {
                    let (column_count, _) = read_int_lenenc(payload)?;
                    let remaining = usize::try_from(column_count)
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or(Error::InvalidPacket)?;
                    self.state = State::ReadingColumns {
                        remaining,
                        columns: Vec::with_capacity(remaining.min(4096)),
                    };
                    Ok(Action::NeedPacket)
                }
            },

            State::ReadingColumns { remaining, columns } => {
                columns.push(Column::try_from(ColumnDefinitionBytes(payload))?);
                *remaining -= 1;
                if *remaining == 0 {
                    let columns = std::mem::take(columns);
                    if self.deprecate_eof {
                        handler.resultset_start(columns)?;
                        self.state = State::ReadingRows;
                    } else {
                        self.state = State::ColumnsEof { columns };
                    }
                }
                Ok(Action::NeedPacket)
            }

            State::ColumnsEof { columns } => {
                read_eof_packet(payload)?;
                handler.resultset_start(std::mem::take(columns))?;
                self.state = State::ReadingRows;
                Ok(Action::NeedPacket)
            }

            State::ReadingRows => match payload.first() {
                // a row never starts with 0xFF: it is either NULL (0xFB) or a length prefix
                Some(0xFF) => {
                    self.state = State::Finished;
                    Err(ErrPayloadBytes(payload).into())
                }
                Some(0xFE) if is_end_of_rows(payload, self.deprecate_eof) => {
                    let end = read_terminator(payload, self.deprecate_eof)?;
                    let status = end.status_flags;
                    handler.resultset_end(end)?;
                    Ok(self.next_or_finish(status))
                }
                Some(_) => {
                    handler.row(payload)?;
                    Ok(Action::NeedPacket)
                }
                None => Err(Error::InvalidPacket),
            },

            State::Finished => Err(Error::InvalidPacket),
        }
    }
}

/// Which row layout a response uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFormat {
    /// COM_QUERY
    Text,
    /// COM_STMT_EXECUTE
    Binary,
}

/// Decodes rows as they arrive and accumulates a [`QueryResult`].
pub struct QueryResultCollector {
    format: RowFormat,
    options: DecodeOptions,
    decoder: Option<RowDecoder>,
    result: QueryResult,
}

impl QueryResultCollector {
    pub fn new(format: RowFormat, options: DecodeOptions) -> Self {
        Self {
            format,
            options,
            decoder: None,
            result: QueryResult::default(),
        }
    }

    pub fn finish(self) -> QueryResult {
        self.result
    }
}

impl ResultSetHandler for QueryResultCollector {
    fn no_result_set(&mut self, ok: OkPayload) -> Result<()> {
        self.result.absorb_ok(&ok);
        Ok(())
    }

    fn resultset_start(&mut self, columns: Vec<Column>) -> Result<()> {
        let columns: Arc<[Column]> = Arc::from(columns);
        self.result.result_sets.push(ResultSet {
            columns: columns.clone(),
            rows: Vec::new(),
        });
        self.decoder = Some(RowDecoder::new(columns, self.options));
        Ok(())
    }

    fn row(&mut self, payload: &[u8]) -> Result<()> {
        let (Some(decoder), Some(set)) = (&self.decoder, self.result.result_sets.last_mut()) else {
            return Err(Error::InvalidPacket);
        };
        let row = match self.format {
            RowFormat::Text => decoder.decode_text(payload)?,
            RowFormat::Binary => decoder.decode_binary(payload)?,
        };
        set.rows.push(row);
        Ok(())
    }

    fn resultset_end(&mut self, end: OkPayload) -> Result<()> {
        self.decoder = None;
        self.result.absorb_ok(&end);
        Ok(())
    }
}
