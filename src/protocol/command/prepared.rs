use crate::col::Column;
use crate::constant::CommandByte;
use crate::error::{Error, Result};
use crate::opts::Timezone;
use crate::protocol::command::Action;
use crate::protocol::command::column_definition::ColumnDefinitionBytes;
use crate::protocol::primitive::*;
use crate::protocol::response::{ErrPayloadBytes, read_eof_packet};
use crate::protocol::r#trait::param::Params;
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Prepared statement OK response (zero-copy)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct PrepareOk {
    statement_id: U32LE,
    num_columns: U16LE,
    num_params: U16LE,
    _reserved: u8,
    warning_count: U16LE,
}

impl PrepareOk {
    pub fn statement_id(&self) -> u32 {
        self.statement_id.get()
    }

    pub fn num_columns(&self) -> u16 {
        self.num_columns.get()
    }

    pub fn num_params(&self) -> u16 {
        self.num_params.get()
    }

    pub fn warning_count(&self) -> u16 {
        self.warning_count.get()
    }
}

/// Write COM_STMT_PREPARE command
pub fn write_prepare(out: &mut Vec<u8>, sql: &str) {
    write_int_1(out, CommandByte::StmtPrepare as u8);
    out.extend_from_slice(sql.as_bytes());
}

/// Read COM_STMT_PREPARE response
pub fn read_prepare_ok(payload: &[u8]) -> Result<&PrepareOk> {
    match read_int_1(payload)? {
        (0x00, data) => PrepareOk::ref_from_prefix(data)
            .map(|(ok, _)| ok)
            .map_err(|_| Error::UnexpectedEof),
        (0xFF, _) => Err(ErrPayloadBytes(payload).into()),
        _ => Err(Error::InvalidPacket),
    }
}

/// Write COM_STMT_EXECUTE command
pub fn write_execute<P: Params + ?Sized>(
    out: &mut Vec<u8>,
    statement_id: u32,
    params: &P,
    timezone: Timezone,
) -> Result<()> {
    write_int_1(out, CommandByte::StmtExecute as u8);
    write_int_4(out, statement_id);

    // flags (1 byte) - CURSOR_TYPE_NO_CURSOR
    write_int_1(out, 0x00);

    // iteration count (4 bytes) - always 1
    write_int_4(out, 1);

    if !params.is_empty() {
        params.write_null_bitmap(out);

        // new-params-bound-flag: types are sent on every execute
        write_int_1(out, 0x01);
        params.write_types(out);

        params.write_values(out, timezone)?;
    }
    Ok(())
}

/// Write COM_STMT_CLOSE command
pub fn write_close_statement(out: &mut Vec<u8>, statement_id: u32) {
    write_int_1(out, CommandByte::StmtClose as u8);
    write_int_4(out, statement_id);
}

/// Everything the server reports about a freshly prepared statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareResponse {
    pub statement_id: u32,
    pub params: Vec<Column>,
    pub columns: Vec<Column>,
    pub warnings: u16,
}

enum PrepareState {
    Start,
    ReadingParams { remaining: usize },
    ParamsEof,
    ReadingColumns { remaining: usize },
    ColumnsEof,
    Finished,
}

/// State machine for a COM_STMT_PREPARE response.
///
/// Parameter and column definitions follow the PREPARE_OK packet, each group
/// closed by an EOF packet unless CLIENT_DEPRECATE_EOF is in effect. Empty
/// groups are omitted entirely.
pub struct Prepare {
    state: PrepareState,
    deprecate_eof: bool,
    num_columns: usize,
    response: PrepareResponse,
}

impl Prepare {
    pub fn new(deprecate_eof: bool) -> Self {
        Self {
            state: PrepareState::Start,
            deprecate_eof,
            num_columns: 0,
            response: PrepareResponse::default(),
        }
    }

    pub fn step(&mut self, payload: &[u8]) -> Result<Action> {
        match &mut self.state {
            PrepareState::Start => {
                let ok = read_prepare_ok(payload).inspect_err(|_| {
                    self.state = PrepareState::Finished;
                })?;
                self.response.statement_id = ok.statement_id();
                self.response.warnings = ok.warning_count();
                self.num_columns = usize::from(ok.num_columns());
                let num_params = usize::from(ok.num_params());
                self.response.params.reserve(num_params);
                self.response.columns.reserve(self.num_columns);
                if num_params > 0 {
                    self.state = PrepareState::ReadingParams {
                        remaining: num_params,
                    };
                    Ok(Action::NeedPacket)
                } else {
                    Ok(self.start_columns())
                }
            }
            PrepareState::ReadingParams { remaining } => {
                *remaining -= 1;
                let done = *remaining == 0;
                self.response
                    .params
                    .push(Column::try_from(ColumnDefinitionBytes(payload))?);
                if !done {
                    Ok(Action::NeedPacket)
                } else if self.deprecate_eof {
                    Ok(self.start_columns())
                } else {
                    self.state = PrepareState::ParamsEof;
                    Ok(Action::NeedPacket)
                }
            }
            PrepareState::ParamsEof => {
                read_eof_packet(payload)?;
                Ok(self.start_columns())
            }
            PrepareState::ReadingColumns { remaining } => {
                *remaining -= 1;
                let done = *remaining == 0;
                self.response
                    .columns
                    .push(Column::try_from(ColumnDefinitionBytes(payload))?);
                if !done {
                    Ok(Action::NeedPacket)
                } else if self.deprecate_eof {
                    self.state = PrepareState::Finished;
                    Ok(Action::Finished)
                } else {
                    self.state = PrepareState::ColumnsEof;
                    Ok(Action::NeedPacket)
                }
            }
            PrepareState::ColumnsEof => {
                read_eof_packet(payload)?;
                self.state = PrepareState::Finished;
                Ok(Action::Finished)
            }
            PrepareState::Finished => Err(Error::InvalidPacket),
        }
    }

    fn start_columns(&mut self) -> Action {
        if self.num_columns > 0 {
            self.state = PrepareState::ReadingColumns {
                remaining: self.num_columns,
            };
            Action::NeedPacket
        } else {
            self.state = PrepareState::Finished;
            Action::Finished
        }
    }

    /// The collected response, once `step` returned [`Action::Finished`].
    pub fn into_response(self) -> PrepareResponse {
        self.response
    }
}
