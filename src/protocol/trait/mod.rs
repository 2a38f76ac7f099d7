pub mod param;


use auto_impl::auto_impl;

use crate::col::Column;
use crate::error::Result;
use crate::protocol::response::OkPayload;

/// Event callbacks for a command response made of result sets.
///
/// The same events are produced for text and binary protocol responses; only
/// the layout of the row payload differs.
#[auto_impl(&mut, Box)]
pub trait ResultSetHandler {
    /// The statement produced no rows
    fn no_result_set(&mut self, ok: OkPayload) -> Result<()>;
    /// All column definitions of a result set were read
    fn resultset_start(&mut self, columns: Vec<Column>) -> Result<()>;
    /// The raw payload of one row
    fn row(&mut self, payload: &[u8]) -> Result<()>;
    /// The EOF or OK packet terminating the rows
    fn resultset_end(&mut self, end: OkPayload) -> Result<()>;
}
