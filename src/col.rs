use crate::collation::{self, Collation};
use crate::constant::{ColumnFlags, ColumnType};

/// Column metadata from a column definition packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub schema: String,
    pub table: String,
    pub org_table: String,
    pub name: String,
    pub org_name: String,
    pub collation_id: u16,
    pub length: u32,
    pub column_type: ColumnType,
    pub flags: ColumnFlags,
    pub decimals: u8,
}

impl Column {
    pub fn collation(&self) -> Option<&'static Collation> {
        collation::from_id(self.collation_id)
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(ColumnFlags::UNSIGNED_FLAG)
    }

    /// Text in this column is raw bytes rather than characters.
    pub fn is_binary(&self) -> bool {
        self.collation_id == collation::BINARY.id
    }
}
