pub mod column_definition;
pub mod prepared;
pub mod query;
pub mod resultset;
pub mod utility;

#[cfg(test)]
mod column_definition_test;
#[cfg(test)]
mod resultset_test;

/// What a response state machine needs after consuming a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// The response continues in the next packet
    NeedPacket,
    /// The response is complete
    Finished,
}
