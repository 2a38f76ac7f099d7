pub mod command;
pub mod connection;
pub mod packet;
pub mod primitive;
pub mod response;
pub mod r#trait;
pub mod value;

#[cfg(test)]
mod packet_test;
#[cfg(test)]
pub(crate) mod fixtures;
