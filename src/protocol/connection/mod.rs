pub mod auth;
pub mod handshake;

#[cfg(test)]
mod handshake_test;

pub use auth::AuthPlugin;
pub use handshake::{Handshake, HandshakeResult, ServerInfo};
