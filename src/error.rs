use std::sync::Arc;

use thiserror::Error;

use crate::protocol::response::{ErrPayload, ErrPayloadBytes};

/// Coarse class of an [`Error`], used to decide how far a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Invalid option or argument, raised before anything is written
    Config,
    /// Transport, timeout, TLS or authentication failure
    Connection,
    /// Malformed or out-of-sequence packet
    Protocol,
    /// An ERR packet answering a single command
    Server,
}

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Server Error: {0}")]
    ServerError(#[from] ErrPayload),

    #[error("IO error: {0}")]
    IoError(Arc<std::io::Error>),

    #[error("Bad config error: {0}")]
    BadConfigError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(ErrPayload),

    #[error("Unsupported authentication plugin: {0}")]
    UnsupportedAuthPlugin(String),

    #[error("Authentication did not converge after {0} plugin switches")]
    AuthSwitchLimit(usize),

    #[error("Server does not support required capability: {0}")]
    MissingCapability(&'static str),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid packet")]
    InvalidPacket,

    #[error("Unexpected end of packet")]
    UnexpectedEof,

    #[error("Packet out of order: expected sequence {expected}, got {actual}")]
    PacketOutOfOrder { expected: u8, actual: u8 },

    #[error("Protocol error: {0}")]
    ProtocolError(String),
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ServerError(_) => ErrorClass::Server,
            Self::BadConfigError(_) | Self::InvalidParams(_) => ErrorClass::Config,
            Self::IoError(_)
            | Self::ConnectTimeout(_)
            | Self::TlsError(_)
            | Self::AuthenticationFailed(_)
            | Self::UnsupportedAuthPlugin(_)
            | Self::AuthSwitchLimit(_)
            | Self::MissingCapability(_)
            | Self::ConnectionClosed => ErrorClass::Connection,
            Self::InvalidPacket
            | Self::UnexpectedEof
            | Self::PacketOutOfOrder { .. }
            | Self::ProtocolError(_) => ErrorClass::Protocol,
        }
    }

    /// Whether this error leaves the connection unusable.
    ///
    /// Server errors answer one command and configuration errors are raised
    /// before any bytes reach the wire; everything else poisons the stream.
    pub fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::Connection | ErrorClass::Protocol)
    }

    /// The server error code, when this is an ERR answer from the server.
    pub fn server_code(&self) -> Option<u16> {
        match self {
            Self::ServerError(err) | Self::AuthenticationFailed(err) => Some(err.error_code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(Arc::new(err))
    }
}

impl<'a> From<ErrPayloadBytes<'a>> for Error {
    fn from(value: ErrPayloadBytes<'a>) -> Self {
        match ErrPayload::try_from(value) {
            Ok(err_payload) => Error::ServerError(err_payload),
            Err(err) => err,
        }
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn server_err() -> ErrPayload {
        ErrPayload {
            error_code: 1146,
            sql_state: "42S02".to_string(),
            message: "Table 'test.nope' doesn't exist".to_string(),
        }
    }

    #[test]
    fn server_error_is_recoverable() {
        let err = Error::ServerError(server_err());
        assert_eq!(err.class(), ErrorClass::Server);
        assert!(!err.is_fatal());
        assert_eq!(err.server_code(), Some(1146));
    }

    #[test]
    fn config_errors_are_not_fatal() {
        assert!(!Error::BadConfigError("charset".into()).is_fatal());
        assert!(!Error::InvalidParams("missing :id".into()).is_fatal());
    }

    #[test]
    fn transport_and_protocol_errors_are_fatal() {
        let io = Error::from(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert_eq!(io.class(), ErrorClass::Connection);
        assert!(io.is_fatal());

        let seq = Error::PacketOutOfOrder {
            expected: 3,
            actual: 5,
        };
        assert_eq!(seq.class(), ErrorClass::Protocol);
        assert!(seq.is_fatal());

        let auth = Error::AuthenticationFailed(server_err());
        assert!(auth.is_fatal());
        assert_eq!(auth.server_code(), Some(1146));
    }

    #[test]
    fn err_packet_converts_to_server_error() {
        let mut payload = vec![0xFF, 0x7A, 0x04, b'#'];
        payload.extend_from_slice(b"42S02");
        payload.extend_from_slice(b"Table 'test.nope' doesn't exist");
        let err = Error::from(ErrPayloadBytes(&payload));
        let Error::ServerError(inner) = err else {
            panic!("expected server error");
        };
        assert_eq!(inner.error_code, 1146);
        assert_eq!(inner.sql_state, "42S02");
    }
}
