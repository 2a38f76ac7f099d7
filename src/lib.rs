pub mod col;
pub mod collation;
pub mod constant;
pub mod decode;
pub mod error;
pub mod named;
mod opts;
pub mod protocol;
pub mod row;
pub mod statement_cache;
pub mod tokio;
pub mod value;

pub use col::Column;
pub use error::{Error, ErrorClass, Result};
pub use named::Bindings;
pub use opts::{Config, DecodeOptions, Opts, SslOpts, Timezone, TlsVersion};
pub use row::{QueryResult, ResultSet, Row};
pub use statement_cache::Statement;
pub use self::tokio::{Conn, ConnState, ResponseFuture};
pub use value::Value;

#[cfg(test)]
mod constant_test;
