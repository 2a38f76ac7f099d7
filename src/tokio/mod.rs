mod conn;
mod driver;
mod stream;


pub use conn::{Conn, ConnState, ResponseFuture};
pub use stream::{Stream, Transport};
