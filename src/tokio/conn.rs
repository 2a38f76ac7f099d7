use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, instrument, warn};

use crate::constant::CapabilityFlags;
use crate::error::{Error, Result};
use crate::named::{self, Bindings};
use crate::opts::Config;
use crate::protocol::connection::{Handshake, HandshakeResult, ServerInfo};
use crate::protocol::packet::PacketCodec;
use crate::row::QueryResult;
use crate::statement_cache::Statement;

use super::driver::{AfterPrepare, Driver, Reply, Request};
use super::stream::{Stream, Transport};

/// Lifecycle of a connection.
///
/// `Closed` and `Errored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Handshaking,
    AuthSwitch,
    TlsUpgrading,
    Ready,
    Closing,
    Closed,
    Errored,
}

impl ConnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnState::Closed | ConnState::Errored)
    }
}

/// A pipelined connection.
///
/// Every command method writes its command before returning; the returned
/// [`ResponseFuture`] only waits for the answer. Commands issued from the
/// same task are answered in the order they were issued. Clones share the
/// underlying connection.
#[derive(Clone)]
pub struct Conn {
    inner: Arc<Inner>,
}

struct Inner {
    requests: mpsc::UnboundedSender<Request>,
    close: mpsc::UnboundedSender<oneshot::Sender<()>>,
    state: watch::Receiver<ConnState>,
    server: ServerInfo,
    named_placeholders: bool,
}

impl Conn {
    /// Connect over TCP or a Unix socket as configured.
    pub async fn connect<O>(opts: O) -> Result<Self>
    where
        O: TryInto<Config>,
        Error: From<O::Error>,
    {
        let config: Config = opts.try_into()?;
        let timeout = config.connect_timeout;
        tokio::time::timeout(timeout, async {
            let stream = Stream::connect(&config).await?;
            Self::establish(stream, config).await
        })
        .await
        .map_err(|_elapsed| Error::ConnectTimeout(timeout))?
    }

    /// Run the handshake over an already connected stream.
    pub async fn connect_with_stream<S, O>(stream: S, opts: O) -> Result<Self>
    where
        S: Transport,
        O: TryInto<Config>,
        Error: From<O::Error>,
    {
        let config: Config = opts.try_into()?;
        let timeout = config.connect_timeout;
        tokio::time::timeout(timeout, Self::establish(stream, config))
            .await
            .map_err(|_elapsed| Error::ConnectTimeout(timeout))?
    }

    #[instrument(skip_all, fields(host = %config.host, user = %config.user))]
    async fn establish<S: Transport>(mut stream: S, config: Config) -> Result<Self> {
        let (state_tx, state_rx) = watch::channel(ConnState::Connecting);
        if config.compress {
            warn!("compression is not supported, continuing uncompressed");
        }

        let mut codec = PacketCodec::new();
        let mut read_buf = BytesMut::with_capacity(8192);
        let mut handshake = Handshake::new(&config);
        state_tx.send_replace(ConnState::Handshaking);

        let server = loop {
            let payload = read_packet(&mut stream, &mut codec, &mut read_buf).await?;
            if payload.first() == Some(&0xFE) {
                state_tx.send_replace(ConnState::AuthSwitch);
            }
            match handshake.drive(&payload)? {
                HandshakeResult::Write(response) => {
                    write_packet(&mut stream, &mut codec, &response).await?;
                }
                HandshakeResult::Read => {}
                HandshakeResult::SslRequest(request) => {
                    write_packet(&mut stream, &mut codec, &request).await?;
                    state_tx.send_replace(ConnState::TlsUpgrading);
                    let ssl = config.tls.clone().unwrap_or_default();
                    stream = stream.upgrade_to_tls(&config.host, &ssl).await?;
                    let HandshakeResult::Write(response) = handshake.drive_after_tls()? else {
                        return Err(Error::ProtocolError(
                            "handshake produced no response after TLS".to_string(),
                        ));
                    };
                    write_packet(&mut stream, &mut codec, &response).await?;
                }
                HandshakeResult::Connected(server) => break server,
            }
        };
        debug!(
            server_version = %server.server_version,
            connection_id = server.connection_id,
            "authenticated"
        );

        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        state_tx.send_replace(ConnState::Ready);
        let driver = Driver::new(
            stream,
            read_buf,
            &config,
            server.deprecate_eof(),
            requests_rx,
            close_rx,
            state_tx,
        );
        tokio::spawn(driver.run());

        let conn = Conn {
            inner: Arc::new(Inner {
                requests: requests_tx,
                close: close_tx,
                state: state_rx,
                server,
                named_placeholders: config.named_placeholders,
            }),
        };
        conn.set_up_session(&config).await?;
        Ok(conn)
    }

    /// Collations above 255 cannot be named in the handshake.
    async fn set_up_session(&self, config: &Config) -> Result<()> {
        let collation = config.collation;
        if !collation.fits_handshake() {
            debug!(collation = collation.name, "selecting collation");
            self.query(format!(
                "SET NAMES {} COLLATE {}",
                collation.charset, collation.name
            ))
            .await?;
        }
        if let Some(init) = &config.init_command {
            self.query(init.as_str()).await?;
        }
        Ok(())
    }

    fn send<T>(&self, request: impl FnOnce(Reply<T>) -> Request) -> ResponseFuture<T> {
        let (reply, response) = oneshot::channel();
        // if the driver is gone the request is dropped with its reply sender
        let _ = self.inner.requests.send(request(reply));
        ResponseFuture::pending(response)
    }

    fn rewrite(&self, sql: &str) -> (String, Arc<[String]>) {
        if self.inner.named_placeholders {
            let rewritten = named::rewrite(sql);
            (rewritten.sql, Arc::from(rewritten.names))
        } else {
            (sql.to_string(), Arc::from(Vec::new()))
        }
    }

    /// Run SQL as a text protocol query.
    pub fn query(&self, sql: impl Into<String>) -> ResponseFuture<QueryResult> {
        let sql = sql.into();
        self.send(|reply| Request::Query { sql, reply })
    }

    /// Prepare a statement, or return the cached one for the same SQL.
    ///
    /// The returned [`Statement`] stays owned by the statement cache. Once
    /// more than `max_prepared_statements` distinct statements have been
    /// prepared, the least recently used one is closed on the server, and
    /// [`Conn::execute_statement`] with a handle to it fails with the
    /// server's [`Error::ServerError`]. Use [`Conn::execute`] to have the
    /// statement re-prepared on demand.
    pub fn prepare(&self, sql: &str) -> ResponseFuture<Statement> {
        let (text, names) = self.rewrite(sql);
        self.send(|reply| Request::Prepare {
            key: Arc::from(sql),
            sql: text,
            names,
            after: AfterPrepare::Reply(reply),
        })
    }

    /// Prepare (through the statement cache) and execute in one call.
    ///
    /// Nothing else is written until the statement has been prepared, so
    /// the execute still lands in submission order.
    pub fn execute(&self, sql: &str, params: impl Into<Bindings>) -> ResponseFuture<QueryResult> {
        let (text, names) = self.rewrite(sql);
        let params = match params.into().resolve(&names) {
            Ok(params) => params,
            Err(err) => return ResponseFuture::failed(err),
        };
        self.send(|reply| Request::Prepare {
            key: Arc::from(sql),
            sql: text,
            names,
            after: AfterPrepare::Execute { params, reply },
        })
    }

    /// Execute a statement returned by [`Conn::prepare`].
    pub fn execute_statement(
        &self,
        statement: &Statement,
        params: impl Into<Bindings>,
    ) -> ResponseFuture<QueryResult> {
        let params = match params.into().resolve(statement.param_names()) {
            Ok(params) => params,
            Err(err) => return ResponseFuture::failed(err),
        };
        let statement = statement.clone();
        self.send(|reply| Request::Execute {
            statement,
            params,
            reply,
        })
    }

    /// Close a statement on the server and drop it from the cache.
    pub fn close_statement(&self, statement: &Statement) -> ResponseFuture<()> {
        let id = statement.id();
        self.send(|reply| Request::CloseStatement { id, reply })
    }

    pub fn ping(&self) -> ResponseFuture<()> {
        self.send(|reply| Request::Ping { reply })
    }

    /// Fail everything still queued with [`Error::ConnectionClosed`], send
    /// COM_QUIT and shut the transport down.
    pub async fn close(&self) {
        let (ack, done) = oneshot::channel();
        if self.inner.close.send(ack).is_ok() {
            let _ = done.await;
        }
    }

    pub fn state(&self) -> ConnState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn state_watch(&self) -> watch::Receiver<ConnState> {
        self.inner.state.clone()
    }

    pub fn server_version(&self) -> &str {
        &self.inner.server.server_version
    }

    pub fn connection_id(&self) -> u32 {
        self.inner.server.connection_id
    }

    /// Capabilities in effect for this connection
    pub fn capabilities(&self) -> CapabilityFlags {
        self.inner.server.capabilities
    }

    pub fn is_mariadb(&self) -> bool {
        self.inner.server.is_mariadb()
    }
}

/// The answer to one command.
///
/// The command has already been handed to the connection; dropping this
/// future discards the answer but does not cancel the command.
#[must_use = "the command is sent either way; the future carries its result"]
pub struct ResponseFuture<T> {
    inner: Response<T>,
}

enum Response<T> {
    Pending(oneshot::Receiver<Result<T>>),
    Failed(Option<Error>),
}

impl<T> ResponseFuture<T> {
    fn pending(receiver: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            inner: Response::Pending(receiver),
        }
    }

    fn failed(err: Error) -> Self {
        Self {
            inner: Response::Failed(Some(err)),
        }
    }
}

impl<T> Future for ResponseFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            Response::Pending(receiver) => Pin::new(receiver)
                .poll(cx)
                .map(|result| result.unwrap_or(Err(Error::ConnectionClosed))),
            Response::Failed(err) => {
                Poll::Ready(Err(err.take().unwrap_or(Error::ConnectionClosed)))
            }
        }
    }
}

async fn read_packet<S: Transport>(
    stream: &mut S,
    codec: &mut PacketCodec,
    buf: &mut BytesMut,
) -> Result<BytesMut> {
    loop {
        if let Some(payload) = codec.decode(buf)? {
            return Ok(payload);
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
    }
}

async fn write_packet<S: Transport>(
    stream: &mut S,
    codec: &mut PacketCodec,
    payload: &[u8],
) -> Result<()> {
    let mut out = BytesMut::with_capacity(payload.len() + 4);
    codec.encode(payload, &mut out)?;
    stream.write_all(&out).await?;
    stream.flush().await?;
    Ok(())
}
