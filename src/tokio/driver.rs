//! The task that owns a connection's socket.
//!
//! Callers hand [`Request`]s to the driver over a channel. The driver writes
//! each command as soon as it is allowed to and remembers it in a FIFO of
//! pending responses; inbound packets always belong to the head of that
//! FIFO, so responses reach callers in submission order.
use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::Decoder;
use tracing::{debug, trace, warn};
use zerocopy::FromBytes;

use crate::error::{Error, Result};
use crate::opts::{Config, DecodeOptions};
use crate::protocol::command::Action;
use crate::protocol::command::prepared::{
    Prepare, write_close_statement, write_execute, write_prepare,
};
use crate::protocol::command::query::write_query;
use crate::protocol::command::resultset::{QueryResultCollector, ResultSetReader, RowFormat};
use crate::protocol::command::utility::{read_ok_response, write_ping, write_quit};
use crate::protocol::packet::{PacketCodec, PacketHeader};
use crate::protocol::response::ErrPayloadBytes;
use crate::row::QueryResult;
use crate::statement_cache::{Statement, StatementCache};
use crate::value::Value;

use super::conn::ConnState;
use super::stream::Transport;

/// Stop taking new commands while this much output is still unsent.
const WRITE_HIGH_WATER: usize = 1 << 20;

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

/// What to do once a statement has been prepared
pub(crate) enum AfterPrepare {
    Reply(Reply<Statement>),
    Execute {
        params: Vec<Value>,
        reply: Reply<QueryResult>,
    },
}

pub(crate) enum Request {
    Query {
        sql: String,
        reply: Reply<QueryResult>,
    },
    Prepare {
        /// Cache key: the SQL as the caller wrote it
        key: Arc<str>,
        /// SQL sent to the server, `:name` markers already rewritten
        sql: String,
        names: Arc<[String]>,
        after: AfterPrepare,
    },
    Execute {
        statement: Statement,
        params: Vec<Value>,
        reply: Reply<QueryResult>,
    },
    CloseStatement {
        id: u32,
        reply: Reply<()>,
    },
    Ping {
        reply: Reply<()>,
    },
}

impl Request {
    fn fail(self, err: Error) {
        match self {
            Request::Query { reply, .. } | Request::Execute { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Request::Prepare { after, .. } => after.fail(err),
            Request::CloseStatement { reply, .. } | Request::Ping { reply } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

impl AfterPrepare {
    fn fail(self, err: Error) {
        match self {
            AfterPrepare::Reply(reply) => {
                let _ = reply.send(Err(err));
            }
            AfterPrepare::Execute { reply, .. } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

/// An answer known at submission time, delivered when it reaches the head.
enum Ready {
    Statement(Reply<Statement>, Result<Statement>),
    Result(Reply<QueryResult>, Result<QueryResult>),
    Unit(Reply<()>, Result<()>),
}

impl Ready {
    fn deliver(self) {
        // a caller that dropped its future does not care
        match self {
            Ready::Statement(reply, result) => {
                let _ = reply.send(result);
            }
            Ready::Result(reply, result) => {
                let _ = reply.send(result);
            }
            Ready::Unit(reply, result) => {
                let _ = reply.send(result);
            }
        }
    }

    fn fail(self, err: Error) {
        match self {
            Ready::Statement(reply, _) => {
                let _ = reply.send(Err(err));
            }
            Ready::Result(reply, _) => {
                let _ = reply.send(Err(err));
            }
            Ready::Unit(reply, _) => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

enum Pending {
    Query {
        response_seq: u8,
        reader: ResultSetReader,
        collector: QueryResultCollector,
        reply: Reply<QueryResult>,
    },
    Prepare {
        response_seq: u8,
        key: Arc<str>,
        names: Arc<[String]>,
        prepare: Prepare,
        after: AfterPrepare,
    },
    Ping {
        response_seq: u8,
        reply: Reply<()>,
    },
    Ready(Ready),
}

impl Pending {
    /// Nothing may be submitted behind a prepare that still has to execute.
    fn is_barrier(&self) -> bool {
        matches!(
            self,
            Pending::Prepare {
                after: AfterPrepare::Execute { .. },
                ..
            }
        )
    }

    fn fail(self, err: Error) {
        match self {
            Pending::Query { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Pending::Prepare { after, .. } => after.fail(err),
            Pending::Ping { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Pending::Ready(ready) => ready.fail(err),
        }
    }
}

pub(crate) struct Driver<S: Transport> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    codec: PacketCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
    scratch: Vec<u8>,
    queue: VecDeque<Pending>,
    cache: StatementCache,
    requests: mpsc::UnboundedReceiver<Request>,
    requests_open: bool,
    close: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
    close_open: bool,
    state: watch::Sender<ConnState>,
    deprecate_eof: bool,
    pipelining: bool,
    decode: DecodeOptions,
}

impl<S: Transport> Driver<S> {
    pub(crate) fn new(
        stream: S,
        read_buf: BytesMut,
        config: &Config,
        deprecate_eof: bool,
        requests: mpsc::UnboundedReceiver<Request>,
        close: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
        state: watch::Sender<ConnState>,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader,
            writer,
            codec: PacketCodec::new(),
            read_buf,
            write_buf: BytesMut::with_capacity(8192),
            scratch: Vec::new(),
            queue: VecDeque::new(),
            cache: StatementCache::new(config.max_prepared_statements),
            requests,
            requests_open: true,
            close,
            close_open: true,
            state,
            deprecate_eof,
            pipelining: config.pipelining,
            decode: config.decode,
        }
    }

    pub(crate) async fn run(mut self) {
        match self.serve().await {
            Ok(()) => debug!("connection closed"),
            Err(err) => {
                warn!(error = %err, "connection failed");
                let next = match err {
                    Error::IoError(_) | Error::ConnectionClosed => ConnState::Closed,
                    _ => ConnState::Errored,
                };
                self.fail_all(err);
                self.state.send_replace(next);
            }
        }
    }

    async fn serve(&mut self) -> Result<()> {
        loop {
            if !self.requests_open && self.queue.is_empty() && self.write_buf.is_empty() {
                self.quit().await;
                return Ok(());
            }

            let can_submit = self.can_submit();
            tokio::select! {
                biased;

                ack = self.close.recv(), if self.close_open => match ack {
                    Some(ack) => {
                        self.fail_all(Error::ConnectionClosed);
                        self.quit().await;
                        let _ = ack.send(());
                        return Ok(());
                    }
                    None => self.close_open = false,
                },

                written = self.writer.write(&self.write_buf), if !self.write_buf.is_empty() => {
                    match written? {
                        0 => return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into()),
                        n => self.write_buf.advance(n),
                    }
                }

                read = self.reader.read_buf(&mut self.read_buf) => {
                    if read? == 0 {
                        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
                    }
                    self.process_inbound()?;
                }

                request = self.requests.recv(), if self.requests_open && can_submit => match request {
                    Some(request) => self.submit(request)?,
                    None => self.requests_open = false,
                },
            }
        }
    }

    fn can_submit(&self) -> bool {
        if self.write_buf.len() >= WRITE_HIGH_WATER {
            return false;
        }
        if self.pipelining {
            !self.queue.iter().any(Pending::is_barrier)
        } else {
            self.queue.is_empty()
        }
    }

    fn write_command(&mut self, build: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> Result<u8> {
        self.scratch.clear();
        build(&mut self.scratch)?;
        Ok(self.codec.write_command(&mut self.write_buf, &self.scratch))
    }

    /// COM_STMT_CLOSE has no response, so nothing is queued for it.
    fn close_statement(&mut self, id: u32) -> Result<()> {
        self.write_command(|out| {
            write_close_statement(out, id);
            Ok(())
        })?;
        Ok(())
    }

    fn push(&mut self, pending: Pending) {
        let was_empty = self.queue.is_empty();
        self.queue.push_back(pending);
        if was_empty {
            self.advance();
        }
    }

    /// The head changed: answer known results and align the sequence id.
    fn advance(&mut self) {
        while let Some(head) = self.queue.front() {
            let response_seq = match head {
                Pending::Query { response_seq, .. }
                | Pending::Prepare { response_seq, .. }
                | Pending::Ping { response_seq, .. } => *response_seq,
                Pending::Ready(_) => {
                    if let Some(Pending::Ready(ready)) = self.queue.pop_front() {
                        ready.deliver();
                    }
                    continue;
                }
            };
            self.codec.set_sequence(response_seq);
            break;
        }
    }

    fn submit(&mut self, request: Request) -> Result<()> {
        match request {
            Request::Query { sql, reply } => {
                trace!(sql = %sql, "query");
                let response_seq = self.write_command(|out| {
                    write_query(out, &sql);
                    Ok(())
                })?;
                self.push(Pending::Query {
                    response_seq,
                    reader: ResultSetReader::new(self.deprecate_eof),
                    collector: QueryResultCollector::new(RowFormat::Text, self.decode),
                    reply,
                });
            }

            Request::Prepare {
                key,
                sql,
                names,
                after,
            } => match self.cache.get(&key) {
                Some(statement) => match after {
                    AfterPrepare::Reply(reply) => {
                        self.push(Pending::Ready(Ready::Statement(reply, Ok(statement))));
                    }
                    AfterPrepare::Execute { params, reply } => {
                        self.submit_execute(statement, params, reply)?;
                    }
                },
                None => {
                    trace!(sql = %sql, "prepare");
                    let response_seq = self.write_command(|out| {
                        write_prepare(out, &sql);
                        Ok(())
                    })?;
                    self.push(Pending::Prepare {
                        response_seq,
                        key,
                        names,
                        prepare: Prepare::new(self.deprecate_eof),
                        after,
                    });
                }
            },

            Request::Execute {
                statement,
                params,
                reply,
            } => self.submit_execute(statement, params, reply)?,

            Request::CloseStatement { id, reply } => {
                self.cache.remove_id(id);
                self.close_statement(id)?;
                self.push(Pending::Ready(Ready::Unit(reply, Ok(()))));
            }

            Request::Ping { reply } => {
                let response_seq = self.write_command(|out| {
                    write_ping(out);
                    Ok(())
                })?;
                self.push(Pending::Ping {
                    response_seq,
                    reply,
                });
            }
        }
        Ok(())
    }

    fn submit_execute(
        &mut self,
        statement: Statement,
        params: Vec<Value>,
        reply: Reply<QueryResult>,
    ) -> Result<()> {
        if params.len() != statement.param_count() {
            let err = Error::InvalidParams(format!(
                "statement expects {} parameters, got {}",
                statement.param_count(),
                params.len()
            ));
            self.push(Pending::Ready(Ready::Result(reply, Err(err))));
            return Ok(());
        }

        self.scratch.clear();
        let timezone = self.decode.timezone;
        if let Err(err) = write_execute(&mut self.scratch, statement.id, params.as_slice(), timezone)
        {
            // nothing reached the wire; only this command fails
            self.push(Pending::Ready(Ready::Result(reply, Err(err))));
            return Ok(());
        }
        trace!(id = statement.id, "execute");
        let response_seq = self.codec.write_command(&mut self.write_buf, &self.scratch);
        self.push(Pending::Query {
            response_seq,
            reader: ResultSetReader::new(self.deprecate_eof),
            collector: QueryResultCollector::new(RowFormat::Binary, self.decode),
            reply,
        });
        Ok(())
    }

    fn process_inbound(&mut self) -> Result<()> {
        while !self.read_buf.is_empty() {
            if self.queue.is_empty() {
                return Err(self.unsolicited());
            }
            let Some(payload) = self.codec.decode(&mut self.read_buf)? else {
                break;
            };
            self.on_packet(&payload)?;
        }
        Ok(())
    }

    /// Data arrived while no command was waiting for it.
    fn unsolicited(&self) -> Error {
        let payload = self
            .read_buf
            .get(..4)
            .and_then(|header| PacketHeader::read_from_bytes(header).ok())
            .and_then(|header| self.read_buf.get(4..4 + header.length()));
        if let Some(payload @ [0xFF, ..]) = payload {
            // e.g. the server's idle timeout or a KILL
            let err = Error::from(ErrPayloadBytes(payload));
            warn!(error = %err, "server closed the connection");
            return Error::ConnectionClosed;
        }
        Error::ProtocolError("packet received with no command pending".to_string())
    }

    fn on_packet(&mut self, payload: &[u8]) -> Result<()> {
        let step = match self.queue.front_mut() {
            Some(Pending::Query {
                reader, collector, ..
            }) => reader.step(payload, collector),
            Some(Pending::Prepare { prepare, .. }) => prepare.step(payload),
            Some(Pending::Ping { .. }) => read_ok_response(payload).map(|_| Action::Finished),
            Some(Pending::Ready(_)) | None => Err(Error::ProtocolError(
                "packet received with no command pending".to_string(),
            )),
        };

        match step {
            Ok(Action::NeedPacket) => Ok(()),
            Ok(Action::Finished) => {
                if let Some(head) = self.queue.pop_front() {
                    self.finish(head)?;
                }
                self.advance();
                Ok(())
            }
            Err(err) if !err.is_fatal() => {
                if let Some(head) = self.queue.pop_front() {
                    head.fail(err);
                }
                self.advance();
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn finish(&mut self, head: Pending) -> Result<()> {
        match head {
            Pending::Query {
                collector, reply, ..
            } => {
                let _ = reply.send(Ok(collector.finish()));
            }
            Pending::Ping { reply, .. } => {
                let _ = reply.send(Ok(()));
            }
            Pending::Prepare {
                key,
                names,
                prepare,
                after,
                ..
            } => {
                let response = prepare.into_response();
                let statement = match self.cache.peek(&key) {
                    // the same SQL was prepared twice in one pipeline; keep
                    // the id callers may already hold
                    Some(existing) => {
                        self.close_statement(response.statement_id)?;
                        existing
                    }
                    None => {
                        let statement = Statement {
                            id: response.statement_id,
                            sql: key,
                            names,
                            params: Arc::from(response.params),
                            columns: Arc::from(response.columns),
                        };
                        debug!(id = statement.id, sql = %statement.sql, "statement prepared");
                        if let Some(evicted) = self.cache.insert(statement.clone()) {
                            debug!(id = evicted.id, "closing evicted statement");
                            self.close_statement(evicted.id)?;
                        }
                        statement
                    }
                };
                match after {
                    AfterPrepare::Reply(reply) => {
                        let _ = reply.send(Ok(statement));
                    }
                    AfterPrepare::Execute { params, reply } => {
                        self.submit_execute(statement, params, reply)?;
                    }
                }
            }
            Pending::Ready(ready) => ready.deliver(),
        }
        Ok(())
    }

    /// Fail every queued and not yet submitted command.
    fn fail_all(&mut self, err: Error) {
        for pending in self.queue.drain(..) {
            pending.fail(err.clone());
        }
        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            request.fail(err.clone());
        }
        self.cache.clear();
    }

    /// Send COM_QUIT and shut the stream down, ignoring transport errors.
    async fn quit(&mut self) {
        self.state.send_replace(ConnState::Closing);
        let mut out = BytesMut::new();
        self.scratch.clear();
        write_quit(&mut self.scratch);
        self.codec.write_command(&mut out, &self.scratch);
        if let Err(err) = self.writer.write_all(&out).await {
            trace!(error = %err, "quit not delivered");
        }
        let _ = self.writer.shutdown().await;
        self.cache.clear();
        self.state.send_replace(ConnState::Closed);
    }
}
