use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};
use tracing::debug;

#[cfg(feature = "tls")]
use tokio_native_tls::TlsStream;

use crate::error::{Error, Result};
use crate::opts::{Config, SslOpts};

/// A byte stream the connection can run over.
///
/// `upgrade_to_tls` is called after the SSL request has been written and
/// must return a stream that encrypts everything that follows.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    fn upgrade_to_tls(
        self,
        host: &str,
        opts: &SslOpts,
    ) -> impl Future<Output = Result<Self>> + Send
    where
        Self: Sized;
}

pub enum Stream {
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<TlsStream<TcpStream>>),
    Unix(UnixStream),
}

impl Stream {
    /// Open a TCP or Unix socket connection as configured.
    pub async fn connect(config: &Config) -> Result<Self> {
        if let Some(path) = &config.socket {
            debug!(path = %path, "connecting to unix socket");
            return Ok(Self::Unix(UnixStream::connect(path).await?));
        }
        debug!(host = %config.host, port = config.port, "connecting");
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        stream.set_nodelay(config.tcp_nodelay)?;
        Ok(Self::Tcp(stream))
    }
}

#[cfg(feature = "tls")]
fn tls_connector(opts: &SslOpts) -> Result<native_tls::TlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();
    if let Some(pem) = &opts.ca_pem {
        let cert = native_tls::Certificate::from_pem(pem)
            .map_err(|e| Error::TlsError(format!("invalid CA certificate: {e}")))?;
        builder.add_root_certificate(cert);
    }
    if !opts.reject_unauthorized {
        builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }
    let protocol = |version: crate::opts::TlsVersion| match version {
        crate::opts::TlsVersion::Tls10 => native_tls::Protocol::Tlsv10,
        crate::opts::TlsVersion::Tls11 => native_tls::Protocol::Tlsv11,
        crate::opts::TlsVersion::Tls12 => native_tls::Protocol::Tlsv12,
    };
    builder.min_protocol_version(opts.min_protocol.map(protocol));
    builder.max_protocol_version(opts.max_protocol.map(protocol));
    builder
        .build()
        .map_err(|e| Error::TlsError(e.to_string()))
}

impl Transport for Stream {
    async fn upgrade_to_tls(self, host: &str, opts: &SslOpts) -> Result<Self> {
        match self {
            #[cfg(feature = "tls")]
            Self::Tcp(tcp) => {
                let connector = tokio_native_tls::TlsConnector::from(tls_connector(opts)?);
                let domain = opts.server_name.as_deref().unwrap_or(host);
                let tls = connector
                    .connect(domain, tcp)
                    .await
                    .map_err(|e| Error::TlsError(e.to_string()))?;
                debug!(domain, "TLS established");
                Ok(Self::Tls(Box::new(tls)))
            }
            #[cfg(not(feature = "tls"))]
            Self::Tcp(_) => {
                let _ = (host, opts);
                Err(Error::TlsError(
                    "TLS requested but the tls feature is not enabled".to_string(),
                ))
            }
            #[cfg(feature = "tls")]
            Self::Tls(_) => Err(Error::TlsError("already using TLS".to_string())),
            Self::Unix(_) => Err(Error::TlsError(
                "TLS is not supported over Unix sockets".to_string(),
            )),
        }
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
            Self::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
            Self::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
            Self::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
            Self::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
