//! The transport: a plain TCP or TLS stream behind one type, so the rest of the client never
//! sees which one it is talking to.

use lazy_static::lazy_static;
use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::TcpStream,
};

#[cfg(feature = "tls-native")]
use tokio_native_tls::TlsStream;
#[cfg(feature = "tls-rustls")]
use tokio_rustls::client::TlsStream;

#[cfg(feature = "tls-native")]
lazy_static! {
    static ref TLS_CONNECTOR: tokio_native_tls::TlsConnector =
        tokio_native_tls::TlsConnector::from(native_tls::TlsConnector::builder().build().unwrap());
}

#[cfg(feature = "tls-rustls")]
lazy_static! {
    static ref TLS_CONNECTOR: tokio_rustls::TlsConnector = {
        let mut roots = tokio_rustls::rustls::RootCertStore::empty();
        for cert in rustls_native_certs::load_native_certs().unwrap() {
            roots
                .add(&tokio_rustls::rustls::Certificate(cert.0))
                .unwrap();
        }
        let config = tokio_rustls::rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth();
        tokio_rustls::TlsConnector::from(std::sync::Arc::new(config))
    };
}

// We box the fields to reduce type size: there's a large size difference between the variants,
// especially with rustls.
#[derive(Debug)]
pub(crate) enum Stream {
    Tcp(Box<TcpStream>),
    Tls(Box<TlsStream<TcpStream>>),
}

#[cfg(feature = "tls-native")]
pub type TlsError = native_tls::Error;
#[cfg(feature = "tls-rustls")]
pub type TlsError = tokio_rustls::rustls::Error;

#[derive(Debug)]
pub(crate) enum StreamError {
    Tls(TlsError),
    Io(io::Error),
}

impl From<TlsError> for StreamError {
    fn from(err: TlsError) -> StreamError {
        StreamError::Tls(err)
    }
}

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> StreamError {
        StreamError::Io(err)
    }
}

impl Stream {
    /// Open a connection to `host:port`, optionally wrapped in TLS. Host name resolution is left
    /// to tokio.
    pub(crate) async fn connect(host: &str, port: u16, tls: bool) -> Result<Stream, StreamError> {
        if tls {
            Stream::new_tls(host, port).await
        } else {
            Stream::new_tcp(host, port).await
        }
    }

    async fn new_tcp(host: &str, port: u16) -> Result<Stream, StreamError> {
        Ok(Stream::Tcp(TcpStream::connect((host, port)).await?.into()))
    }

    #[cfg(feature = "tls-native")]
    async fn new_tls(host: &str, port: u16) -> Result<Stream, StreamError> {
        let tcp_stream = TcpStream::connect((host, port)).await?;
        let tls_stream = TLS_CONNECTOR.connect(host, tcp_stream).await?;
        Ok(Stream::Tls(tls_stream.into()))
    }

    #[cfg(feature = "tls-rustls")]
    async fn new_tls(host: &str, port: u16) -> Result<Stream, StreamError> {
        let tcp_stream = TcpStream::connect((host, port)).await?;
        let name = tokio_rustls::rustls::ServerName::try_from(host)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let tls_stream = TLS_CONNECTOR.connect(name, tcp_stream).await?;
        Ok(Stream::Tls(tls_stream.into()))
    }
}

//
// Boilerplate
//

impl AsyncRead for Stream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<(), io::Error>> {
        match *self {
            Stream::Tcp(ref mut tcp_stream) => Pin::new(tcp_stream).poll_read(cx, buf),
            Stream::Tls(ref mut tls_stream) => Pin::new(tls_stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        match *self {
            Stream::Tcp(ref mut tcp_stream) => Pin::new(tcp_stream).poll_write(cx, buf),
            Stream::Tls(ref mut tls_stream) => Pin::new(tls_stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), io::Error>> {
        match *self {
            Stream::Tcp(ref mut tcp_stream) => Pin::new(tcp_stream).poll_flush(cx),
            Stream::Tls(ref mut tls_stream) => Pin::new(tls_stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), io::Error>> {
        match *self {
            Stream::Tcp(ref mut tcp_stream) => Pin::new(tcp_stream).poll_shutdown(cx),
            Stream::Tls(ref mut tls_stream) => Pin::new(tls_stream).poll_shutdown(cx),
        }
    }
}
