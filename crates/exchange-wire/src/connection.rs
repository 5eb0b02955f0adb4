//! A persistent connection to the exchange.
//!
//! A connection carries one request at a time. The protocol has no request
//! ids, so a second request sent before the first response is complete
//! could have its response read as the tail of the first one.
//! `send_and_receive` takes `&mut self`, which makes overlapping calls on
//! one connection impossible.

use crate::codec::{DecodeResult, FrameDecoder, ResponseDecoder};
use crate::error::WireError;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

/// Bytes requested from the socket per read call.
pub const READ_CHUNK_SIZE: usize = 4096;

/// A complete response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response document, without any length prefix.
    pub payload: Vec<u8>,
    /// Bytes consumed from the stream for this response, prefix included.
    pub wire_len: usize,
    /// Time from just before the write to just after completion.
    pub elapsed: Duration,
}

/// One open stream plus the decoder used to recognize responses.
pub struct Connection<S = TcpStream> {
    stream: S,
    decoder: Arc<dyn FrameDecoder>,
    peer: String,
    buffer: Vec<u8>,
    requests: u64,
}

impl Connection<TcpStream> {
    /// Open a TCP connection to `host:port`.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<Self, WireError> {
        let addr = format!("{host}:{port}");
        let stream =
            within_connect_timeout(&addr, connect_timeout, TcpStream::connect((host, port)))
                .await?;
        stream
            .set_nodelay(true)
            .map_err(|source| WireError::Connect {
                addr: addr.clone(),
                source,
            })?;

        debug!("Connected to {}", addr);
        Ok(Self::from_stream(stream, addr))
    }
}

/// Bound a connect attempt by `connect_timeout` and label its failure.
async fn within_connect_timeout<T>(
    addr: &str,
    connect_timeout: Duration,
    connecting: impl Future<Output = io::Result<T>>,
) -> Result<T, WireError> {
    match timeout(connect_timeout, connecting).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(WireError::Connect {
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(WireError::ConnectTimeout {
            addr: addr.to_string(),
            after: connect_timeout,
        }),
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already open stream.
    pub fn from_stream(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream,
            decoder: Arc::new(ResponseDecoder::default()),
            peer: peer.into(),
            buffer: Vec::with_capacity(READ_CHUNK_SIZE),
            requests: 0,
        }
    }

    /// Replace the response decoder.
    pub fn with_decoder(mut self, decoder: Arc<dyn FrameDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Number of requests written on this connection.
    pub fn requests_sent(&self) -> u64 {
        self.requests
    }

    /// Write one framed request and wait for its response.
    ///
    /// `deadline` bounds the whole exchange, write included. Reads happen
    /// in [`READ_CHUNK_SIZE`] pieces; each piece goes to the decoder until
    /// it reports a complete response or a framing error.
    pub async fn send_and_receive(
        &mut self,
        framed: &[u8],
        deadline: Duration,
    ) -> Result<Response, WireError> {
        let start = Instant::now();
        let expires = start + deadline;
        self.buffer.clear();
        self.requests += 1;

        match timeout_at(expires, self.stream.write_all(framed)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(WireError::Write(e)),
            Err(_) => return Err(WireError::Timeout(deadline)),
        }
        match timeout_at(expires, self.stream.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(WireError::Write(e)),
            Err(_) => return Err(WireError::Timeout(deadline)),
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut received = 0usize;
        loop {
            let n = match timeout_at(expires, self.stream.read(&mut chunk)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(WireError::Read(e)),
                Err(_) => return Err(WireError::Timeout(deadline)),
            };
            if n == 0 {
                return Err(WireError::Closed { received });
            }
            received += n;

            match self.decoder.decode_incremental(&mut self.buffer, &chunk[..n]) {
                DecodeResult::Incomplete => continue,
                DecodeResult::Complete { payload, remaining } => {
                    let elapsed = start.elapsed();
                    if !remaining.is_empty() {
                        warn!(
                            "Discarding {} unexpected bytes after response from {}",
                            remaining.len(),
                            self.peer
                        );
                    }
                    return Ok(Response {
                        payload,
                        wire_len: received - remaining.len(),
                        elapsed,
                    });
                }
                DecodeResult::FramingError { reason, consumed } => {
                    return Err(WireError::Framing { reason, consumed })
                }
            }
        }
    }

    /// Close the write side and drop the stream.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Error shutting down connection to {}: {}", self.peer, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, CompletionMode};
    use tokio::io::{duplex, DuplexStream};

    /// Read one framed request from the server end of a duplex pipe.
    async fn read_request(server: &mut DuplexStream) -> String {
        let mut header = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            server.read_exact(&mut byte).await.unwrap();
            if byte[0] == b'\n' {
                break;
            }
            header.push(byte[0]);
        }
        let len: usize = String::from_utf8(header).unwrap().parse().unwrap();
        let mut body = vec![0u8; len];
        server.read_exact(&mut body).await.unwrap();
        String::from_utf8(body).unwrap()
    }

    #[tokio::test]
    async fn test_chunked_marker_response() {
        let (client, mut server) = duplex(1024);
        let server_task = tokio::spawn(async move {
            let request = read_request(&mut server).await;
            for part in ["<resu", "lts>ok</res", "ults>"] {
                server.write_all(part.as_bytes()).await.unwrap();
                server.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            request
        });

        let mut conn = Connection::from_stream(client, "duplex");
        let response = conn
            .send_and_receive(&encode("<create></create>"), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(response.payload, b"<results>ok</results>");
        assert_eq!(response.wire_len, 21);
        assert!(response.elapsed >= Duration::from_millis(5));
        assert_eq!(server_task.await.unwrap(), "<create></create>");
        assert_eq!(conn.requests_sent(), 1);
    }

    #[tokio::test]
    async fn test_length_prefixed_response_counts_header() {
        let (client, mut server) = duplex(1024);
        tokio::spawn(async move {
            read_request(&mut server).await;
            server.write_all(&encode("<results></results>")).await.unwrap();
        });

        let mut conn = Connection::from_stream(client, "duplex");
        let response = conn
            .send_and_receive(&encode("<create></create>"), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(response.payload, b"<results></results>");
        assert_eq!(response.wire_len, 3 + 19);
    }

    #[tokio::test]
    async fn test_eof_before_marker_is_closed() {
        let (client, mut server) = duplex(1024);
        tokio::spawn(async move {
            read_request(&mut server).await;
            server.write_all(b"<results><created").await.unwrap();
            drop(server);
        });

        let mut conn = Connection::from_stream(client, "duplex");
        let err = conn
            .send_and_receive(&encode("<create></create>"), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, WireError::Closed { received: 17 }), "{err:?}");
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let (client, mut server) = duplex(1024);
        let server_task = tokio::spawn(async move {
            read_request(&mut server).await;
            // Hold the stream open without answering.
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(server);
        });

        let mut conn = Connection::from_stream(client, "duplex");
        let started = std::time::Instant::now();
        let err = conn
            .send_and_receive(&encode("<create></create>"), Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, WireError::Timeout(_)), "{err:?}");
        assert!(started.elapsed() < Duration::from_millis(450));
        server_task.abort();
    }

    #[tokio::test]
    async fn test_framing_error_from_strict_decoder() {
        let (client, mut server) = duplex(1024);
        tokio::spawn(async move {
            read_request(&mut server).await;
            server.write_all(b"<results></results>").await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let decoder = Arc::new(ResponseDecoder::new(CompletionMode::LengthPrefix));
        let mut conn = Connection::from_stream(client, "duplex").with_decoder(decoder);
        let err = conn
            .send_and_receive(&encode("<create></create>"), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, WireError::Framing { consumed: false, .. }), "{err:?}");
        assert!(err.poisons_connection());
    }

    #[tokio::test]
    async fn test_write_to_closed_peer_fails() {
        let (client, server) = duplex(8);
        drop(server);

        let mut conn = Connection::from_stream(client, "duplex");
        let err = conn
            .send_and_receive(&encode("<create></create>"), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, WireError::Write(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_connect_that_never_finishes_times_out() {
        let after = Duration::from_millis(20);
        let result =
            within_connect_timeout("10.0.0.1:12345", after, std::future::pending::<io::Result<()>>())
                .await;

        match result {
            Err(WireError::ConnectTimeout { addr, after: waited }) => {
                assert_eq!(addr, "10.0.0.1:12345");
                assert_eq!(waited, after);
            }
            other => panic!("expected ConnectTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_error_is_labelled_connect() {
        let refused = async { Err::<(), _>(io::Error::from(io::ErrorKind::ConnectionRefused)) };
        let err = within_connect_timeout("127.0.0.1:1", Duration::from_secs(1), refused)
            .await
            .unwrap_err();

        assert!(matches!(err, WireError::Connect { .. }), "{err:?}");
        assert_eq!(err.kind(), crate::error::ErrorKind::Connect);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Connection::connect("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(WireError::Connect { .. })));
    }
}
