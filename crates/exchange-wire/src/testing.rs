//! A scripted in-memory stream for exercising connections and clients.
//!
//! [`ScriptedStream`] plays the exchange side of a connection. Each complete
//! framed request written to it consumes the next [`Reply`] from its script.
//! A [`ScriptHandle`] shared with the test records every request and counts
//! requests written while an earlier response was still unread.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// What the fake exchange does with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Deliver the response in these chunks, one chunk per read.
    Respond(Vec<Vec<u8>>),
    /// Accept the request and never answer.
    Silent,
    /// Close the stream without answering.
    Close,
    /// Deliver these bytes, then close the stream.
    CloseAfter(Vec<u8>),
    /// Fail the write of the request with a broken pipe.
    FailWrite,
}

impl Reply {
    /// Respond with `body` split into `parts` roughly equal chunks.
    pub fn chunked(body: &[u8], parts: usize) -> Self {
        let parts = parts.clamp(1, body.len().max(1));
        let size = body.len().div_ceil(parts).max(1);
        Reply::Respond(body.chunks(size).map(<[u8]>::to_vec).collect())
    }

    /// Respond with `body` in a single chunk.
    pub fn whole(body: impl Into<Vec<u8>>) -> Self {
        Reply::Respond(vec![body.into()])
    }
}

#[derive(Default)]
struct ScriptState {
    script: VecDeque<Reply>,
    written: Vec<u8>,
    requests: Vec<String>,
    /// Response chunks not yet read. The flag marks the last chunk of a response.
    pending: VecDeque<(Vec<u8>, bool)>,
    outstanding: bool,
    overlapping: usize,
    closed: bool,
    read_waker: Option<Waker>,
}

impl ScriptState {
    /// Pull complete `len\n<body>` frames out of the written bytes.
    fn take_requests(&mut self) {
        while let Some(newline) = self.written.iter().position(|&b| b == b'\n') {
            let len = match std::str::from_utf8(&self.written[..newline])
                .ok()
                .and_then(|s| s.trim().parse::<usize>().ok())
            {
                Some(len) => len,
                None => {
                    // Not a frame header; treat the line as an opaque request.
                    let line: Vec<u8> = self.written.drain(..=newline).collect();
                    self.accept(String::from_utf8_lossy(&line).into_owned());
                    continue;
                }
            };
            let end = newline + 1 + len;
            if self.written.len() < end {
                return;
            }
            let frame: Vec<u8> = self.written.drain(..end).collect();
            self.accept(String::from_utf8_lossy(&frame[newline + 1..]).into_owned());
        }
    }

    fn accept(&mut self, request: String) {
        if self.outstanding {
            self.overlapping += 1;
        }
        self.requests.push(request);

        match self.script.pop_front().unwrap_or(Reply::Close) {
            Reply::Respond(chunks) => {
                let last = chunks.len().saturating_sub(1);
                for (i, chunk) in chunks.into_iter().enumerate() {
                    self.pending.push_back((chunk, i == last));
                }
                self.outstanding = true;
            }
            Reply::Silent | Reply::FailWrite => self.outstanding = true,
            Reply::Close => self.closed = true,
            Reply::CloseAfter(bytes) => {
                self.pending.push_back((bytes, false));
                self.closed = true;
            }
        }
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }
}

/// Inspects a [`ScriptedStream`] after it has been moved into a connection.
#[derive(Clone)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Request bodies received so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    /// Requests that arrived while an earlier response was still unread.
    pub fn overlapping_requests(&self) -> usize {
        self.lock().overlapping
    }

    /// Script entries not yet consumed.
    pub fn remaining_replies(&self) -> usize {
        self.lock().script.len()
    }
}

/// The exchange side of a fake connection.
pub struct ScriptedStream {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedStream {
    pub fn new(script: impl IntoIterator<Item = Reply>) -> (Self, ScriptHandle) {
        let state = Arc::new(Mutex::new(ScriptState {
            script: script.into_iter().collect(),
            ..Default::default()
        }));
        (
            Self {
                state: state.clone(),
            },
            ScriptHandle { state },
        )
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AsyncRead for ScriptedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = self.lock();
        match state.pending.pop_front() {
            Some((mut chunk, last)) => {
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                if n < chunk.len() {
                    let rest = chunk.split_off(n);
                    state.pending.push_front((rest, last));
                } else if last {
                    state.outstanding = false;
                }
                Poll::Ready(Ok(()))
            }
            None if state.closed => Poll::Ready(Ok(())),
            None => {
                state.read_waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl AsyncWrite for ScriptedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.lock();
        if state.closed {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        if state.script.front() == Some(&Reply::FailWrite) {
            state.script.pop_front();
            state.closed = true;
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        state.written.extend_from_slice(buf);
        state.take_requests();
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut state = self.lock();
        state.closed = true;
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_records_requests_and_replays_chunks() {
        let (mut stream, handle) =
            ScriptedStream::new([Reply::chunked(b"<results></results>", 3)]);

        stream.write_all(&encode("<create></create>")).await.unwrap();
        assert_eq!(handle.requests(), vec!["<create></create>".to_string()]);

        let mut received = Vec::new();
        let mut reads = 0;
        while received.len() < 19 {
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            received.extend_from_slice(&buf[..n]);
            reads += 1;
        }
        assert_eq!(received, b"<results></results>");
        assert_eq!(reads, 3);
        assert_eq!(handle.overlapping_requests(), 0);
    }

    #[tokio::test]
    async fn test_counts_overlapping_requests() {
        let (mut stream, handle) = ScriptedStream::new([
            Reply::whole("<results></results>"),
            Reply::whole("<results></results>"),
        ]);

        stream.write_all(&encode("<create></create>")).await.unwrap();
        stream.write_all(&encode("<create></create>")).await.unwrap();
        assert_eq!(handle.overlapping_requests(), 1);
    }

    #[tokio::test]
    async fn test_request_split_across_writes() {
        let (mut stream, handle) = ScriptedStream::new([Reply::Silent]);
        let framed = encode("<create></create>");

        stream.write_all(&framed[..5]).await.unwrap();
        assert!(handle.requests().is_empty());
        stream.write_all(&framed[5..]).await.unwrap();
        assert_eq!(handle.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_close_gives_eof_and_fail_write_errors() {
        let (mut stream, _handle) = ScriptedStream::new([Reply::Close]);
        stream.write_all(&encode("<create></create>")).await.unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);

        let (mut stream, _handle) = ScriptedStream::new([Reply::CloseAfter(b"<resu".to_vec())]);
        stream.write_all(&encode("<create></create>")).await.unwrap();
        assert_eq!(stream.read(&mut buf).await.unwrap(), 5);
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);

        let (mut stream, handle) = ScriptedStream::new([Reply::FailWrite]);
        let err = stream.write_all(&encode("<create></create>")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(handle.remaining_replies(), 0);
    }

    #[test]
    fn test_chunked_reply_sizes() {
        match Reply::chunked(b"abcdefg", 3) {
            Reply::Respond(chunks) => {
                assert_eq!(chunks, vec![b"abc".to_vec(), b"def".to_vec(), b"g".to_vec()])
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
