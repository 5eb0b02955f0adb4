//! A fake exchange server for end-to-end tests.
//!
//! [`FakeExchange`] listens on a random localhost port and reads requests in
//! the exchange framing (`len\n<xml>`). What it sends back depends on its
//! [`FakeMode`].

use exchange_wire::encode;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::debug;

/// How the fake exchange answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeMode {
    /// Answer every request with a `<results>` document listing one result
    /// element per request child.
    Respond {
        /// Send `len\n` before the document, as the real server does.
        length_prefixed: bool,
        /// Deliver the response in this many writes.
        chunks: usize,
    },
    /// Read requests and never answer.
    Silent,
    /// Close the connection as soon as a request arrives.
    CloseOnRequest,
    /// Answer with a length-prefixed body that is not a results document.
    Garbage,
}

impl Default for FakeMode {
    fn default() -> Self {
        FakeMode::Respond {
            length_prefixed: true,
            chunks: 1,
        }
    }
}

#[derive(Default)]
struct Counters {
    connections: AtomicU64,
    requests: AtomicU64,
}

/// A running fake exchange. Stops accepting when dropped.
pub struct FakeExchange {
    addr: SocketAddr,
    counters: Arc<Counters>,
    accept_task: JoinHandle<()>,
}

impl FakeExchange {
    pub async fn start(mode: FakeMode) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let counters = Arc::new(Counters::default());

        let task_counters = counters.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((socket, peer)) = listener.accept().await {
                task_counters.connections.fetch_add(1, Ordering::Relaxed);
                debug!("Fake exchange accepted {}", peer);
                tokio::spawn(serve(socket, mode, task_counters.clone()));
            }
        });

        Ok(Self {
            addr,
            counters,
            accept_task,
        })
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn connections(&self) -> u64 {
        self.counters.connections.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> u64 {
        self.counters.requests.load(Ordering::Relaxed)
    }
}

impl Drop for FakeExchange {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve(socket: TcpStream, mode: FakeMode, counters: Arc<Counters>) {
    let mut reader = BufReader::new(socket);
    loop {
        let request = match read_request(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(e) => {
                debug!("Fake exchange read failed: {}", e);
                return;
            }
        };
        counters.requests.fetch_add(1, Ordering::Relaxed);

        let reply = match mode {
            FakeMode::Respond {
                length_prefixed,
                chunks,
            } => {
                let body = results_for(&request);
                let bytes = if length_prefixed {
                    encode(&body)
                } else {
                    body.into_bytes()
                };
                if write_chunked(reader.get_mut(), &bytes, chunks).await.is_err() {
                    return;
                }
                continue;
            }
            FakeMode::Silent => continue,
            FakeMode::CloseOnRequest => return,
            FakeMode::Garbage => encode("hello"),
        };
        if reader.get_mut().write_all(&reply).await.is_err() {
            return;
        }
    }
}

/// Read one `len\n<xml>` request. `None` on a clean close.
async fn read_request(reader: &mut BufReader<TcpStream>) -> std::io::Result<Option<String>> {
    let mut header = String::new();
    if reader.read_line(&mut header).await? == 0 {
        return Ok(None);
    }
    let len: usize = header.trim().parse().map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("bad length line {header:?}"),
        )
    })?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(String::from_utf8_lossy(&body).into_owned()))
}

async fn write_chunked(socket: &mut TcpStream, bytes: &[u8], chunks: usize) -> std::io::Result<()> {
    let size = bytes.len().div_ceil(chunks.max(1)).max(1);
    for piece in bytes.chunks(size) {
        socket.write_all(piece).await?;
        socket.flush().await?;
        if chunks > 1 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
    Ok(())
}

/// One result element per top-level request child, in request order.
fn results_for(request: &str) -> String {
    let mut body = String::from("<results>");
    let mut rest = request;
    while let Some(start) = rest.find('<') {
        rest = &rest[start + 1..];
        let tag = &rest[..rest.find('>').unwrap_or(rest.len())];
        let name = tag.split([' ', '/']).next().unwrap_or_default();
        let element = match name {
            // Accounts nested under a symbol carry no balance.
            "account" if tag.contains("balance=") => "created",
            "symbol" => "created",
            "order" => "opened",
            "query" => "status",
            "cancel" => "canceled",
            _ => continue,
        };
        body.push_str(&format!("<{element}></{element}>"));
    }
    body.push_str("</results>");
    body
}
