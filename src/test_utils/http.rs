//! Canned-response HTTP server for exercising the real reqwest stack.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// How a route answers.
#[derive(Debug, Clone)]
enum Reply {
    /// Whole body with a `Content-Length`.
    Fixed(u16, Vec<u8>),
    /// `Transfer-Encoding: chunked` body, one write per chunk with `delay`
    /// before each. With `stall` the connection hangs after the first chunk.
    Chunked {
        chunks: Vec<Vec<u8>>,
        delay: Duration,
        stall: bool,
    },
}

type Routes = Arc<Mutex<HashMap<String, Reply>>>;

/// HTTP/1.1 server on `127.0.0.1` answering `GET <path>` from a route table.
///
/// Unknown paths get a 404. Every request path is recorded in order. The
/// server stops when dropped.
pub struct TestServer {
    addr: SocketAddr,
    routes: Routes,
    hits: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let addr = listener.local_addr().expect("test server address");
        let routes: Routes = Arc::default();
        let hits: Arc<Mutex<Vec<String>>> = Arc::default();

        let handle = {
            let routes = routes.clone();
            let hits = hits.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let routes = routes.clone();
                    let hits = hits.clone();
                    tokio::spawn(async move {
                        let _ = serve(stream, routes, hits).await;
                    });
                }
            })
        };

        Self {
            addr,
            routes,
            hits,
            handle,
        }
    }

    /// Serve `body` with `status` at `path`, replacing any previous route.
    pub fn route(&self, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes.lock().unwrap().insert(path.to_string(), Reply::Fixed(status, body.into()));
    }

    /// Serve `chunks` at `path` with chunked encoding and no `Content-Length`,
    /// pausing `delay` before each chunk.
    pub fn route_chunked(&self, path: &str, chunks: Vec<Vec<u8>>, delay: Duration) {
        let reply = Reply::Chunked {
            chunks,
            delay,
            stall: false,
        };
        self.routes.lock().unwrap().insert(path.to_string(), reply);
    }

    /// Send the headers and `first` at `path`, then keep the connection open
    /// without sending anything else.
    pub fn route_stalled(&self, path: &str, first: impl Into<Vec<u8>>) {
        let reply = Reply::Chunked {
            chunks: vec![first.into()],
            delay: Duration::ZERO,
            stall: true,
        };
        self.routes.lock().unwrap().insert(path.to_string(), reply);
    }

    /// Base URL, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url())
    }

    /// Request paths received so far.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    pub fn hit_count(&self, path: &str) -> usize {
        self.hits.lock().unwrap().iter().filter(|p| *p == path).count()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    routes: Routes,
    hits: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf);
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    hits.lock().unwrap().push(path.clone());

    let reply = routes
        .lock()
        .unwrap()
        .get(&path)
        .cloned()
        .unwrap_or_else(|| Reply::Fixed(404, b"not found".to_vec()));

    match reply {
        Reply::Fixed(status, body) => {
            let header = format!(
                "HTTP/1.1 {status} {}\r\nContent-Length: {}\r\n\
                 Content-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
                reason(status),
                body.len()
            );
            stream.write_all(header.as_bytes()).await?;
            stream.write_all(&body).await?;
        }
        Reply::Chunked {
            chunks,
            delay,
            stall,
        } => {
            stream
                .write_all(
                    b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\
                      Content-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
                )
                .await?;
            for chunk in chunks {
                tokio::time::sleep(delay).await;
                stream.write_all(format!("{:x}\r\n", chunk.len()).as_bytes()).await?;
                stream.write_all(&chunk).await?;
                stream.write_all(b"\r\n").await?;
                stream.flush().await?;
            }
            if stall {
                std::future::pending::<()>().await;
            }
            stream.write_all(b"0\r\n\r\n").await?;
        }
    }
    stream.shutdown().await
}

const fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
