//! In-process agent double speaking JSON-RPC over HTTP
//!
//! Scripted per call: the route closure sees the decoded request envelope
//! and the 0-based hit index, and picks the reply. Success and error
//! replies echo the request's correlation id the way a real agent would.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    /// Success envelope echoing the request id
    Result(Value),
    /// JSON-RPC error object echoing the request id
    Error(i64, &'static str),
    /// Verbatim envelope, no id echo
    Static(Value),
    /// HTTP failure status without an envelope
    HttpFailure(u16),
}

pub struct MockAgent {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Value>>>,
    server: JoinHandle<()>,
}

impl MockAgent {
    /// Answer every call the same way
    pub async fn start(reply: Reply) -> Self {
        Self::start_routed(move |_, _| reply.clone()).await
    }

    /// Pick the reply per decoded request and hit index
    pub async fn start_routed<F>(route: F) -> Self
    where
        F: Fn(&Value, usize) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock agent");
        let addr = listener.local_addr().expect("mock agent addr");
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let task_hits = Arc::clone(&hits);
        let task_requests = Arc::clone(&requests);
        let server = tokio::spawn(async move {
            let route = Arc::new(route);
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let hit = task_hits.fetch_add(1, Ordering::SeqCst);
                let route = Arc::clone(&route);
                let requests = Arc::clone(&task_requests);
                tokio::spawn(async move {
                    serve_one(stream, hit, route, requests).await;
                });
            }
        });

        Self {
            addr,
            hits,
            requests,
            server,
        }
    }

    /// Endpoint URL for codec construction
    pub fn url(&self) -> String {
        format!("http://{}/rpc", self.addr)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// How many calls arrived
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Decoded request envelopes, in arrival order
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl Drop for MockAgent {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn serve_one<F>(
    mut stream: TcpStream,
    hit: usize,
    route: Arc<F>,
    requests: Arc<Mutex<Vec<Value>>>,
) where
    F: Fn(&Value, usize) -> Reply + Send + Sync + 'static,
{
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    requests.lock().expect("requests lock").push(request.clone());

    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let response = match route(&request, hit) {
        Reply::Result(result) => http_ok(json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": id
        })),
        Reply::Error(code, message) => http_ok(json!({
            "jsonrpc": "2.0",
            "error": { "code": code, "message": message },
            "id": id
        })),
        Reply::Static(body) => http_ok(body),
        Reply::HttpFailure(status) => format!(
            "HTTP/1.1 {status} Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\noops"
        ),
    };

    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn http_ok(body: Value) -> String {
    let body = body.to_string();
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Read one HTTP request and decode its JSON body
async fn read_request(stream: &mut TcpStream) -> Option<Value> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if buffer.len() > 64 * 1024 {
            return None;
        }
    };

    let headers = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let content_length = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buffer.len() < body_start + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }

    let end = (body_start + content_length).min(buffer.len());
    serde_json::from_slice(&buffer[body_start..end]).ok()
}
