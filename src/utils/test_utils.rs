use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::core::client::{BodyStream, HttpRequest, HttpResponse, HttpTransport};

/// `data: {...}` line carrying one content delta, without the trailing newline.
pub fn sse_line(content: &str) -> String {
    let event = json!({ "choices": [{ "delta": { "content": content } }] });
    format!("data: {event}")
}

pub fn sse_done() -> String {
    "data: [DONE]".to_string()
}

/// A complete streamed body: one line per delta followed by the sentinel.
pub fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::new();
    for delta in deltas {
        body.push_str(&sse_line(delta));
        body.push('\n');
    }
    body.push_str(&sse_done());
    body.push('\n');
    body
}

enum Script {
    Respond {
        status: u16,
        chunks: Vec<String>,
        tail: Tail,
    },
    Fail(String),
}

#[derive(Clone)]
enum Tail {
    Close,
    Error(String),
    Hang,
    Gate(Arc<Notify>),
}

/// In-memory transport that replays a scripted response and records requests.
pub struct ScriptedTransport {
    script: Script,
    calls: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    fn from_script(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn respond(status: u16, chunks: Vec<String>, tail: Tail) -> Arc<Self> {
        Self::from_script(Script::Respond {
            status,
            chunks,
            tail,
        })
    }

    /// 200 response whose body arrives as the given fragments.
    pub fn ok(chunks: Vec<String>) -> Arc<Self> {
        Self::respond(200, chunks, Tail::Close)
    }

    pub fn with_status(status: u16, chunks: Vec<String>) -> Arc<Self> {
        Self::respond(status, chunks, Tail::Close)
    }

    /// The connection itself cannot be established.
    pub fn failing(detail: &str) -> Arc<Self> {
        Self::from_script(Script::Fail(detail.to_string()))
    }

    /// The body breaks with `detail` after the given fragments.
    pub fn with_broken_body(chunks: Vec<String>, detail: &str) -> Arc<Self> {
        Self::respond(200, chunks, Tail::Error(detail.to_string()))
    }

    /// The body stalls forever after the given fragments.
    pub fn hanging_after(chunks: Vec<String>) -> Arc<Self> {
        Self::respond(200, chunks, Tail::Hang)
    }

    /// The body is held back until `gate` is notified, then the fragments
    /// are delivered and the stream closes.
    pub fn gated(gate: Arc<Notify>, chunks: Vec<String>) -> Arc<Self> {
        Self::respond(200, chunks, Tail::Gate(gate))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        let (status, chunks, tail) = match &self.script {
            Script::Fail(detail) => return Err(detail.clone()),
            Script::Respond {
                status,
                chunks,
                tail,
            } => (*status, chunks.clone(), tail.clone()),
        };

        let fragments: Vec<Result<Vec<u8>, String>> =
            chunks.into_iter().map(|chunk| Ok(chunk.into_bytes())).collect();

        let body: BodyStream = match tail {
            Tail::Close => Box::pin(stream::iter(fragments)),
            Tail::Error(detail) => {
                Box::pin(stream::iter(fragments).chain(stream::iter(vec![Err(detail)])))
            }
            Tail::Hang => Box::pin(stream::iter(fragments).chain(stream::pending())),
            Tail::Gate(gate) => Box::pin(
                stream::once(async move { gate.notified().await })
                    .flat_map(move |_| stream::iter(fragments.clone())),
            ),
        };

        Ok(HttpResponse { status, body })
    }
}

/// reqwest client that never routes loopback traffic through a proxy.
pub fn local_reqwest_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("build reqwest client")
}

/// Serve exactly one HTTP exchange on a loopback port.
///
/// Returns the endpoint URL and a handle resolving to the raw request text.
/// Body fragments are written separately with a short pause in between so
/// the client observes them as distinct reads.
pub async fn spawn_one_shot_server(
    status_line: &'static str,
    chunks: Vec<Vec<u8>>,
) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener address");

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept connection");
        let request = read_http_request(&mut socket).await;

        let head = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n"
        );
        socket
            .write_all(head.as_bytes())
            .await
            .expect("write response head");
        for chunk in chunks {
            socket.write_all(&chunk).await.expect("write body chunk");
            socket.flush().await.expect("flush body chunk");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let _ = socket.shutdown().await;
        request
    });

    (format!("http://{addr}/v1/chat/completions"), handle)
}

async fn read_http_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];

    loop {
        let read = socket.read(&mut chunk).await.expect("read request");
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);

        let Some(header_end) = find_header_end(&buffer) else {
            continue;
        };
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_ascii_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buffer.len() >= header_end + 4 + content_length {
            break;
        }
    }

    String::from_utf8_lossy(&buffer).into_owned()
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}
