use std::pin::{pin, Pin};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};
use reqwest::Url;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ChatRequest, ChatResponse};
use crate::core::chat_stream::{decode_stream, ChunkDecoder, StreamEvent};
use crate::core::error::ErrorKind;
use crate::utils::url::parse_endpoint;

/// Terminal result of one completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Success(String),
    Failure(ErrorKind),
    Cancelled,
}

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, String>> + Send>>;

/// A fully prepared POST.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

pub struct HttpResponse {
    pub status: u16,
    pub body: BodyStream,
}

/// Sends one request and hands back the status plus a lazily read body.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let mut http_request = self.client.post(request.url);
        for (name, value) in &request.headers {
            http_request = http_request.header(*name, value);
        }

        let response = http_request
            .body(request.body)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(|err| err.to_string()));

        Ok(HttpResponse {
            status,
            body: Box::pin(body),
        })
    }
}

/// Runs chat-completion exchanges and folds the decoded events into one reply.
#[derive(Clone)]
pub struct CompletionClient {
    transport: Arc<dyn HttpTransport>,
}

impl Default for CompletionClient {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestTransport::default()))
    }
}

impl CompletionClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Send `payload` to `endpoint` and wait for the complete reply.
    ///
    /// Every decoded event is passed to `observe` in arrival order before it
    /// is aggregated. Cancelling `cancel` drops the in-flight exchange and
    /// resolves to [`CompletionOutcome::Cancelled`]; nothing received up to
    /// that point is returned.
    pub async fn send<F>(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &ChatRequest,
        cancel: &CancellationToken,
        mut observe: F,
    ) -> CompletionOutcome
    where
        F: FnMut(&StreamEvent) + Send,
    {
        let url = match parse_endpoint(endpoint) {
            Ok(url) => url,
            Err(kind) => return CompletionOutcome::Failure(kind),
        };

        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(err) => {
                return CompletionOutcome::Failure(ErrorKind::Network(format!(
                    "failed to encode request: {err}"
                )))
            }
        };

        let request = HttpRequest {
            url,
            headers: vec![
                ("Content-Type", "application/json".to_string()),
                ("Authorization", format!("Bearer {api_key}")),
            ],
            body,
        };

        debug!(endpoint = %request.url, stream = payload.stream, "sending completion request");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("completion request cancelled");
                CompletionOutcome::Cancelled
            }
            outcome = self.exchange(request, payload.stream, cancel, &mut observe) => outcome,
        }
    }

    async fn exchange<F>(
        &self,
        request: HttpRequest,
        streaming: bool,
        cancel: &CancellationToken,
        observe: &mut F,
    ) -> CompletionOutcome
    where
        F: FnMut(&StreamEvent) + Send,
    {
        let response = match self.transport.post(request).await {
            Ok(response) => response,
            Err(detail) => return CompletionOutcome::Failure(ErrorKind::Network(detail)),
        };

        if !(200..300).contains(&response.status) {
            let status = response.status;
            let body = match collect_body(response.body).await {
                Ok(body) => String::from_utf8_lossy(&body).into_owned(),
                Err(detail) => detail,
            };
            debug!(status, "completion endpoint returned an error status");
            return CompletionOutcome::Failure(ErrorKind::Api {
                status,
                message: describe_error_body(&body),
            });
        }

        if streaming {
            aggregate_stream(response.body, cancel, observe).await
        } else {
            aggregate_whole_body(response.body, cancel, observe).await
        }
    }
}

async fn aggregate_stream<F>(
    body: BodyStream,
    cancel: &CancellationToken,
    observe: &mut F,
) -> CompletionOutcome
where
    F: FnMut(&StreamEvent) + Send,
{
    let mut events = pin!(decode_stream(body));
    let mut reply = String::new();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(detail) => return CompletionOutcome::Failure(ErrorKind::Network(detail)),
        };
        if cancel.is_cancelled() {
            return CompletionOutcome::Cancelled;
        }
        if accumulate(&mut reply, &event, observe) {
            break;
        }
    }

    CompletionOutcome::Success(reply)
}

async fn aggregate_whole_body<F>(
    body: BodyStream,
    cancel: &CancellationToken,
    observe: &mut F,
) -> CompletionOutcome
where
    F: FnMut(&StreamEvent) + Send,
{
    let body = match collect_body(body).await {
        Ok(body) => body,
        Err(detail) => return CompletionOutcome::Failure(ErrorKind::Network(detail)),
    };

    let mut decoder = ChunkDecoder::new();
    let mut events = decoder.push(&body);
    events.extend(decoder.finish());

    if !decoder.saw_event_lines() {
        events = events_from_completion_object(&body);
    }

    let mut reply = String::new();
    for event in &events {
        if cancel.is_cancelled() {
            return CompletionOutcome::Cancelled;
        }
        if accumulate(&mut reply, event, observe) {
            break;
        }
    }

    CompletionOutcome::Success(reply)
}

/// Servers that honor `stream: false` answer with one plain completion object.
fn events_from_completion_object(body: &[u8]) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();

    if !trimmed.is_empty() {
        match serde_json::from_str::<ChatResponse>(trimmed) {
            Ok(response) => {
                if let Some(content) = response.message_content() {
                    events.push(StreamEvent::ContentDelta(content));
                }
            }
            Err(_) => events.push(StreamEvent::ParseError(trimmed.to_string())),
        }
    }

    events.push(StreamEvent::Done);
    events
}

/// Fold one event into the reply. Returns `true` once the stream is done.
fn accumulate<F>(reply: &mut String, event: &StreamEvent, observe: &mut F) -> bool
where
    F: FnMut(&StreamEvent),
{
    observe(event);
    match event {
        StreamEvent::ContentDelta(text) => {
            reply.push_str(text);
            false
        }
        StreamEvent::ParseError(raw) => {
            debug!(payload = %raw, "skipping malformed stream event");
            false
        }
        StreamEvent::Done => true,
    }
}

async fn collect_body(mut body: BodyStream) -> Result<Vec<u8>, String> {
    let mut collected = Vec::new();
    while let Some(chunk) = body.next().await {
        collected.extend_from_slice(&chunk?);
    }
    Ok(collected)
}

fn extract_error_summary(value: &Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| value.get("error").and_then(Value::as_str))
        .or_else(|| value.get("message").and_then(Value::as_str))?;

    let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed).filter(|text| !text.is_empty())
}

/// Render an error response body for display: a one-line summary when the
/// body carries one, followed by the body in a fenced block.
fn describe_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Ok(pretty) = serde_json::to_string_pretty(&value) {
            return match extract_error_summary(&value) {
                Some(summary) => format!("{summary}\n```json\n{pretty}\n```"),
                None => format!("```json\n{pretty}\n```"),
            };
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("```xml\n{trimmed}\n```")
    } else {
        format!("```\n{trimmed}\n```")
    }
}
