use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinError, JoinSet};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::dispatcher::DepositDispatcher;
use super::events::normalize_batch;
use crate::error::RelayError;

pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
const MAX_HEADER_BYTES: usize = 16 * 1024;
pub const CONNECTION_GRACE: Duration = Duration::from_secs(5);

/// What the listener answers, and the events it accepted if any.
#[derive(Debug, PartialEq)]
pub struct WebhookReply {
    pub status: u16,
    pub body: Value,
    pub accepted: Option<Value>,
}

impl WebhookReply {
    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
            accepted: None,
        }
    }
}

pub struct WebhookListener {
    listener: TcpListener,
    dispatcher: Arc<DepositDispatcher>,
    auth_token: Option<String>,
}

impl WebhookListener {
    pub async fn bind(
        addr: SocketAddr,
        dispatcher: Arc<DepositDispatcher>,
        auth_token: Option<String>,
    ) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            dispatcher,
            auth_token: auth_token.filter(|t| !t.is_empty()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until `shutdown` resolves, then stops accepting and drains.
    /// Connections get [`CONNECTION_GRACE`] to finish; accepted batches
    /// always run to completion.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), RelayError> {
        info!(target: "webhook", addr = %self.local_addr()?, "webhook listener started");
        let auth_token = Arc::new(self.auth_token);
        let mut connections: JoinSet<Option<Value>> = JoinSet::new();
        let mut batches: JoinSet<()> = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        let auth_token = auth_token.clone();
                        connections.spawn(async move {
                            serve_connection(socket, auth_token.as_deref())
                                .await
                                .unwrap_or_else(|e| {
                                    debug!(target: "webhook", peer = %peer, error = %e, "connection error");
                                    None
                                })
                        });
                    }
                    Err(e) => warn!(target: "webhook", error = %e, "accept failed"),
                },
                Some(joined) = connections.join_next() => {
                    spawn_batch(&mut batches, &self.dispatcher, joined);
                }
                Some(_) = batches.join_next() => {}
            }
        }

        info!(
            target: "webhook",
            connections = connections.len(),
            batches = batches.len(),
            "draining webhook work"
        );
        let dispatcher = &self.dispatcher;
        let finished = timeout(CONNECTION_GRACE, async {
            while let Some(joined) = connections.join_next().await {
                spawn_batch(&mut batches, dispatcher, joined);
            }
        })
        .await;
        if finished.is_err() {
            warn!(target: "webhook", abandoned = connections.len(), "connections did not finish in time");
            connections.shutdown().await;
        }
        while batches.join_next().await.is_some() {}
        info!(target: "webhook", "webhook listener stopped");
        Ok(())
    }
}

fn spawn_batch(
    batches: &mut JoinSet<()>,
    dispatcher: &Arc<DepositDispatcher>,
    joined: Result<Option<Value>, JoinError>,
) {
    let payload = match joined {
        Ok(Some(payload)) => payload,
        Ok(None) => return,
        Err(e) => {
            warn!(target: "webhook", error = %e, "connection task failed");
            return;
        }
    };
    let deposits = normalize_batch(&payload);
    info!(target: "webhook", deposits = deposits.len(), "dispatching notification batch");
    let dispatcher = dispatcher.clone();
    batches.spawn(async move {
        dispatcher.dispatch_batch(deposits).await;
    });
}

/// Answers one request and hands back the payload it accepted.
async fn serve_connection(
    mut socket: TcpStream,
    auth_token: Option<&str>,
) -> Result<Option<Value>, RelayError> {
    let reply = match read_request(&mut socket).await? {
        Ok(raw) => handle_request(&raw, auth_token),
        Err(reply) => reply,
    };

    let body = reply.body.to_string();
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reason_phrase(reply.status),
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await.ok();
    Ok(reply.accepted)
}

/// Reads headers and a `Content-Length` body, refusing oversize requests early.
async fn read_request(socket: &mut TcpStream) -> Result<Result<Vec<u8>, WebhookReply>, RelayError> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Ok(Err(WebhookReply::error(400, "headers too large")));
        }
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(Err(WebhookReply::error(400, "incomplete request")));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let content_length = header_value(&buf[..header_end], "content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Ok(Err(WebhookReply::error(413, "payload too large")));
    }

    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    buf.truncate(body_start + content_length);
    Ok(Ok(buf))
}

/// Routes one raw HTTP request. Dispatch happens after the reply is sent.
pub fn handle_request(raw: &[u8], auth_token: Option<&str>) -> WebhookReply {
    let Some(header_end) = find_header_end(raw) else {
        return WebhookReply::error(400, "malformed request");
    };
    let head = &raw[..header_end];
    let body = &raw[(header_end + 4).min(raw.len())..];

    let request_line = String::from_utf8_lossy(head);
    let method = request_line.split_whitespace().next().unwrap_or("");
    if method != "POST" {
        return WebhookReply::error(405, "method not allowed");
    }

    if let Some(expected) = auth_token {
        let provided = header_value(head, "authorization");
        let matches = provided
            .as_deref()
            .map(|v| v == expected || v.strip_prefix("Bearer ") == Some(expected))
            .unwrap_or(false);
        if !matches {
            return WebhookReply::error(401, "unauthorized");
        }
    }

    if body.len() > MAX_BODY_BYTES {
        return WebhookReply::error(413, "payload too large");
    }

    let payload: Value = match serde_json::from_slice(body) {
        Ok(value @ (Value::Array(_) | Value::Object(_))) => value,
        Ok(_) => return WebhookReply::error(400, "expected an event or an array of events"),
        Err(_) => return WebhookReply::error(400, "invalid JSON"),
    };
    let count = match &payload {
        Value::Array(events) => events.len(),
        _ => 1,
    };

    WebhookReply {
        status: 200,
        body: json!({ "accepted": count }),
        accepted: Some(payload),
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn header_value(head: &[u8], name: &str) -> Option<String> {
    String::from_utf8_lossy(head)
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim().to_string())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        _ => "Error",
    }
}
