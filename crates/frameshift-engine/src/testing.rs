//! Scripted transport and pause used by the engine's unit tests.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};

use crate::credentials::Credential;
use crate::error::{Result, StudioError};
use crate::transport::{FetchedBody, GenerativeTransport};
use crate::video::Pause;

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Json(Value),
    ApiError { status: u16, message: String },
    Body(FetchedBody),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CallRecord {
    pub method: &'static str,
    pub url: String,
    pub credential: Option<String>,
    pub payload: Option<Value>,
}

/// Replies are consumed in order, one per call of any kind.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<CallRecord>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    fn next(&self, record: CallRecord) -> Result<Reply> {
        let service = record.url.clone();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(record);
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .ok_or_else(|| StudioError::Transport(format!("unscripted call to {service}")))
    }

    fn json_reply(&self, service: &str, record: CallRecord) -> Result<Value> {
        match self.next(record)? {
            Reply::Json(value) => Ok(value),
            Reply::ApiError { status, message } => Err(StudioError::Api {
                service: service.to_string(),
                status,
                message,
            }),
            Reply::Body(_) => Err(StudioError::Transport(
                "scripted body where JSON was expected".to_string(),
            )),
        }
    }
}

impl GenerativeTransport for ScriptedTransport {
    fn post_json(
        &self,
        service: &str,
        url: &str,
        credential: &Credential,
        payload: &Value,
    ) -> Result<Value> {
        self.json_reply(
            service,
            CallRecord {
                method: "POST",
                url: url.to_string(),
                credential: Some(credential.expose().to_string()),
                payload: Some(payload.clone()),
            },
        )
    }

    fn get_json(&self, service: &str, url: &str, credential: &Credential) -> Result<Value> {
        self.json_reply(
            service,
            CallRecord {
                method: "GET",
                url: url.to_string(),
                credential: Some(credential.expose().to_string()),
                payload: None,
            },
        )
    }

    fn fetch(&self, url: &str) -> Result<FetchedBody> {
        let record = CallRecord {
            method: "FETCH",
            url: url.to_string(),
            credential: None,
            payload: None,
        };
        match self.next(record)? {
            Reply::Body(body) => Ok(body),
            Reply::ApiError { status, message } => Ok(FetchedBody {
                status,
                status_text: message,
                content_type: None,
                bytes: Vec::new(),
            }),
            Reply::Json(value) => Ok(FetchedBody {
                status: 200,
                status_text: "OK".to_string(),
                content_type: Some("application/json".to_string()),
                bytes: value.to_string().into_bytes(),
            }),
        }
    }
}

/// Records requested waits instead of sleeping.
#[derive(Debug, Default)]
pub(crate) struct RecordingPause {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingPause {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().map(|waits| waits.clone()).unwrap_or_default()
    }
}

impl Pause for RecordingPause {
    fn pause(&self, duration: Duration) {
        if let Ok(mut waits) = self.waits.lock() {
            waits.push(duration);
        }
    }
}

pub(crate) fn image_response(bytes: &[u8]) -> Value {
    json!({
        "candidates": [{
            "content": {
                "parts": [{
                    "inlineData": {
                        "mimeType": "image/png",
                        "data": BASE64.encode(bytes),
                    }
                }]
            }
        }]
    })
}

pub(crate) fn text_response(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"parts": [{"text": text}]}
        }]
    })
}

pub(crate) fn video_body(bytes: &[u8]) -> Reply {
    Reply::Body(FetchedBody {
        status: 200,
        status_text: "OK".to_string(),
        content_type: Some("video/mp4".to_string()),
        bytes: bytes.to_vec(),
    })
}

/// Loopback HTTP/1.1 server answering each connection with the next canned response.
pub(crate) struct LocalServer {
    listener: TcpListener,
    pub base: String,
}

impl LocalServer {
    pub fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let base = format!("http://{}", listener.local_addr()?);
        Ok(Self { listener, base })
    }

    /// Serves `responses` in order; the thread yields the request lines it saw.
    pub fn serve(self, responses: Vec<String>) -> thread::JoinHandle<Vec<String>> {
        thread::spawn(move || {
            let mut seen = Vec::new();
            for response in responses {
                let Ok((mut stream, _)) = self.listener.accept() else {
                    break;
                };
                seen.push(read_request_line(&mut stream));
                let _ = stream.write_all(response.as_bytes());
            }
            seen
        })
    }
}

pub(crate) fn http_response(status_line: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

// Drains headers and any Content-Length body so the client never sees a reset.
fn read_request_line(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(end) = data.windows(4).position(|window| window == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..end]).to_string();
            let length = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while data.len() < end + 4 + length {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(read) => data.extend_from_slice(&chunk[..read]),
                }
            }
            return head.lines().next().unwrap_or_default().to_string();
        }
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return String::from_utf8_lossy(&data).to_string(),
            Ok(read) => data.extend_from_slice(&chunk[..read]),
        }
    }
}
