//! The transport seam.
//!
//! A transport is any `tower::Service<DeliveryRequest, Response = (), Error = TransportError>`.
//! The core never talks to the network itself; `relaylog-http` provides a reqwest-backed
//! implementation and [`MemoryTransport`] covers tests.
use crate::error::TransportError;
use crate::event::LogEvent;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tower_service::Service;

/// HTTP-like request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// One request handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Whether the transport must attach credentials.
    pub authenticated: bool,
}

#[derive(Serialize)]
struct BatchBody<'a> {
    events: &'a [LogEvent],
}

impl DeliveryRequest {
    /// Authenticated `POST` of `{"events": [...]}` to `url`.
    pub fn batch(url: &str, events: &[LogEvent]) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(&BatchBody { events })?;
        Ok(Self {
            method: Method::Post,
            url: url.to_string(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body,
            authenticated: true,
        })
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// What [`MemoryTransport`] does once its scripted responses run out.
#[derive(Debug, Clone)]
enum Fallback {
    Succeed,
    Fail(TransportError),
}

#[derive(Debug)]
struct MemoryState {
    requests: Vec<DeliveryRequest>,
    scripted: VecDeque<Result<(), TransportError>>,
    fallback: Fallback,
}

/// In-memory transport recording every request, with scripted responses.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Transport that accepts everything.
    pub fn new() -> Self {
        Self::with_fallback(Fallback::Succeed)
    }

    /// Transport that fails every request with `error`.
    pub fn failing(error: TransportError) -> Self {
        Self::with_fallback(Fallback::Fail(error))
    }

    fn with_fallback(fallback: Fallback) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                requests: Vec::new(),
                scripted: VecDeque::new(),
                fallback,
            })),
        }
    }

    /// Queue a response used before the fallback applies.
    pub fn push_response(&self, response: Result<(), TransportError>) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).scripted.push_back(response);
    }

    pub fn requests(&self) -> Vec<DeliveryRequest> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).requests.clone()
    }

    /// Number of events carried by each request, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.requests()
            .iter()
            .map(|r| {
                r.json()
                    .ok()
                    .and_then(|v| v.get("events").and_then(|e| e.as_array()).map(Vec::len))
                    .unwrap_or(0)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Service<DeliveryRequest> for MemoryTransport {
    type Response = ();
    type Error = TransportError;
    type Future = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: DeliveryRequest) -> Self::Future {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.requests.push(request);
        let response = match state.scripted.pop_front() {
            Some(scripted) => scripted,
            None => match &state.fallback {
                Fallback::Succeed => Ok(()),
                Fallback::Fail(err) => Err(err.clone()),
            },
        };
        Box::pin(async move { response })
    }
}

/// Transport that accepts and discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl Service<DeliveryRequest> for NullTransport {
    type Response = ();
    type Error = TransportError;
    type Future = futures::future::Ready<Result<(), TransportError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _request: DeliveryRequest) -> Self::Future {
        futures::future::ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Entry, Fields};
    use tower::ServiceExt;

    fn event(action: &str) -> LogEvent {
        LogEvent::build(Entry::ok().action(action), Fields::default()).0
    }

    #[test]
    fn batch_wraps_events() {
        let events = vec![event("a"), event("b")];
        let request = DeliveryRequest::batch("https://c/logs", &events).unwrap();
        assert_eq!(request.method, Method::Post);
        assert!(request.authenticated);
        let body = request.json().unwrap();
        let sent = body["events"].as_array().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1]["action"], "b");
    }

    #[tokio::test]
    async fn memory_transport_uses_script_then_fallback() {
        let transport = MemoryTransport::new();
        transport.push_response(Err(TransportError::api("u", 500)));
        let request = DeliveryRequest::batch("u", &[event("a")]).unwrap();

        let first = transport.clone().oneshot(request.clone()).await;
        assert_eq!(first, Err(TransportError::api("u", 500)));
        let second = transport.clone().oneshot(request).await;
        assert_eq!(second, Ok(()));
        assert_eq!(transport.len(), 2);
        assert_eq!(transport.batch_sizes(), vec![1, 1]);
    }

    #[tokio::test]
    async fn failing_transport_always_fails() {
        let err = TransportError::connectivity("u", "down");
        let transport = MemoryTransport::failing(err.clone());
        for _ in 0..3 {
            let request = DeliveryRequest::batch("u", &[]).unwrap();
            assert_eq!(transport.clone().oneshot(request).await, Err(err.clone()));
        }
        assert_eq!(transport.batch_sizes(), vec![0, 0, 0]);
    }

    #[test]
    fn method_display() {
        assert_eq!(Method::Post.to_string(), "POST");
    }
}
