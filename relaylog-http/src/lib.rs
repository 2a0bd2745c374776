//! HTTP transport for `relaylog`.
//!
//! [`HttpTransport`] sends each [`DeliveryRequest`] with reqwest and maps the outcome onto
//! [`TransportError`]: no response at all is a connectivity failure, any non-2xx status is an
//! API failure carrying the status and whatever `errorCode`/`errorId` the body names.

use futures::future::BoxFuture;
use relaylog::{DeliveryRequest, Method, TransportError};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// Request timeout applied unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Supplies bearer tokens for authenticated requests.
pub trait TokenSource: Send + Sync + fmt::Debug {
    /// Current token, or `None` when the client is not signed in.
    fn token(&self) -> Option<String>;
}

/// Fixed token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpTransportError {
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Builder for [`HttpTransport`].
#[derive(Debug)]
pub struct HttpTransportBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    tokens: Option<Arc<dyn TokenSource>>,
}

impl HttpTransportBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn token_source<T>(mut self, tokens: T) -> Self
    where
        T: TokenSource + 'static,
    {
        self.tokens = Some(Arc::new(tokens));
        self
    }

    pub fn build(self) -> Result<HttpTransport, HttpTransportError> {
        let mut client = reqwest::Client::builder().timeout(self.timeout);
        if let Some(agent) = self.user_agent {
            client = client.user_agent(agent);
        }
        Ok(HttpTransport { client: client.build()?, tokens: self.tokens })
    }
}

/// reqwest-backed transport service.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    tokens: Option<Arc<dyn TokenSource>>,
}

impl HttpTransport {
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder { timeout: DEFAULT_TIMEOUT, user_agent: None, tokens: None }
    }

    /// Use an existing client; timeouts and proxies are whatever it was built with.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client, tokens: None }
    }

    pub fn with_token_source<T>(mut self, tokens: T) -> Self
    where
        T: TokenSource + 'static,
    {
        self.tokens = Some(Arc::new(tokens));
        self
    }
}

impl tower_service::Service<DeliveryRequest> for HttpTransport {
    type Response = ();
    type Error = TransportError;
    type Future = BoxFuture<'static, Result<(), TransportError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DeliveryRequest) -> Self::Future {
        let client = self.client.clone();
        let token = match (&self.tokens, req.authenticated) {
            (Some(tokens), true) => tokens.token(),
            _ => None,
        };
        if req.authenticated && token.is_none() {
            tracing::debug!(url = %req.url, "no token available; sending unauthenticated");
        }
        Box::pin(async move {
            let url = req.url;
            let mut builder = client.request(method(req.method), url.as_str());
            for (name, value) in &req.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(token) = token {
                builder = builder.bearer_auth(token);
            }

            let response = builder
                .body(req.body)
                .send()
                .await
                .map_err(|e| TransportError::connectivity(url.as_str(), e.to_string()))?;
            let status = response.status();
            if status.is_success() {
                // Accepted once the status arrives; the body is not needed.
                tracing::trace!(%url, status = status.as_u16(), "request accepted");
                return Ok(());
            }

            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    tracing::debug!(%url, error = %err, "failed to read rejection body");
                    String::new()
                }
            };
            Err(api_error(&url, status.as_u16(), body))
        })
    }
}

fn method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn api_error(url: &str, status: u16, body: String) -> TransportError {
    let mut err = TransportError::api(url, status);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&body) {
        if let Some(code) = first_field(&map, &["errorCode", "code"]) {
            err = err.with_error_code(code);
        }
        if let Some(id) = first_field(&map, &["errorId", "id"]) {
            err = err.with_error_id(id);
        }
    }
    if !body.is_empty() {
        err = err.with_body(body);
    }
    err
}

fn first_field(map: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_reads_code_and_id() {
        let err = api_error(
            "https://c/logs",
            400,
            r#"{"errorCode":"VALIDATION_ERROR","errorId":"e-17"}"#.to_string(),
        );
        match err {
            TransportError::Api { status, error_code, error_id, body, .. } => {
                assert_eq!(status, 400);
                assert_eq!(error_code.as_deref(), Some("VALIDATION_ERROR"));
                assert_eq!(error_id.as_deref(), Some("e-17"));
                assert!(body.unwrap().contains("e-17"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn api_error_falls_back_to_short_keys_and_plain_bodies() {
        let short = api_error("u", 409, r#"{"code":"CONFLICT","id":42}"#.to_string());
        assert!(matches!(
            short,
            TransportError::Api { error_code: Some(ref c), error_id: Some(ref i), .. }
                if c == "CONFLICT" && i == "42"
        ));

        let plain = api_error("u", 502, "Bad Gateway".to_string());
        assert!(matches!(
            plain,
            TransportError::Api { error_code: None, body: Some(ref b), .. } if b == "Bad Gateway"
        ));
    }

    #[test]
    fn static_token_debug_hides_value() {
        assert_eq!(format!("{:?}", StaticToken::new("secret")), "StaticToken(***)");
    }
}
