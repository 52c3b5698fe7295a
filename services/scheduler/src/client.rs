//! HTTP client for the master's scheduler endpoint.
//!
//! Every call is a POST to `/api/v1/scheduler`. The master pins a framework's
//! session with the `Mesos-Stream-Id` response header; the client remembers
//! the latest one and attaches it to every following request.

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use mesos_proto::{Call, Codec, JsonCodec};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use tracing::{debug, info};

use crate::error::TransportError;

/// Path of the scheduler API on the master.
pub const SCHEDULER_PATH: &str = "/api/v1/scheduler";

/// Header carrying the session token.
pub const STREAM_ID_HEADER: &str = "Mesos-Stream-Id";

/// Most bytes of an error body kept for diagnostics.
const MAX_ERROR_BODY: usize = 4096;

/// Response body as a stream of chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Response to a call. The body is left unread so a subscription can be
/// consumed as a stream.
pub struct Response {
    pub status: u16,
    pub stream_id: Option<String>,
    pub body: BodyStream,
}

impl Response {
    /// Collects the body as text, truncated for logging.
    pub async fn text(mut self) -> String {
        let mut buf = Vec::new();
        while let Some(Ok(chunk)) = self.body.next().await {
            buf.extend_from_slice(&chunk);
            if buf.len() >= MAX_ERROR_BODY {
                buf.truncate(MAX_ERROR_BODY);
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("stream_id", &self.stream_id)
            .finish_non_exhaustive()
    }
}

/// Issues calls to the master.
///
/// Implementations own the session token: once a response carried one, it is
/// attached to every later call until a response carries a different one.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, call: &Call) -> Result<Response, TransportError>;

    /// Current session token, if one has been received.
    fn stream_id(&self) -> Option<String>;
}

/// Scheduler API client over HTTP.
pub struct SchedulerClient {
    client: reqwest::Client,
    url: Url,
    codec: Arc<dyn Codec>,
    stream_id: RwLock<Option<String>>,
}

impl SchedulerClient {
    /// Creates a JSON client for a master given as `host:port` or a full URL.
    pub fn new(endpoint: &str) -> Result<Self, TransportError> {
        Self::with_codec(endpoint, Arc::new(JsonCodec))
    }

    pub fn with_codec(endpoint: &str, codec: Arc<dyn Codec>) -> Result<Self, TransportError> {
        // No overall timeout: the subscription response never completes.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(30))
            .user_agent(concat!("mesos-scheduler/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: scheduler_url(endpoint)?,
            codec,
            stream_id: RwLock::new(None),
        })
    }

    /// Full URL calls are posted to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn codec(&self) -> Arc<dyn Codec> {
        Arc::clone(&self.codec)
    }

    fn adopt_stream_id(&self, stream_id: &str) {
        let mut current = self
            .stream_id
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if current.as_deref() == Some(stream_id) {
            return;
        }
        match current.as_deref() {
            None => info!(stream_id = %stream_id, "Received session stream id"),
            Some(previous) => info!(
                previous = %previous,
                stream_id = %stream_id,
                "Master replaced session stream id"
            ),
        }
        *current = Some(stream_id.to_string());
    }
}

#[async_trait]
impl Transport for SchedulerClient {
    async fn send(&self, call: &Call) -> Result<Response, TransportError> {
        let payload = self.codec.encode_call(call)?;
        let content_type = self.codec.content_type();

        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, content_type)
            .header(ACCEPT, content_type)
            .body(payload);
        if let Some(stream_id) = self.stream_id() {
            request = request.header(STREAM_ID_HEADER, stream_id);
        }

        debug!(call = %call.kind, url = %self.url, "Sending call");
        let response = request.send().await?;

        let status = response.status().as_u16();
        let stream_id = response
            .headers()
            .get(STREAM_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        if let Some(stream_id) = &stream_id {
            self.adopt_stream_id(stream_id);
        }
        debug!(call = %call.kind, status, "Call answered");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::Body));

        Ok(Response {
            status,
            stream_id,
            body: Box::pin(body),
        })
    }

    fn stream_id(&self) -> Option<String> {
        self.stream_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Builds the scheduler URL from `host:port` or a base URL.
fn scheduler_url(endpoint: &str) -> Result<Url, TransportError> {
    let invalid = |message: String| TransportError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        message,
    };

    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(invalid("endpoint is empty".to_string()));
    }
    let base = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let mut url = Url::parse(&base).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    let path = format!("{}{}", url.path().trim_end_matches('/'), SCHEDULER_PATH);
    url.set_path(&path);
    url.set_query(None);
    Ok(url)
}

// =============================================================================
// Test Support
// =============================================================================


// =============================================================================
// Tests
// =============================================================================
