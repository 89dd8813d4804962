//! HTTP client for the Copilot conversational API.
//!
//! The client exposes the three logical operations of the API: create a
//! conversation, send a message and wait for the full reply, or send a
//! message and stream the reply as server-sent events.

use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use url::Url;

use crate::auth::{SCOPES, TokenSupplier};
use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::{SseEvent, process_sse};
use crate::timezone;
use crate::types::{ChatRequest, Conversation};

const DEFAULT_API_URL: &str = "https://graph.microsoft.com/beta/copilot/";
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A boxed stream of decoded SSE events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SseEvent>> + Send>>;

/// Returns the process-wide HTTP client.
///
/// The underlying connection pool is constructed at most once per process;
/// concurrent first callers race to build it but only one instance is ever
/// installed. The client carries only a connect timeout: total-duration
/// timeouts are set per request, because a client-level timeout covers the
/// whole response body and would cut off long-lived SSE streams.
pub(crate) fn shared_http() -> Result<ReqwestClient> {
    static HTTP: OnceLock<ReqwestClient> = OnceLock::new();
    if let Some(client) = HTTP.get() {
        return Ok(client.clone());
    }
    let client = ReqwestClient::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| {
            Error::http_client(format!("Failed to build HTTP client: {e}"), Some(Box::new(e)))
        })?;
    Ok(HTTP.get_or_init(|| client).clone())
}

/// The three logical operations of the conversational API.
///
/// The orchestrator runs against this seam so it can be exercised with an
/// in-process fake as easily as with the real [`Copilot`] client.
#[async_trait::async_trait]
pub trait ConversationApi: Send + Sync {
    /// Create a new server-side conversation.
    async fn create_conversation(&self) -> Result<Conversation>;

    /// Send a message and wait for the full updated conversation.
    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<Conversation>;

    /// Send a message and receive the reply as a live stream of SSE events.
    async fn send_message_streaming(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<EventStream>;
}

/// Client for the Copilot conversational API.
#[derive(Clone)]
pub struct Copilot {
    http: ReqwestClient,
    tokens: Arc<dyn TokenSupplier>,
    base_url: String,
    timeout: Duration,
}

impl std::fmt::Debug for Copilot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Copilot")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Copilot {
    /// Create a new client with default settings.
    pub fn new(tokens: Arc<dyn TokenSupplier>) -> Result<Self> {
        Self::with_options(tokens, None, None)
    }

    /// Create a new client with a custom base URL and timeout.
    pub fn with_options(
        tokens: Arc<dyn TokenSupplier>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let base_url = match base_url {
            Some(base_url) => {
                Url::parse(&base_url)?;
                if base_url.ends_with('/') {
                    base_url
                } else {
                    format!("{base_url}/")
                }
            }
            None => DEFAULT_API_URL.to_string(),
        };
        Ok(Self {
            http: shared_http()?,
            tokens,
            base_url,
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
        })
    }

    /// Create and return default headers for API requests.
    async fn default_headers(&self) -> Result<HeaderMap> {
        let token = self.tokens.bearer_token().await?;
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::authentication("Bearer token contains invalid characters"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Map a reqwest transport failure to the error taxonomy.
    fn map_transport_error(&self, e: reqwest::Error) -> Error {
        CLIENT_REQUEST_ERRORS.click();
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    /// Process API response errors and convert to our Error type.
    async fn process_error_response(response: Response) -> Error {
        CLIENT_REQUEST_ERRORS.click();
        let status_code = response.status().as_u16();

        let request_id = response
            .headers()
            .get("request-id")
            .and_then(|val| val.to_str().ok())
            .map(String::from);

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(serde::Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(serde::Deserialize)]
        struct ErrorDetail {
            message: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let error_message = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error)
            .and_then(|e| e.message)
            .unwrap_or_else(|| error_body.clone());

        match status_code {
            400 => Error::bad_request(error_message),
            401 => Error::authentication(format!(
                "Token is invalid or expired: {error_message}"
            )),
            403 => Error::permission(format!(
                "Insufficient permissions. Required scopes: {}",
                scope_names().join(", ")
            )),
            404 => Error::not_found(error_message),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message, request_id),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_message, request_id),
        }
    }

    /// Build the outbound payload for a message, attaching the local
    /// time-zone hint.
    fn chat_request(text: &str) -> ChatRequest {
        ChatRequest::new(text, timezone::local_iana())
    }
}

/// The short scope names surfaced in permission errors.
fn scope_names() -> Vec<&'static str> {
    SCOPES
        .iter()
        .map(|s| s.rsplit('/').next().unwrap_or(s))
        .collect()
}

#[async_trait::async_trait]
impl ConversationApi for Copilot {
    async fn create_conversation(&self) -> Result<Conversation> {
        CLIENT_REQUESTS.click();
        let url = format!("{}conversations", self.base_url);
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .headers(self.default_headers().await?)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        response.json::<Conversation>().await.map_err(|e| {
            Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
        })
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<Conversation> {
        CLIENT_REQUESTS.click();
        let url = format!("{}conversations/{conversation_id}/chat", self.base_url);
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .headers(self.default_headers().await?)
            .json(&Self::chat_request(text))
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        response.json::<Conversation>().await.map_err(|e| {
            Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
        })
    }

    async fn send_message_streaming(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<EventStream> {
        CLIENT_REQUESTS.click();
        let url = format!(
            "{}conversations/{conversation_id}/chatOverStream",
            self.base_url
        );

        let mut headers = self.default_headers().await?;
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );

        // No total-duration timeout here: the response body is an open-ended
        // event stream. The connect timeout on the shared client still
        // bounds connection establishment.
        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(&Self::chat_request(text))
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        // Feed the live byte stream through the SSE frame decoder.
        let stream = response.bytes_stream();
        Ok(Box::pin(process_sse(stream)))
    }
}
