use std::{sync::OnceLock, time::Duration};

use context::RequestContext;
use reqwest::{
    Client, RequestBuilder, Response,
    header::{self, HeaderMap, HeaderValue},
};

use crate::error::{LlmError, status_error};

fn default_http_client_builder() -> reqwest::ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

    // No total timeout: streams stay open for as long as the model generates and the
    // caller owns the deadline. The short idle timeout makes pooled connections
    // pick up DNS changes.
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .default_headers(headers)
}

/// Common HTTP client to re-use as much as possible the same connections.
pub(super) fn http_client() -> Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();

    CLIENT
        .get_or_init(|| match default_http_client_builder().build() {
            Ok(client) => client,
            Err(e) => {
                log::error!("Failed to build the default HTTP client, using reqwest defaults: {e}");
                Client::new()
            }
        })
        .clone()
}

/// Sends a request, racing it against cancellation, and turns non-success
/// statuses into canonical errors.
pub(super) async fn send(provider: &str, request: RequestBuilder, context: &RequestContext) -> crate::Result<Response> {
    let response = tokio::select! {
        biased;
        _ = context.cancellation.cancelled() => return Err(LlmError::Cancelled),
        response = request.send() => response,
    };

    let response = response.map_err(|e| LlmError::unavailable(provider, format!("request failed: {e}")))?;

    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());

    Err(status_error(provider, status, body))
}

/// Reads a complete response body, racing it against cancellation.
pub(super) async fn read_body(provider: &str, response: Response, context: &RequestContext) -> crate::Result<String> {
    tokio::select! {
        biased;
        _ = context.cancellation.cancelled() => Err(LlmError::Cancelled),
        body = response.text() => body.map_err(|e| LlmError::unavailable(provider, format!("failed to read response: {e}"))),
    }
}
