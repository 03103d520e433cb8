//! HTTP transport used by the step engine.

use crate::error::TransportError;
use crate::model::HttpMethod;
use crate::request::RestRequest;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use std::time::Duration;
use tracing::debug;

/// Response as received from the wire, before it is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Sends a built request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &RestRequest,
    ) -> Result<RawResponse, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Per-request timeout. Without one, requests wait as long as the
    /// client allows.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn convert_method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Options => Method::OPTIONS,
        }
    }

    fn header_map(request: &RestRequest) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    TransportError::with_source(
                        format!("invalid header name '{name}'"),
                        e,
                    )
                })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                TransportError::with_source(
                    format!("invalid value for header '{name}'"),
                    e,
                )
            })?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &RestRequest,
    ) -> Result<RawResponse, TransportError> {
        let mut builder = self
            .client
            .request(Self::convert_method(request.method), &request.base_url)
            .headers(Self::header_map(request)?);

        if !request.query_params.is_empty() {
            builder = builder.query(&request.query_params);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        debug!("Sending request to {}", request.base_url);
        let response = builder.send().await?;
        let status = response.status().as_u16();
        debug!("Received response with status: {}", status);

        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().await?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
