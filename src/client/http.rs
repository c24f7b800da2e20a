//! HTTP transport for the query service

use super::error::{ApiError, ApiResult};
use super::{EventPage, SpanPage, Transport};
use crate::config::ClientConfig;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use std::time::Duration;
use uuid::Uuid;

/// reqwest-backed [`Transport`]
pub struct HttpTransport {
    client: Client,
    host: String,
    auth_key: String,
}

impl HttpTransport {
    /// Create a transport for `config.host`
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            auth_key: config.auth_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("auth-key", &self.auth_key)
            .header("x-request-id", Uuid::new_v4().to_string())
    }

    /// Turn an unsuccessful status into a classified error
    async fn check(response: Response, path: &str) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status.as_u16(), path, text))
    }

    /// Read a JSON body; a body that does not parse is terminal, not retryable
    async fn parse<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Malformed(e.to_string()))
    }
}

fn header(response: &Response, name: &'static str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn spans_path(cursor: &str, limit: Option<usize>) -> String {
    match limit {
        Some(n) => format!("/query/{}/spans?limit={}", cursor, n),
        None => format!("/query/{}/spans", cursor),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, document: &Json) -> ApiResult<String> {
        let path = "/query";
        let response = self.request(Method::POST, path).json(document).send().await?;
        let response = Self::check(response, path).await?;
        header(&response, "location").ok_or(ApiError::MissingHeader("location"))
    }

    async fn spans_page(&self, cursor: &str, limit: Option<usize>) -> ApiResult<SpanPage> {
        let path = spans_path(cursor, limit);
        let response = self.request(Method::GET, &path).send().await?;
        let response = Self::check(response, &path).await?;
        Self::parse(response).await
    }

    async fn events_page(&self, token: &str) -> ApiResult<EventPage> {
        let path = format!("/query/{}/events", token);
        let response = self.request(Method::GET, &path).send().await?;
        let response = Self::check(response, &path).await?;
        let next = header(&response, "cursor");
        let mut page: EventPage = Self::parse(response).await?;
        page.cursor = next;
        Ok(page)
    }
}
