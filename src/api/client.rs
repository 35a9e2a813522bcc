// src/api/client.rs
//! HTTP transport for the Notion API.
//!
//! A thin wrapper around reqwest. It attaches the fixed headers, turns an
//! `ApiRequest` into a URL, and reports status and body verbatim. It never
//! interprets a status code or retries.

use super::{ApiRequest, HttpMethod, RawResponse, Transport, TransportError};
use crate::constants::NOTION_API_BASE_URL;
use crate::error::AppError;
use crate::types::ValidationError;
use reqwest::{header, Client};
use std::time::Duration;
use url::Url;

/// reqwest-backed `Transport` speaking to a Notion API base URL.
#[derive(Clone)]
pub struct NotionHttpClient {
    client: Client,
    base_url: Url,
}

impl NotionHttpClient {
    /// Creates a client for the public Notion API.
    pub fn new(api_version: &str) -> Result<Self, AppError> {
        Self::with_base_url(NOTION_API_BASE_URL, api_version)
    }

    /// Creates a client for any Notion-compatible base URL.
    pub fn with_base_url(base_url: &str, api_version: &str) -> Result<Self, AppError> {
        // Url::join drops the last segment unless the base ends in '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).map_err(|e| ValidationError::InvalidFormat {
            field: "base_url",
            value: format!("{} ({})", base_url, e),
            expected: "an absolute http(s) URL",
        })?;

        let client = Client::builder()
            .default_headers(Self::create_headers(api_version)?)
            .build()
            .map_err(|e| ValidationError::Unparseable(format!("HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// Creates the default headers for Notion API requests.
    fn create_headers(api_version: &str) -> Result<header::HeaderMap, AppError> {
        let mut headers = header::HeaderMap::new();

        headers.insert(
            "Notion-Version",
            header::HeaderValue::from_str(api_version).map_err(|_| {
                ValidationError::InvalidFormat {
                    field: "api_version",
                    value: api_version.to_string(),
                    expected: "a header-safe version string",
                }
            })?,
        );

        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        Ok(headers)
    }

    /// Resolves the request path and query against the base URL.
    pub fn url_for(&self, request: &ApiRequest) -> Result<Url, TransportError> {
        let mut url = self
            .base_url
            .join(&request.path)
            .map_err(|e| TransportError::Other(format!("invalid path {}: {}", request.path, e)))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

/// Interprets a `Retry-After` header given in seconds.
fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[async_trait::async_trait]
impl Transport for NotionHttpClient {
    async fn send(
        &self,
        request: &ApiRequest,
        authorization: &str,
    ) -> Result<RawResponse, TransportError> {
        let url = self.url_for(request)?;
        log::debug!("{} {}", request.method, url);

        let builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };
        let builder = builder.header(header::AUTHORIZATION, authorization);
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder.send().await.map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(classify_reqwest_error)?;

        Ok(RawResponse {
            status,
            body,
            retry_after,
            request_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_path_and_query() {
        let client =
            NotionHttpClient::with_base_url("https://api.notion.com/v1", "2022-06-28").unwrap();
        let request = ApiRequest::get("blocks/abc/children")
            .with_query("page_size", "100")
            .with_query("start_cursor", "c 1");

        let url = client.url_for(&request).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.notion.com/v1/blocks/abc/children?page_size=100&start_cursor=c+1"
        );
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = header::HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(header::RETRY_AFTER, header::HeaderValue::from_static("2"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(2)));

        headers.insert(header::RETRY_AFTER, header::HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(header::RETRY_AFTER, header::HeaderValue::from_static("-1"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_retry_after_too_large_to_represent_is_ignored() {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::RETRY_AFTER,
            header::HeaderValue::from_static("99999999999999999999"),
        );
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(header::RETRY_AFTER, header::HeaderValue::from_static("inf"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_rejects_unparseable_base_url() {
        assert!(NotionHttpClient::with_base_url("not a url", "2022-06-28").is_err());
    }
}
