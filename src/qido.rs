use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::domain::Attributes;
use crate::error::BrowserError;

pub trait QidoClient: Send + Sync {
    /// Runs one search. `path` is relative to the archive base URL.
    fn search(&self, path: &str) -> Result<Vec<Attributes>, BrowserError>;
}

#[derive(Clone)]
pub struct QidoHttpClient {
    client: Client,
    base_url: String,
}

impl QidoHttpClient {
    pub fn new(base_url: &str) -> Result<Self, BrowserError> {
        let client = build_http_client().map_err(|err| BrowserError::QidoHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
        })
    }

    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

impl QidoClient for QidoHttpClient {
    fn search(&self, path: &str) -> Result<Vec<Attributes>, BrowserError> {
        let url = self.url(path);
        debug!(%url, "qido.request");
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|err| BrowserError::QidoHttp(err.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(BrowserError::QidoStatus {
                status: status.as_u16(),
                message: status_text(status),
            });
        }
        let body = response
            .text()
            .map_err(|err| BrowserError::QidoHttp(err.to_string()))?;
        let records = parse_records(&body)?;
        debug!(count = records.len(), "qido.response");
        Ok(records)
    }
}

/// Search results from a response body; an empty body is an empty result.
pub fn parse_records(body: &str) -> Result<Vec<Attributes>, BrowserError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(body).map_err(|err| BrowserError::InvalidResponse(err.to_string()))
}

pub(crate) fn build_http_client() -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("arc-browser/", env!("CARGO_PKG_VERSION"))),
    );
    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(30))
        .build()
}

pub(crate) fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_str().to_string())
}

pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Joins an archive-relative path onto the base URL. Absolute URLs are kept.
pub fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{}/{}", base_url, path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_empty_result() {
        assert!(parse_records("").unwrap().is_empty());
        assert!(parse_records("  \n").unwrap().is_empty());
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(matches!(
            parse_records("{not json"),
            Err(BrowserError::InvalidResponse(_))
        ));
    }

    #[test]
    fn joins_paths() {
        let base = normalize_base_url("http://host:8080/dcm4chee-arc/");
        assert_eq!(
            join_url(&base, "rs/qido/AET/studies"),
            "http://host:8080/dcm4chee-arc/rs/qido/AET/studies"
        );
        assert_eq!(
            join_url(&base, "http://other/wado?x=1"),
            "http://other/wado?x=1"
        );
    }

    #[test]
    fn status_text_uses_reason_phrase() {
        assert_eq!(status_text(StatusCode::NOT_FOUND), "Not Found");
    }
}
