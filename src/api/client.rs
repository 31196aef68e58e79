// src/api/client.rs
//! HTTP client for the school's timetable site.
//!
//! This module provides a thin wrapper around reqwest that turns an
//! identifier into a page URL (through the index pages) and fetches it with
//! timeout, retry and status classification. It knows nothing about the
//! layout of a timetable page.

use super::directory::Directory;
use super::PageSource;
use crate::config::TimetableConfig;
use crate::constants::{ERROR_BODY_PREVIEW_LENGTH, USER_AGENT};
use crate::error::FetchError;
use crate::error_recovery::{retry_with_backoff, RetryPolicy};
use crate::types::{Identifier, ValidationError};
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tokio::sync::OnceCell;
use url::Url;

/// Fetches timetable pages over HTTP.
pub struct TimetableHttpClient {
    client: Client,
    base_url: Url,
    class_index: String,
    teacher_index: String,
    retry: RetryPolicy,
    aliases: Vec<Vec<String>>,
    /// Swapped for an empty cell on refresh; loads already under way finish
    /// into the cell they started on.
    directory: Mutex<Arc<OnceCell<Arc<Directory>>>>,
}

impl TimetableHttpClient {
    /// Creates a client for the site described by `config`.
    pub fn new(config: &TimetableConfig) -> Result<Self, ValidationError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ValidationError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: directory_url(&config.base_url),
            class_index: config.class_index_page.clone(),
            teacher_index: config.teacher_index_page.clone(),
            retry: config.retry,
            aliases: config.aliases.clone(),
            directory: Mutex::new(Arc::new(OnceCell::new())),
        })
    }

    /// Makes a GET request and returns the body text.
    ///
    /// Transient failures are retried per the retry policy; the error
    /// returned is the last attempt's.
    pub async fn get(&self, url: &Url) -> Result<String, FetchError> {
        retry_with_backoff(|| self.get_once(url), &self.retry).await
    }

    async fn get_once(&self, url: &Url) -> Result<String, FetchError> {
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_transport(url.as_str(), &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_transport(url.as_str(), &e))?;

        log::debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        classify_response(url, status, body)
    }

    fn page_url(&self, page: &str) -> Result<Url, FetchError> {
        self.base_url.join(page).map_err(|e| FetchError::NotFound {
            identifier: page.to_string(),
            reason: format!("cannot form a URL under {}: {}", self.base_url, e),
        })
    }

    /// Loads both index pages once; a failed load is retried on the next call.
    async fn directory(&self) -> Result<Arc<Directory>, FetchError> {
        let cell = Arc::clone(&self.directory.lock());
        cell.get_or_try_init(|| async {
            let class_url = self.page_url(&self.class_index)?;
            let teacher_url = self.page_url(&self.teacher_index)?;
            let (class_page, teacher_page) =
                tokio::try_join!(self.get(&class_url), self.get(&teacher_url))?;
            Ok(Arc::new(Directory::from_pages(&class_page, &teacher_page)))
        })
        .await
        .cloned()
    }
}

#[async_trait::async_trait]
impl PageSource for TimetableHttpClient {
    async fn fetch(&self, identifier: &Identifier) -> Result<String, FetchError> {
        let directory = self.directory().await?;
        let entry = directory.resolve(identifier, &self.aliases)?;
        let url = self.page_url(&entry.href)?;
        log::info!("Fetching {} from {}", identifier, url);
        self.get(&url).await.map_err(|e| match e {
            FetchError::NotFound { reason, .. } => FetchError::NotFound {
                identifier: identifier.to_string(),
                reason,
            },
            other => other,
        })
    }

    fn refresh_index(&self) {
        log::debug!("Dropping the page directory; it reloads on the next fetch");
        *self.directory.lock() = Arc::new(OnceCell::new());
    }
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
fn directory_url(base: &Url) -> Url {
    let mut url = base.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Maps an HTTP status to success or a classified fetch error.
fn classify_response(url: &Url, status: StatusCode, body: String) -> Result<String, FetchError> {
    if status.is_success() {
        return Ok(body);
    }

    let reason = format!("HTTP {}: {}", status, preview(&body));
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(FetchError::Transient {
            reason: format!("{} returned {}", url, reason),
        })
    } else if status == StatusCode::REQUEST_TIMEOUT {
        Err(FetchError::Timeout {
            url: url.to_string(),
        })
    } else {
        Err(FetchError::NotFound {
            identifier: url.to_string(),
            reason,
        })
    }
}

fn preview(body: &str) -> String {
    let text = body.trim();
    if text.chars().count() > ERROR_BODY_PREVIEW_LENGTH {
        let cut: String = text.chars().take(ERROR_BODY_PREVIEW_LENGTH).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("http://example.test/course/C101101.HTML").unwrap()
    }

    #[test]
    fn success_returns_body() {
        let body = classify_response(&url(), StatusCode::OK, "<html/>".into()).unwrap();
        assert_eq!(body, "<html/>");
    }

    #[test]
    fn missing_page_is_definitive() {
        let err = classify_response(&url(), StatusCode::NOT_FOUND, "gone".into()).unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_are_retryable() {
        let err =
            classify_response(&url(), StatusCode::BAD_GATEWAY, String::new()).unwrap_err();
        assert!(matches!(err, FetchError::Transient { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn long_bodies_are_truncated_in_errors() {
        let body = "x".repeat(ERROR_BODY_PREVIEW_LENGTH * 2);
        let err = classify_response(&url(), StatusCode::FORBIDDEN, body).unwrap_err();
        assert!(err.to_string().len() < ERROR_BODY_PREVIEW_LENGTH + 150);
    }

    #[test]
    fn refresh_drops_the_loaded_directory() {
        let client = TimetableHttpClient::new(&TimetableConfig::default()).unwrap();
        let loaded = Arc::clone(&client.directory.lock());
        loaded.set(Arc::new(Directory::default())).unwrap();
        assert!(client.directory.lock().initialized());

        client.refresh_index();

        assert!(!client.directory.lock().initialized());
        // Holders of the old cell keep their directory.
        assert!(loaded.initialized());
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let base = Url::parse("http://w3.example.test/deanofstudies/course").unwrap();
        let joined = directory_url(&base).join("_ClassIndex.html").unwrap();
        assert_eq!(
            joined.as_str(),
            "http://w3.example.test/deanofstudies/course/_ClassIndex.html"
        );
    }
}
