//! Gmail API HTTP client
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic. Status codes are
//! returned as [`ApiError`]s rather than retried here; the fetcher owns the
//! retry policy.

use log::debug;
use serde::Deserialize;
use std::time::Duration;

use super::api::ListMessagesResponse;
use super::{ApiError, MailApi, RawMessage};
use crate::models::{AccessToken, MessageId};

/// Gmail API client for listing and fetching messages
pub struct GmailClient {
    agent: ureq::Agent,
    base_url: String,
}

impl Default for GmailClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Per-request timeout when the caller has no deadline
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Gmail rejects larger pages
    const MAX_PAGE_SIZE: usize = 500;

    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Self::DEFAULT_TIMEOUT))
            .build()
            .into();
        Self {
            agent,
            base_url: Self::BASE_URL.to_string(),
        }
    }

    /// Talk to a different API root (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn list_url(&self, query: &str, page_token: Option<&str>, page_size: usize) -> String {
        let mut url = format!(
            "{}/users/me/messages?maxResults={}&q={}",
            self.base_url,
            page_size.clamp(1, Self::MAX_PAGE_SIZE),
            urlencoding::encode(query)
        );
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }
        url
    }

    fn message_url(&self, id: &MessageId) -> String {
        format!(
            "{}/users/me/messages/{}?format=full",
            self.base_url,
            urlencoding::encode(id.as_str())
        )
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &AccessToken,
        timeout: Option<Duration>,
    ) -> Result<T, ApiError> {
        let mut response = self
            .agent
            .get(url)
            .header("Authorization", &format!("Bearer {}", token.secret()))
            .config()
            .timeout_global(Some(timeout.unwrap_or(Self::DEFAULT_TIMEOUT)))
            .build()
            .call()?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            let message = error_message(&body).unwrap_or_else(|| "no error details".to_string());
            debug!("Gmail API returned HTTP {}: {}", status, message);
            return Err(ApiError::Status { status, message });
        }

        response
            .body_mut()
            .read_json()
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl MailApi for GmailClient {
    fn list_messages(
        &self,
        token: &AccessToken,
        query: &str,
        page_token: Option<&str>,
        page_size: usize,
        timeout: Option<Duration>,
    ) -> Result<ListMessagesResponse, ApiError> {
        self.get_json(&self.list_url(query, page_token, page_size), token, timeout)
    }

    fn get_message(
        &self,
        token: &AccessToken,
        id: &MessageId,
        timeout: Option<Duration>,
    ) -> Result<RawMessage, ApiError> {
        self.get_json(&self.message_url(id), token, timeout)
    }
}

impl From<ureq::Error> for ApiError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Timeout(_) => ApiError::Timeout,
            ureq::Error::StatusCode(status) => ApiError::Status {
                status,
                message: String::new(),
            },
            other => ApiError::Transport(other.to_string()),
        }
    }
}

/// Google error envelope: `{"error": {"code": 429, "message": "..."}}`
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
    status: Option<String>,
}

fn error_message(body: &str) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    match (envelope.error.status, envelope.error.message) {
        (Some(status), Some(message)) => Some(format!("{} ({})", message, status)),
        (None, Some(message)) => Some(message),
        (Some(status), None) => Some(status),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_url_encodes_query_and_token() {
        let client = GmailClient::new().with_base_url("http://127.0.0.1:9/gmail/v1/");
        let url = client.list_url("(from:a@x.com) is:unread after:2026/10/12", Some("tok/en+1"), 100);

        assert_eq!(
            url,
            "http://127.0.0.1:9/gmail/v1/users/me/messages?maxResults=100\
             &q=%28from%3Aa%40x.com%29%20is%3Aunread%20after%3A2026%2F10%2F12\
             &pageToken=tok%2Fen%2B1"
        );
    }

    #[test]
    fn test_page_size_is_clamped() {
        let client = GmailClient::new();
        assert!(client.list_url("q", None, 10_000).contains("maxResults=500"));
        assert!(client.list_url("q", None, 0).contains("maxResults=1"));
    }

    #[test]
    fn test_message_url() {
        let client = GmailClient::new();
        assert_eq!(
            client.message_url(&MessageId::new("18c2f0a1b2")),
            "https://gmail.googleapis.com/gmail/v1/users/me/messages/18c2f0a1b2?format=full"
        );
    }

    #[test]
    fn test_error_message_from_google_envelope() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(error_message(body).as_deref(), Some("Quota exceeded (RESOURCE_EXHAUSTED)"));
        assert_eq!(error_message("upstream connect error"), None);
    }

    #[test]
    fn test_unreachable_host_is_transport_error() {
        // Port 9 (discard) is closed on test machines
        let client = GmailClient::new().with_base_url("http://127.0.0.1:9/gmail/v1");
        let err = client
            .get_message(
                &AccessToken::new("ya29.test"),
                &MessageId::new("m1"),
                Some(Duration::from_secs(2)),
            )
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(_) | ApiError::Timeout));
    }
}
