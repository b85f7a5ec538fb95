//! Gmail API integration
//!
//! This module provides:
//! - OAuth2 session management and the Google token endpoint
//! - The `MailApi` seam and its HTTP implementation
//! - MIME tree decoding into normalized message content

mod auth;
mod client;
mod html;
mod mime;
mod normalize;

pub use auth::{
    AuthSession, AuthState, GoogleOAuth, RefreshError, TokenEndpoint, authorization_url,
    classify_token_error,
};
pub use client::GmailClient;
pub use html::{decode_html_entities, strip_html};
pub use mime::{MAX_PART_DEPTH, Part, decode_base64_body};
pub use normalize::{MessageParser, ParsedMessage, TRUNCATION_MARKER, truncate_body};

use std::time::Duration;
use thiserror::Error;

use crate::models::{AccessToken, MessageId};

/// A message exactly as the provider returned it
pub type RawMessage = api::GmailMessage;

/// Transport-level failure from a single API call
///
/// The fetcher classifies these into retryable and fatal failures before
/// deciding what to do next.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx HTTP status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The per-request timeout elapsed
    #[error("request timed out")]
    Timeout,

    /// DNS, connect, TLS or I/O failure
    #[error("connection failed: {0}")]
    Transport(String),

    /// 2xx response whose body could not be decoded
    #[error("invalid response body: {0}")]
    Decode(String),
}

/// The remote mail operations the fetcher needs
///
/// Implemented by [`GmailClient`] over HTTP; tests substitute fakes.
pub trait MailApi {
    /// List one page of message ids matching `query`
    fn list_messages(
        &self,
        token: &AccessToken,
        query: &str,
        page_token: Option<&str>,
        page_size: usize,
        timeout: Option<Duration>,
    ) -> Result<api::ListMessagesResponse, ApiError>;

    /// Fetch one message with its full payload tree
    fn get_message(
        &self,
        token: &AccessToken,
        id: &MessageId,
        timeout: Option<Duration>,
    ) -> Result<RawMessage, ApiError>;
}

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from listing messages
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<MessageRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        #[serde(default)]
        pub thread_id: String,
    }

    /// Full message from Gmail API
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        #[serde(default)]
        pub thread_id: String,
        pub label_ids: Option<Vec<String>>,
        #[serde(default)]
        pub snippet: String,
        pub internal_date: Option<String>,
        pub payload: Option<MessagePart>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Part body; `data` is base64url, absent for attachments and containers
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageBody {
        pub size: Option<u64>,
        pub data: Option<String>,
        pub attachment_id: Option<String>,
    }

    /// A node of the MIME tree; the top-level payload is one as well
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    impl MessagePart {
        /// Header value by case-insensitive name
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .as_ref()?
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.as_str())
        }
    }
}
