//! Mail digest crate - authenticated Gmail retrieval and content normalization
//!
//! This crate provides:
//! - OAuth2 credential lifecycle (load, refresh, consent, persist)
//! - Sender/time-window search query construction
//! - Paginated retrieval with retry, backoff and 401 recovery
//! - MIME decoding into normalized message content, with attachment
//!   metadata and validated external image references
//! - A digest runner that ties it all together
//!
//! It does not interpret, summarize or store the messages it returns.

pub mod config;
pub mod digest;
pub mod error;
pub mod fetch;
pub mod gmail;
pub mod images;
pub mod models;
pub mod query;
pub mod storage;

pub use config::{ClientSecrets, DigestSettings};
pub use digest::{DigestMetadata, DigestResult, MailDigest, assemble};
pub use error::{DigestError, ErrorKind, Result};
pub use fetch::{Deadline, FetchOutcome, MessageFetcher, RetryPolicy};
pub use gmail::{
    ApiError, AuthSession, AuthState, GmailClient, GoogleOAuth, MailApi, MessageParser,
    ParsedMessage, RawMessage, RefreshError, TokenEndpoint,
};
pub use images::ImageReferenceExtractor;
pub use models::{
    AccessToken, AttachmentMeta, Credential, ImageReference, MessageContent, MessageId,
    SearchCriteria, ThreadId,
};
pub use query::build_query;
pub use storage::{CredentialStore, FileCredentialStore, InMemoryCredentialStore};
