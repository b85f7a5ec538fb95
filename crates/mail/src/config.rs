//! Settings and OAuth client credentials
//!
//! Process-level settings come from environment-style key/value lookups:
//! - `GMAIL_CREDENTIALS_PATH` / `GMAIL_TOKEN_PATH` (required, `~` expanded)
//! - `IMAGE_PROCESSING_ENABLED`, `IMAGE_ALLOWED_DOMAINS`, `IMAGE_MAX_PER_EMAIL`
//! - `GMAIL_BODY_MAX_BYTES`, `GMAIL_RETRY_ATTEMPTS`, `GMAIL_RETRY_BASE_DELAY_MS`
//! - `GMAIL_MAX_MESSAGES`, `GMAIL_INTERACTIVE_AUTH`
//!
//! OAuth client id/secret are read from the Google Cloud Console JSON file the
//! credentials path points at.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DigestError, Result};

pub const DEFAULT_BODY_MAX_BYTES: usize = 10 * 1024;
pub const DEFAULT_MAX_IMAGES: usize = 5;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// OAuth client credentials for Gmail API access
#[derive(Clone)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// Google Cloud Console credential file format
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<InstalledCredentials>,
    web: Option<InstalledCredentials>,
}

#[derive(Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
}

impl ClientSecrets {
    /// Load client secrets from a Google Cloud Console JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DigestError::Configuration(format!(
                "credentials file not found: {}",
                path.display()
            )));
        }
        let creds: GoogleCredentialFile = config::load_json_file(path)?;
        Self::from_credential_file(creds)
    }

    /// Parse client secrets from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: GoogleCredentialFile = serde_json::from_str(json).map_err(|e| {
            DigestError::Configuration(format!("failed to parse credentials JSON: {}", e))
        })?;
        Self::from_credential_file(creds)
    }

    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        // Desktop apps get "installed", web clients get "web"
        let installed = creds.installed.or(creds.web).ok_or_else(|| {
            DigestError::Configuration(
                "credentials file missing 'installed' or 'web' section".to_string(),
            )
        })?;

        if installed.client_id.is_empty() || installed.client_secret.is_empty() {
            return Err(DigestError::Configuration(
                "credentials file has an empty client_id or client_secret".to_string(),
            ));
        }

        Ok(Self {
            client_id: installed.client_id,
            client_secret: installed.client_secret,
        })
    }
}

/// Tunables and file locations for a digest run
#[derive(Debug, Clone)]
pub struct DigestSettings {
    /// OAuth client secrets JSON
    pub credentials_path: PathBuf,
    /// Where the user's OAuth token is cached
    pub token_path: PathBuf,
    /// Produce image references from HTML bodies
    pub image_processing_enabled: bool,
    /// Hosts images may come from; `None` allows any HTTPS host
    pub allowed_image_domains: Option<Vec<String>>,
    pub max_images_per_message: usize,
    pub body_max_bytes: usize,
    /// Total attempts per network call, including the first
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    /// Stop listing after this many message ids
    pub max_messages: Option<usize>,
    /// Allow the browser consent flow when no token is stored
    pub interactive_auth: bool,
}

impl DigestSettings {
    /// Settings with defaults for everything but the two paths
    pub fn new(credentials_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            token_path: token_path.into(),
            image_processing_enabled: false,
            allowed_image_domains: None,
            max_images_per_message: DEFAULT_MAX_IMAGES,
            body_max_bytes: DEFAULT_BODY_MAX_BYTES,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_messages: None,
            interactive_auth: true,
        }
    }

    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required_path = |key: &str| -> Result<PathBuf> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(config::expand_home(&value)),
                _ => Err(DigestError::Configuration(format!(
                    "{} is not set; point it at the {} file",
                    key,
                    if key == "GMAIL_CREDENTIALS_PATH" { "OAuth client credentials" } else { "token" }
                ))),
            }
        };

        let mut settings = Self::new(
            required_path("GMAIL_CREDENTIALS_PATH")?,
            required_path("GMAIL_TOKEN_PATH")?,
        );

        if let Some(value) = lookup("IMAGE_PROCESSING_ENABLED") {
            settings.image_processing_enabled = config::parse_bool(&value)?;
        }
        if let Some(value) = lookup("IMAGE_ALLOWED_DOMAINS") {
            settings.allowed_image_domains = config::parse_list(&value);
        }
        if let Some(value) = lookup("IMAGE_MAX_PER_EMAIL") {
            settings.max_images_per_message = config::parse_number("IMAGE_MAX_PER_EMAIL", &value)?;
        }
        if let Some(value) = lookup("GMAIL_BODY_MAX_BYTES") {
            settings.body_max_bytes = config::parse_number("GMAIL_BODY_MAX_BYTES", &value)?;
        }
        if let Some(value) = lookup("GMAIL_RETRY_ATTEMPTS") {
            settings.retry_attempts = config::parse_number("GMAIL_RETRY_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("GMAIL_RETRY_BASE_DELAY_MS") {
            let millis: u64 = config::parse_number("GMAIL_RETRY_BASE_DELAY_MS", &value)?;
            settings.retry_base_delay = Duration::from_millis(millis);
        }
        if let Some(value) = lookup("GMAIL_MAX_MESSAGES")
            && !value.trim().is_empty()
        {
            settings.max_messages = Some(config::parse_number("GMAIL_MAX_MESSAGES", &value)?);
        }
        if let Some(value) = lookup("GMAIL_INTERACTIVE_AUTH") {
            settings.interactive_auth = config::parse_bool(&value)?;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.credentials_path.as_os_str().is_empty() || self.token_path.as_os_str().is_empty() {
            return Err(DigestError::Configuration(
                "credentials and token paths must not be empty".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(DigestError::Configuration(
                "GMAIL_RETRY_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.body_max_bytes == 0 {
            return Err(DigestError::Configuration(
                "GMAIL_BODY_MAX_BYTES must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Read the OAuth client secrets this configuration points at
    pub fn client_secrets(&self) -> Result<ClientSecrets> {
        ClientSecrets::from_file(&self.credentials_path)
    }
}
