//! Gmail OAuth2 authentication
//!
//! [`AuthSession`] owns the credential lifecycle: it loads the stored token,
//! refreshes it when it is close to expiry, runs the interactive consent flow
//! when nothing is stored, and persists every new token it obtains.
//!
//! The Google side is behind [`TokenEndpoint`]. [`GoogleOAuth`] implements it
//! with the authorization code flow, using a local HTTP server to receive the
//! OAuth callback and synchronous HTTP (ureq) for the token exchange.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration as ChronoDuration, Utc};
use log::{debug, info, warn};
use rand::Rng;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::ClientSecrets;
use crate::error::{DigestError, Result};
use crate::fetch::Deadline;
use crate::models::{AccessToken, Credential};
use crate::storage::CredentialStore;

/// Tokens this close to expiry are refreshed before use
const EXPIRY_SKEW_SECS: i64 = 300;

/// Why a refresh attempt failed
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The grant was revoked or expired; only a fresh consent helps
    #[error("refresh token rejected: {0}")]
    Revoked(String),

    /// The OAuth client itself is not accepted
    #[error("OAuth client rejected: {0}")]
    InvalidClient(String),

    /// Network trouble or a server-side error; retrying later may work
    #[error("token endpoint unavailable: {0}")]
    Transient(String),
}

impl From<RefreshError> for DigestError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::Revoked(_) => DigestError::Authentication(err.to_string()),
            RefreshError::InvalidClient(_) => DigestError::Configuration(err.to_string()),
            RefreshError::Transient(_) => DigestError::Network(err.to_string()),
        }
    }
}

/// The token operations an [`AuthSession`] needs from the OAuth provider
pub trait TokenEndpoint: Send + Sync {
    /// Exchange a refresh token for a new credential within `timeout`. The
    /// returned credential may omit the refresh token and scopes; the session
    /// keeps the old ones.
    fn refresh(
        &self,
        refresh_token: &str,
        timeout: Option<Duration>,
    ) -> std::result::Result<Credential, RefreshError>;

    /// Run the interactive consent flow
    fn consent(&self) -> Result<Credential>;
}

impl<T: TokenEndpoint + ?Sized> TokenEndpoint for Arc<T> {
    fn refresh(
        &self,
        refresh_token: &str,
        timeout: Option<Duration>,
    ) -> std::result::Result<Credential, RefreshError> {
        (**self).refresh(refresh_token, timeout)
    }

    fn consent(&self) -> Result<Credential> {
        (**self).consent()
    }
}

/// Where an [`AuthSession`] is in the credential lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoCredential,
    Loaded,
    Valid,
    Expired,
    Refreshing,
    Consenting,
    /// The grant is unusable; only an explicit [`AuthSession::consent`] recovers
    Failed,
}

/// Credential lifecycle for one user
pub struct AuthSession {
    endpoint: Box<dyn TokenEndpoint>,
    store: Box<dyn CredentialStore>,
    credential: Option<Credential>,
    state: AuthState,
    interactive: bool,
}

impl AuthSession {
    pub fn new(
        endpoint: impl TokenEndpoint + 'static,
        store: impl CredentialStore + 'static,
    ) -> Self {
        Self {
            endpoint: Box::new(endpoint),
            store: Box::new(store),
            credential: None,
            state: AuthState::NoCredential,
            interactive: true,
        }
    }

    /// Allow or forbid the browser consent flow when no token is stored
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Get a usable access token, refreshing or consenting as needed.
    ///
    /// A refresh gets the time left before `deadline`; once it has passed the
    /// call fails with [`DigestError::Timeout`].
    pub fn ensure_valid(&mut self, deadline: &Deadline) -> Result<AccessToken> {
        if self.state == AuthState::Failed {
            return Err(DigestError::Authentication(
                "stored grant is no longer valid; interactive consent required".to_string(),
            ));
        }

        if self.credential.is_none() {
            self.credential = self.store.load()?;
            if self.credential.is_some() {
                debug!("Loaded stored credential");
                self.state = AuthState::Loaded;
            }
        }

        let Some(credential) = &self.credential else {
            if self.interactive {
                return self.consent();
            }
            return Err(DigestError::Authentication(
                "no stored credential and interactive consent is disabled".to_string(),
            ));
        };

        if !credential.is_expired_at(Utc::now(), ChronoDuration::seconds(EXPIRY_SKEW_SECS)) {
            self.state = AuthState::Valid;
            return Ok(credential.access_token());
        }

        debug!("Access token expired or about to expire");
        self.state = AuthState::Expired;
        self.refresh(deadline)
    }

    /// Mark the current access token unusable, e.g. after the API answered 401
    pub fn invalidate(&mut self) {
        if let Some(credential) = self.credential.as_mut() {
            credential.expires_at = None;
        }
        if self.state != AuthState::Failed {
            self.state = AuthState::Expired;
        }
    }

    /// Perform exactly one refresh, regardless of the token's expiry
    pub fn force_refresh(&mut self, deadline: &Deadline) -> Result<AccessToken> {
        if self.state == AuthState::Failed {
            return Err(DigestError::Authentication(
                "stored grant is no longer valid; interactive consent required".to_string(),
            ));
        }
        if self.credential.is_none() {
            self.credential = self.store.load()?;
        }
        if self.credential.is_none() {
            return Err(DigestError::Authentication("no credential to refresh".to_string()));
        }
        self.refresh(deadline)
    }

    /// Run the interactive consent flow and store the new credential
    pub fn consent(&mut self) -> Result<AccessToken> {
        self.state = AuthState::Consenting;
        info!("Starting interactive OAuth consent");
        match self.endpoint.consent() {
            Ok(credential) => Ok(self.become_valid(credential)),
            Err(e) => {
                warn!("Interactive consent failed: {}", e);
                self.state = AuthState::Failed;
                Err(e)
            }
        }
    }

    /// Forget the credential, in memory and in the store
    pub fn logout(&mut self) -> Result<()> {
        self.store.clear()?;
        self.credential = None;
        self.state = AuthState::NoCredential;
        info!("Logged out; stored credential removed");
        Ok(())
    }

    fn refresh(&mut self, deadline: &Deadline) -> Result<AccessToken> {
        let Some(previous) = self.credential.clone() else {
            return Err(DigestError::Authentication("no credential to refresh".to_string()));
        };
        let Some(refresh_token) = previous.refresh_token.clone() else {
            self.state = AuthState::Failed;
            return Err(DigestError::Authentication(
                "credential has no refresh token; interactive consent required".to_string(),
            ));
        };

        let timeout = deadline.remaining()?;
        self.state = AuthState::Refreshing;
        info!("Refreshing access token");

        match self.endpoint.refresh(&refresh_token, timeout) {
            Ok(mut fresh) => {
                if fresh.refresh_token.is_none() {
                    fresh.refresh_token = Some(refresh_token);
                }
                if fresh.scopes.is_empty() {
                    fresh.scopes = previous.scopes;
                }
                let token = self.become_valid(fresh);
                // The new token is kept for the next call
                if deadline.is_expired() {
                    warn!("Token refresh finished after the deadline");
                    return Err(DigestError::Timeout);
                }
                Ok(token)
            }
            Err(RefreshError::Transient(detail)) if deadline.is_expired() => {
                warn!("Token refresh cut short by the deadline: {}", detail);
                self.state = AuthState::Expired;
                Err(DigestError::Timeout)
            }
            Err(e @ RefreshError::Transient(_)) => {
                warn!("Token refresh failed, will retry on next use: {}", e);
                self.state = AuthState::Expired;
                Err(e.into())
            }
            Err(e) => {
                warn!("Token refresh rejected: {}", e);
                self.state = AuthState::Failed;
                Err(e.into())
            }
        }
    }

    fn become_valid(&mut self, credential: Credential) -> AccessToken {
        if let Err(e) = self.store.save(&credential) {
            warn!("Failed to persist credential, keeping it in memory: {}", e);
        }
        let token = credential.access_token();
        self.credential = Some(credential);
        self.state = AuthState::Valid;
        token
    }
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

impl TokenResponse {
    fn into_credential(self, now: chrono::DateTime<Utc>) -> Credential {
        Credential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_in.map(|secs| now + ChronoDuration::seconds(secs)),
            scopes: self
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    error_description: Option<String>,
}

/// Classify a failed token endpoint response
pub fn classify_token_error(status: u16, body: &str) -> RefreshError {
    if status == 429 || status >= 500 {
        return RefreshError::Transient(format!("HTTP {}", status));
    }

    let Ok(parsed) = serde_json::from_str::<TokenErrorBody>(body) else {
        return RefreshError::Revoked(format!("HTTP {}", status));
    };
    let detail = match parsed.error_description {
        Some(description) => format!("{}: {}", parsed.error, description),
        None => parsed.error.clone(),
    };

    match parsed.error.as_str() {
        "invalid_client" | "unauthorized_client" => RefreshError::InvalidClient(detail),
        _ => RefreshError::Revoked(detail),
    }
}

/// Google's OAuth2 endpoints over blocking HTTP
pub struct GoogleOAuth {
    secrets: ClientSecrets,
    agent: ureq::Agent,
    token_url: String,
}

impl GoogleOAuth {
    /// Gmail API OAuth2 endpoints
    const AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Read-only access is all a digest needs
    pub const GMAIL_READONLY_SCOPE: &'static str =
        "https://www.googleapis.com/auth/gmail.readonly";

    /// Port range to try for local OAuth callback server
    const PORT_RANGE_START: u16 = 8080;
    const PORT_RANGE_END: u16 = 8090;

    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(secrets: ClientSecrets) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Self::REQUEST_TIMEOUT))
            .build()
            .into();
        Self {
            secrets,
            agent,
            token_url: Self::TOKEN_URL.to_string(),
        }
    }

    /// Point token requests somewhere else (tests, proxies)
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    fn post_token_form(
        &self,
        form: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> std::result::Result<Credential, RefreshError> {
        let mut response = self
            .agent
            .post(&self.token_url)
            .config()
            .timeout_global(Some(timeout.unwrap_or(Self::REQUEST_TIMEOUT)))
            .build()
            .send_form(form.iter().copied())
            .map_err(|e| RefreshError::Transient(e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            return Err(classify_token_error(status, &body));
        }

        let token: TokenResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| RefreshError::Transient(format!("invalid token response: {}", e)))?;
        Ok(token.into_credential(Utc::now()))
    }

    /// Start a local TCP server on an available port
    fn start_local_server() -> Result<(TcpListener, u16)> {
        for port in Self::PORT_RANGE_START..=Self::PORT_RANGE_END {
            if let Ok(listener) = TcpListener::bind(format!("127.0.0.1:{}", port)) {
                return Ok((listener, port));
            }
        }
        Err(DigestError::Configuration(format!(
            "could not bind to any port in range {}-{} for the OAuth callback",
            Self::PORT_RANGE_START,
            Self::PORT_RANGE_END
        )))
    }

    /// Wait for OAuth callback and extract authorization code
    fn wait_for_callback(listener: TcpListener, expected_state: &str) -> Result<String> {
        for stream in listener.incoming() {
            let mut stream = stream.map_err(|e| {
                DigestError::Network(format!("failed to accept OAuth callback: {}", e))
            })?;

            let mut request_line = String::new();
            BufReader::new(&stream)
                .read_line(&mut request_line)
                .map_err(|e| DigestError::Network(format!("failed to read OAuth callback: {}", e)))?;

            // Browsers also ask for /favicon.ico and the like
            let Some(outcome) = parse_callback(&request_line, expected_state) else {
                stream
                    .write_all(b"HTTP/1.1 404 Not Found\r\nConnection: close\r\n\r\n")
                    .ok();
                continue;
            };

            let (status, body) = if outcome.is_ok() {
                ("200 OK", "Authentication successful! You can close this window.")
            } else {
                ("400 Bad Request", "Authentication failed. Please try again.")
            };
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body><h1>{}</h1></body></html>",
                status, body
            );
            stream.write_all(response.as_bytes()).ok();

            return outcome;
        }

        Err(DigestError::Authentication(
            "OAuth callback listener closed before a response arrived".to_string(),
        ))
    }
}

impl TokenEndpoint for GoogleOAuth {
    fn refresh(
        &self,
        refresh_token: &str,
        timeout: Option<Duration>,
    ) -> std::result::Result<Credential, RefreshError> {
        self.post_token_form(
            &[
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
            timeout,
        )
    }

    fn consent(&self) -> Result<Credential> {
        let (listener, port) = Self::start_local_server()?;
        let redirect_uri = format!("http://localhost:{}", port);
        let state = random_state();
        let auth_url = authorization_url(&self.secrets.client_id, &redirect_uri, &state);

        println!("\n=== Gmail Authentication Required ===");
        println!("Opening browser for authentication...");
        println!("If the browser doesn't open, visit: {}", auth_url);

        if let Err(e) = open::that(&auth_url) {
            warn!("Failed to open browser: {}. Please open the URL manually.", e);
        }

        println!("Waiting for authorization...");
        let code = Self::wait_for_callback(listener, &state)?;

        debug!("Exchanging authorization code for tokens");
        let credential = self.post_token_form(
            &[
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("code", code.as_str()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri.as_str()),
            ],
            None,
        )?;

        if credential.refresh_token.is_none() {
            warn!("Consent returned no refresh token; the session will need consent again on expiry");
        }
        println!("Authentication successful!\n");
        Ok(credential)
    }
}

/// Browser URL that starts the consent flow
pub fn authorization_url(client_id: &str, redirect_uri: &str, state: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
        GoogleOAuth::AUTH_URL,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(GoogleOAuth::GMAIL_READONLY_SCOPE),
        urlencoding::encode(state),
    )
}

/// Extract the authorization code from the callback request line
/// (`GET /?code=...&state=... HTTP/1.1`).
///
/// `None` means the request is not an OAuth callback at all.
fn parse_callback(request_line: &str, expected_state: &str) -> Option<Result<String>> {
    let path = request_line.split_whitespace().nth(1)?;
    let url = Url::parse(&format!("http://localhost{}", path)).ok()?;

    let (mut code, mut state, mut error) = (None, None, None);
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Some(Err(DigestError::Authentication(format!(
            "consent was not granted: {}",
            error
        ))));
    }
    let code = code?;
    if state.as_deref() != Some(expected_state) {
        return Some(Err(DigestError::Authentication(
            "OAuth callback state mismatch".to_string(),
        )));
    }
    Some(Ok(code))
}

/// Unguessable value tying the callback to this consent attempt
fn random_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::InMemoryCredentialStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeEndpoint {
        refreshes: Mutex<VecDeque<std::result::Result<Credential, RefreshError>>>,
        consents: Mutex<VecDeque<Result<Credential>>>,
        refresh_calls: AtomicUsize,
        consent_calls: AtomicUsize,
        timeouts: Mutex<Vec<Option<Duration>>>,
        /// Simulated token endpoint latency
        delay: Option<Duration>,
    }

    impl FakeEndpoint {
        fn refreshing(responses: Vec<std::result::Result<Credential, RefreshError>>) -> Arc<Self> {
            Arc::new(Self {
                refreshes: Mutex::new(responses.into()),
                ..Default::default()
            })
        }

        fn consenting(responses: Vec<Result<Credential>>) -> Arc<Self> {
            Arc::new(Self {
                consents: Mutex::new(responses.into()),
                ..Default::default()
            })
        }
    }

    impl TokenEndpoint for FakeEndpoint {
        fn refresh(
            &self,
            _: &str,
            timeout: Option<Duration>,
        ) -> std::result::Result<Credential, RefreshError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.timeouts.lock().unwrap().push(timeout);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.refreshes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RefreshError::Transient("no scripted response".into())))
        }

        fn consent(&self) -> Result<Credential> {
            self.consent_calls.fetch_add(1, Ordering::SeqCst);
            self.consents
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(DigestError::Authentication("no scripted consent".into())))
        }
    }

    fn credential(access: &str, expires_in_secs: i64) -> Credential {
        Credential {
            access_token: access.into(),
            refresh_token: Some("1//refresh".into()),
            expires_at: Some(Utc::now() + ChronoDuration::seconds(expires_in_secs)),
            scopes: vec![GoogleOAuth::GMAIL_READONLY_SCOPE.into()],
        }
    }

    /// What Google returns on refresh: no refresh token, no scopes echoed back
    fn refreshed(access: &str) -> Credential {
        Credential {
            access_token: access.into(),
            refresh_token: None,
            expires_at: Some(Utc::now() + ChronoDuration::seconds(3600)),
            scopes: Vec::new(),
        }
    }

    #[test]
    fn test_valid_stored_credential_is_used_as_is() {
        let endpoint = FakeEndpoint::refreshing(vec![]);
        let store = Arc::new(InMemoryCredentialStore::with_credential(credential("ya29.live", 3600)));
        let mut session = AuthSession::new(endpoint.clone(), store.clone());

        let token = session.ensure_valid(&Deadline::none()).unwrap();
        assert_eq!(token.secret(), "ya29.live");
        assert_eq!(session.state(), AuthState::Valid);
        assert_eq!(endpoint.refresh_calls.load(Ordering::SeqCst), 0);
        // Nothing new to persist
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_expired_credential_is_refreshed_and_persisted() {
        let endpoint = FakeEndpoint::refreshing(vec![Ok(refreshed("ya29.fresh"))]);
        // Inside the five minute skew window counts as expired
        let store = Arc::new(InMemoryCredentialStore::with_credential(credential("ya29.old", 60)));
        let mut session = AuthSession::new(endpoint.clone(), store.clone());

        let token = session.ensure_valid(&Deadline::none()).unwrap();
        assert_eq!(token.secret(), "ya29.fresh");
        assert_eq!(session.state(), AuthState::Valid);
        assert_eq!(store.save_count(), 1);

        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(saved.scopes, vec![GoogleOAuth::GMAIL_READONLY_SCOPE.to_string()]);
    }

    #[test]
    fn test_revoked_grant_fails_until_consent() {
        let endpoint = FakeEndpoint::refreshing(vec![Err(RefreshError::Revoked(
            "invalid_grant".into(),
        ))]);
        endpoint
            .consents
            .lock()
            .unwrap()
            .push_back(Ok(credential("ya29.consented", 3600)));
        let store = InMemoryCredentialStore::with_credential(credential("ya29.old", -10));
        let mut session = AuthSession::new(endpoint.clone(), store);

        let err = session.ensure_valid(&Deadline::none()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(session.state(), AuthState::Failed);

        // Not retried automatically
        assert_eq!(session.ensure_valid(&Deadline::none()).unwrap_err().kind(), ErrorKind::Authentication);
        assert_eq!(endpoint.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(endpoint.consent_calls.load(Ordering::SeqCst), 0);

        assert_eq!(session.consent().unwrap().secret(), "ya29.consented");
        assert_eq!(session.state(), AuthState::Valid);
        assert!(session.ensure_valid(&Deadline::none()).is_ok());
    }

    #[test]
    fn test_transient_refresh_failure_leaves_session_expired() {
        let endpoint = FakeEndpoint::refreshing(vec![
            Err(RefreshError::Transient("connection reset".into())),
            Ok(refreshed("ya29.second-try")),
        ]);
        let store = InMemoryCredentialStore::with_credential(credential("ya29.old", -10));
        let mut session = AuthSession::new(endpoint.clone(), store);

        assert_eq!(session.ensure_valid(&Deadline::none()).unwrap_err().kind(), ErrorKind::Network);
        assert_eq!(session.state(), AuthState::Expired);

        assert_eq!(session.ensure_valid(&Deadline::none()).unwrap().secret(), "ya29.second-try");
        assert_eq!(endpoint.refresh_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalid_client_is_configuration_error() {
        let endpoint =
            FakeEndpoint::refreshing(vec![Err(RefreshError::InvalidClient("invalid_client".into()))]);
        let store = InMemoryCredentialStore::with_credential(credential("ya29.old", -10));
        let mut session = AuthSession::new(endpoint, store);

        assert_eq!(session.ensure_valid(&Deadline::none()).unwrap_err().kind(), ErrorKind::Configuration);
        assert_eq!(session.state(), AuthState::Failed);
    }

    #[test]
    fn test_missing_refresh_token_fails() {
        let mut stale = credential("ya29.old", -10);
        stale.refresh_token = None;
        let endpoint = FakeEndpoint::refreshing(vec![]);
        let mut session =
            AuthSession::new(endpoint.clone(), InMemoryCredentialStore::with_credential(stale));

        assert_eq!(session.ensure_valid(&Deadline::none()).unwrap_err().kind(), ErrorKind::Authentication);
        assert_eq!(session.state(), AuthState::Failed);
        assert_eq!(endpoint.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_credential_non_interactive() {
        let endpoint = FakeEndpoint::consenting(vec![]);
        let mut session =
            AuthSession::new(endpoint.clone(), InMemoryCredentialStore::new()).with_interactive(false);

        assert_eq!(session.ensure_valid(&Deadline::none()).unwrap_err().kind(), ErrorKind::Authentication);
        assert_eq!(session.state(), AuthState::NoCredential);
        assert_eq!(endpoint.consent_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_credential_interactive_consents_and_persists() {
        let endpoint = FakeEndpoint::consenting(vec![Ok(credential("ya29.new", 3600))]);
        let store = Arc::new(InMemoryCredentialStore::new());
        let mut session = AuthSession::new(endpoint.clone(), store.clone());

        assert_eq!(session.ensure_valid(&Deadline::none()).unwrap().secret(), "ya29.new");
        assert_eq!(store.save_count(), 1);
        assert_eq!(endpoint.consent_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidate_then_force_refresh() {
        let endpoint = FakeEndpoint::refreshing(vec![Ok(refreshed("ya29.after-401"))]);
        let store = InMemoryCredentialStore::with_credential(credential("ya29.live", 3600));
        let mut session = AuthSession::new(endpoint.clone(), store);

        session.ensure_valid(&Deadline::none()).unwrap();
        session.invalidate();
        assert_eq!(session.state(), AuthState::Expired);

        assert_eq!(session.force_refresh(&Deadline::none()).unwrap().secret(), "ya29.after-401");
        assert_eq!(endpoint.refresh_calls.load(Ordering::SeqCst), 1);
        // The fresh token is now used without another refresh
        assert_eq!(session.ensure_valid(&Deadline::none()).unwrap().secret(), "ya29.after-401");
        assert_eq!(endpoint.refresh_calls.load(Ordering::SeqCst), 1);
    }

    fn slow_endpoint(response: std::result::Result<Credential, RefreshError>) -> Arc<FakeEndpoint> {
        Arc::new(FakeEndpoint {
            refreshes: Mutex::new(vec![response].into()),
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        })
    }

    #[test]
    fn test_refresh_gets_remaining_budget() {
        let endpoint = FakeEndpoint::refreshing(vec![Ok(refreshed("ya29.fresh"))]);
        let store = InMemoryCredentialStore::with_credential(credential("ya29.old", -10));
        let mut session = AuthSession::new(endpoint.clone(), store);

        session.ensure_valid(&Deadline::after(Duration::from_secs(60))).unwrap();
        let timeouts = endpoint.timeouts.lock().unwrap();
        let budget = timeouts[0].unwrap();
        assert!(budget > Duration::ZERO && budget <= Duration::from_secs(60));
    }

    #[test]
    fn test_passed_deadline_skips_refresh() {
        let endpoint = FakeEndpoint::refreshing(vec![Ok(refreshed("ya29.fresh"))]);
        let store = InMemoryCredentialStore::with_credential(credential("ya29.old", -10));
        let mut session = AuthSession::new(endpoint.clone(), store);

        let err = session.ensure_valid(&Deadline::after(Duration::ZERO)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(session.state(), AuthState::Expired);
        assert_eq!(endpoint.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_refresh_failing_past_deadline_is_timeout() {
        let endpoint = slow_endpoint(Err(RefreshError::Transient("request timed out".into())));
        let store = InMemoryCredentialStore::with_credential(credential("ya29.old", -10));
        let mut session = AuthSession::new(endpoint.clone(), store);

        let err = session
            .ensure_valid(&Deadline::after(Duration::from_millis(10)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(session.state(), AuthState::Expired);
        assert_eq!(endpoint.refresh_calls.load(Ordering::SeqCst), 1);
        assert!(endpoint.timeouts.lock().unwrap()[0].unwrap() <= Duration::from_millis(10));
    }

    #[test]
    fn test_late_refresh_is_timeout_but_token_kept() {
        let endpoint = slow_endpoint(Ok(refreshed("ya29.late")));
        let store = Arc::new(InMemoryCredentialStore::with_credential(credential("ya29.old", -10)));
        let mut session = AuthSession::new(endpoint.clone(), store.clone());

        let err = session
            .ensure_valid(&Deadline::after(Duration::from_millis(10)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(store.save_count(), 1);

        // The next call uses the stored token without refreshing again
        assert_eq!(session.ensure_valid(&Deadline::none()).unwrap().secret(), "ya29.late");
        assert_eq!(endpoint.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_revoked_grant_past_deadline_still_fails_session() {
        let endpoint = slow_endpoint(Err(RefreshError::Revoked("invalid_grant".into())));
        let store = InMemoryCredentialStore::with_credential(credential("ya29.old", -10));
        let mut session = AuthSession::new(endpoint, store);

        let err = session
            .ensure_valid(&Deadline::after(Duration::from_millis(10)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(session.state(), AuthState::Failed);
    }

    struct ReadOnlyStore(Credential);

    impl CredentialStore for ReadOnlyStore {
        fn load(&self) -> Result<Option<Credential>> {
            Ok(Some(self.0.clone()))
        }

        fn save(&self, _: &Credential) -> Result<()> {
            Err(DigestError::Configuration("read-only file system".into()))
        }

        fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_persistence_failure_keeps_token_in_memory() {
        let endpoint = FakeEndpoint::refreshing(vec![Ok(refreshed("ya29.fresh"))]);
        let mut session =
            AuthSession::new(endpoint, ReadOnlyStore(credential("ya29.old", -10)));

        assert_eq!(session.ensure_valid(&Deadline::none()).unwrap().secret(), "ya29.fresh");
        assert_eq!(session.state(), AuthState::Valid);
        assert_eq!(session.ensure_valid(&Deadline::none()).unwrap().secret(), "ya29.fresh");
    }

    #[test]
    fn test_logout_clears_store() {
        let endpoint = FakeEndpoint::refreshing(vec![]);
        let store = Arc::new(InMemoryCredentialStore::with_credential(credential("ya29.live", 3600)));
        let mut session =
            AuthSession::new(endpoint, store.clone()).with_interactive(false);

        session.ensure_valid(&Deadline::none()).unwrap();
        session.logout().unwrap();
        assert_eq!(session.state(), AuthState::NoCredential);
        assert!(store.load().unwrap().is_none());
        assert!(session.ensure_valid(&Deadline::none()).is_err());
    }

    #[test]
    fn test_authorization_url() {
        let url = authorization_url("client.apps.googleusercontent.com", "http://localhost:8080", "abc123");
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client.apps.googleusercontent.com"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fgmail.readonly"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("state=abc123"));
    }

    #[test]
    fn test_parse_callback() {
        let ok = parse_callback("GET /?state=s1&code=4%2F0Ab&scope=x HTTP/1.1\r\n", "s1");
        assert_eq!(ok.unwrap().unwrap(), "4/0Ab");

        let denied = parse_callback("GET /?error=access_denied&state=s1 HTTP/1.1", "s1");
        assert_eq!(denied.unwrap().unwrap_err().kind(), ErrorKind::Authentication);

        let forged = parse_callback("GET /?code=abc&state=other HTTP/1.1", "s1");
        assert!(forged.unwrap().is_err());

        assert!(parse_callback("GET /favicon.ico HTTP/1.1", "s1").is_none());
        assert!(parse_callback("", "s1").is_none());
    }

    #[test]
    fn test_random_state_is_unique() {
        let a = random_state();
        // 32 bytes, base64url without padding
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(a, random_state());
        // Safe to put in a query string unescaped
        assert_eq!(urlencoding::encode(&a), a);
    }

    #[test]
    fn test_classify_token_error() {
        assert!(matches!(
            classify_token_error(400, r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#),
            RefreshError::Revoked(_)
        ));
        assert!(matches!(
            classify_token_error(401, r#"{"error":"invalid_client"}"#),
            RefreshError::InvalidClient(_)
        ));
        assert!(matches!(classify_token_error(503, ""), RefreshError::Transient(_)));
        assert!(matches!(classify_token_error(429, ""), RefreshError::Transient(_)));
        assert!(matches!(classify_token_error(400, "<html>"), RefreshError::Revoked(_)));
    }

    #[test]
    fn test_token_response_into_credential() {
        let json = r#"{
            "access_token": "ya29.a0",
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/gmail.readonly openid",
            "token_type": "Bearer"
        }"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        let now = Utc::now();
        let credential = response.into_credential(now);

        assert_eq!(credential.access_token, "ya29.a0");
        assert!(credential.refresh_token.is_none());
        assert_eq!(credential.expires_at, Some(now + ChronoDuration::seconds(3599)));
        assert_eq!(credential.scopes.len(), 2);
    }
}
