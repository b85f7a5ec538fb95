//! OAuth credential material

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Mask a token for safe output: first 4 chars, then `***`
pub fn mask_token(token: &str) -> String {
    match token.char_indices().nth(4) {
        Some((end, _)) => format!("{}***", &token[..end]),
        None => "***".to_string(),
    }
}

/// Stored OAuth credential
///
/// Field aliases accept the token files written by Google's client
/// libraries (`token`, `expiry`).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(alias = "token")]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// `None` means unknown; such a token is treated as expired
    #[serde(default, alias = "expiry")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Credential {
    /// Whether the access token is expired or will be within `skew`
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now + skew,
            None => true,
        }
    }

    pub fn access_token(&self) -> AccessToken {
        AccessToken(self.access_token.clone())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(mask_token))
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Bearer token handed to API calls
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the Authorization header only
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessToken({})", mask_token(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expires_in_secs: Option<i64>) -> Credential {
        Credential {
            access_token: "ya29.access-token-value".into(),
            refresh_token: Some("1//refresh-token-value".into()),
            expires_at: expires_in_secs.map(|s| Utc::now() + Duration::seconds(s)),
            scopes: vec!["https://www.googleapis.com/auth/gmail.readonly".into()],
        }
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("ya29.abcdef"), "ya29***");
        assert_eq!(mask_token("abc"), "***");
        assert_eq!(mask_token("abcd"), "***");
    }

    #[test]
    fn test_expiry_with_skew() {
        let now = Utc::now();
        let skew = Duration::seconds(300);
        assert!(!credential(Some(3600)).is_expired_at(now, skew));
        assert!(credential(Some(120)).is_expired_at(now, skew));
        assert!(credential(Some(-10)).is_expired_at(now, skew));
        assert!(credential(None).is_expired_at(now, skew));
    }

    #[test]
    fn test_debug_never_shows_tokens() {
        let rendered = format!("{:?}", credential(Some(3600)));
        assert!(!rendered.contains("access-token-value"));
        assert!(!rendered.contains("refresh-token-value"));

        let token = credential(Some(3600)).access_token();
        assert!(!format!("{:?}", token).contains("access-token-value"));
        assert_eq!(token.secret(), "ya29.access-token-value");
    }

    #[test]
    fn test_accepts_google_client_library_format() {
        let json = r#"{
            "token": "ya29.from-python",
            "refresh_token": "1//refresh",
            "token_uri": "https://oauth2.googleapis.com/token",
            "scopes": ["https://www.googleapis.com/auth/gmail.readonly"],
            "expiry": "2030-01-01T00:00:00.000000Z"
        }"#;
        let credential: Credential = serde_json::from_str(json).unwrap();
        assert_eq!(credential.access_token, "ya29.from-python");
        assert_eq!(credential.scopes.len(), 1);
        assert!(credential.expires_at.is_some());
    }
}
