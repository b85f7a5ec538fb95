//! The retrieval pipeline end to end
//!
//! [`MailDigest`] wires the pieces together:
//! `ensure_valid` → `build_query` → fetch → parse → [`assemble`].

mod assemble;
mod render;

pub use assemble::{DigestMetadata, DigestResult, assemble};

use chrono::{Local, NaiveDate};
use log::{debug, info};

use crate::config::DigestSettings;
use crate::error::Result;
use crate::fetch::{Deadline, MessageFetcher};
use crate::gmail::{AuthSession, GmailClient, GoogleOAuth, MailApi, MessageParser};
use crate::models::SearchCriteria;
use crate::query::build_query;
use crate::storage::FileCredentialStore;

/// Retrieves and normalizes unread mail for a set of senders
pub struct MailDigest<A: MailApi> {
    session: AuthSession,
    fetcher: MessageFetcher<A>,
    parser: MessageParser,
}

impl MailDigest<GmailClient> {
    /// Build the Gmail pipeline from settings.
    ///
    /// Client secrets are read here so configuration problems surface before
    /// any network call.
    pub fn from_settings(settings: &DigestSettings) -> Result<Self> {
        settings.validate()?;
        let secrets = settings.client_secrets()?;

        let session = AuthSession::new(
            GoogleOAuth::new(secrets),
            FileCredentialStore::new(settings.token_path.clone()),
        )
        .with_interactive(settings.interactive_auth);

        Ok(Self::new(
            session,
            MessageFetcher::from_settings(GmailClient::new(), settings),
            MessageParser::from_settings(settings),
        ))
    }
}

impl<A: MailApi> MailDigest<A> {
    pub fn new(session: AuthSession, fetcher: MessageFetcher<A>, parser: MessageParser) -> Self {
        Self {
            session,
            fetcher,
            parser,
        }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn fetcher(&self) -> &MessageFetcher<A> {
        &self.fetcher
    }

    /// For explicit `consent()` or `logout()`
    pub fn session_mut(&mut self) -> &mut AuthSession {
        &mut self.session
    }

    /// Run the pipeline for today's date
    pub fn run(&mut self, criteria: &SearchCriteria, deadline: &Deadline) -> Result<DigestResult> {
        self.run_at(criteria, Local::now().date_naive(), deadline)
    }

    /// Run the pipeline with an explicit "today"
    pub fn run_at(
        &mut self,
        criteria: &SearchCriteria,
        today: NaiveDate,
        deadline: &Deadline,
    ) -> Result<DigestResult> {
        info!(
            "Reading unread mail from {} sender(s) over the last {} day(s)",
            criteria.senders().len(),
            criteria.days()
        );

        self.session.ensure_valid(deadline)?;

        let query = build_query(criteria, today);
        debug!("Search query: {}", query);

        let outcome = self.fetcher.fetch(&mut self.session, &query, deadline)?;
        let fetch_failed = outcome.failed_count();
        let parsed = outcome
            .messages
            .iter()
            .map(|raw| self.parser.parse(raw))
            .collect();

        let result = assemble(criteria, outcome.listed, fetch_failed, parsed);
        info!(
            "Digest ready: {} message(s), {} failed, {} parse issue(s)",
            result.messages.len(),
            result.metadata.failed_count,
            result.metadata.parse_issues
        );
        Ok(result)
    }
}
