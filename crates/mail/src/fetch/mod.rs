//! Message retrieval with retry and auth recovery
//!
//! Fetching happens in two phases: list every matching message id (following
//! page tokens), then fetch each message in listing order. Each network call
//! gets its own retry budget; a 401 triggers a single credential refresh.

mod deadline;
mod retry;

pub use deadline::Deadline;
pub use retry::{Failure, RetryPolicy, RetryReason, classify};

use log::{debug, info, warn};
use std::collections::HashSet;
use std::time::Duration;

use crate::config::DigestSettings;
use crate::error::{DigestError, Result};
use crate::gmail::{ApiError, AuthSession, MailApi, RawMessage};
use crate::models::{AccessToken, MessageId};

/// A message whose detail fetch failed and was skipped
#[derive(Debug)]
pub struct FetchFailure {
    pub id: MessageId,
    pub error: DigestError,
}

/// Everything one fetch produced
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Number of ids the listing phase returned
    pub listed: usize,
    /// Successfully fetched messages, in listing order
    pub messages: Vec<RawMessage>,
    pub failures: Vec<FetchFailure>,
}

impl FetchOutcome {
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }
}

type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Lists and fetches messages through a [`MailApi`]
pub struct MessageFetcher<A: MailApi> {
    api: A,
    policy: RetryPolicy,
    page_size: usize,
    max_messages: Option<usize>,
    sleep: Sleeper,
}

impl<A: MailApi> MessageFetcher<A> {
    pub const DEFAULT_PAGE_SIZE: usize = 100;

    pub fn new(api: A) -> Self {
        Self {
            api,
            policy: RetryPolicy::default(),
            page_size: Self::DEFAULT_PAGE_SIZE,
            max_messages: None,
            sleep: Box::new(std::thread::sleep),
        }
    }

    pub fn from_settings(api: A, settings: &DigestSettings) -> Self {
        Self::new(api)
            .with_policy(RetryPolicy::from_settings(settings))
            .with_max_messages(settings.max_messages)
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Stop listing once this many ids are collected
    pub fn with_max_messages(mut self, max_messages: Option<usize>) -> Self {
        self.max_messages = max_messages;
        self
    }

    /// Replace the blocking backoff sleep
    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// List and fetch every message matching `query`.
    ///
    /// A failed detail fetch is logged and recorded in
    /// [`FetchOutcome::failures`]; the remaining messages are still fetched.
    /// Timeouts and authentication or configuration failures abort the call.
    pub fn fetch(
        &self,
        session: &mut AuthSession,
        query: &str,
        deadline: &Deadline,
    ) -> Result<FetchOutcome> {
        let ids = self.list_ids(session, query, deadline)?;
        info!("Found {} message(s) matching query", ids.len());

        let mut outcome = FetchOutcome {
            listed: ids.len(),
            messages: Vec::with_capacity(ids.len()),
            failures: Vec::new(),
        };

        for id in ids {
            let fetched = self.call_with_retry(session, deadline, "get_message", |token, timeout| {
                self.api.get_message(token, &id, timeout)
            });

            match fetched {
                Ok(message) => outcome.messages.push(message),
                Err(
                    e @ (DigestError::Timeout
                    | DigestError::Authentication(_)
                    | DigestError::Configuration(_)),
                ) => return Err(e),
                Err(e) => {
                    warn!("Skipping message {}: {}", id, e);
                    outcome.failures.push(FetchFailure { id, error: e });
                }
            }
        }

        if !outcome.failures.is_empty() {
            warn!(
                "Fetched {} of {} message(s), {} failed",
                outcome.messages.len(),
                outcome.listed,
                outcome.failed_count()
            );
        }
        Ok(outcome)
    }

    /// Collect matching ids across all pages, in listing order
    pub fn list_ids(
        &self,
        session: &mut AuthSession,
        query: &str,
        deadline: &Deadline,
    ) -> Result<Vec<MessageId>> {
        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        loop {
            if let Some(max) = self.max_messages
                && ids.len() >= max
            {
                debug!("Reached message cap of {}", max);
                break;
            }

            let page = self.call_with_retry(session, deadline, "list_messages", |token, timeout| {
                self.api
                    .list_messages(token, query, page_token.as_deref(), self.page_size, timeout)
            })?;
            pages += 1;

            for message in page.messages.unwrap_or_default() {
                // Listings can shift between pages
                if seen.insert(message.id.clone()) {
                    ids.push(MessageId::new(message.id));
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        if let Some(max) = self.max_messages {
            ids.truncate(max);
        }
        debug!("Listed {} message id(s) over {} page(s)", ids.len(), pages);
        Ok(ids)
    }

    /// Run one API call under the retry policy.
    ///
    /// 429/5xx/connection failures back off and retry up to the policy's
    /// attempt limit. A 401 invalidates the credential, refreshes once and
    /// repeats the call without using up an attempt.
    fn call_with_retry<T>(
        &self,
        session: &mut AuthSession,
        deadline: &Deadline,
        operation: &str,
        call: impl Fn(&AccessToken, Option<Duration>) -> std::result::Result<T, ApiError>,
    ) -> Result<T> {
        let mut token = session.ensure_valid(deadline)?;
        let mut failures = 0u32;
        let mut refreshed = false;

        loop {
            let timeout = deadline.remaining()?;

            let err = match call(&token, timeout) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match classify(err, deadline) {
                Failure::Fatal(e) => return Err(e),
                Failure::Unauthorized if !refreshed => {
                    warn!("{} returned HTTP 401, refreshing credential", operation);
                    refreshed = true;
                    session.invalidate();
                    token = session.force_refresh(deadline)?;
                }
                Failure::Unauthorized => {
                    return Err(DigestError::Authentication(format!(
                        "{} still returned HTTP 401 after refreshing the credential",
                        operation
                    )));
                }
                Failure::Retryable { reason, detail } => {
                    failures += 1;
                    if failures >= self.policy.max_attempts {
                        warn!("{} failed {} times, giving up: {}", operation, failures, detail);
                        return Err(retry::exhausted(reason, failures, &detail));
                    }

                    let delay = self.policy.delay_for(failures - 1);
                    if !deadline.allows_wait(delay) {
                        warn!("{} backoff of {:?} would pass the deadline", operation, delay);
                        return Err(DigestError::Timeout);
                    }

                    warn!(
                        "{} failed ({:?}: {}), retrying in {:?} (attempt {}/{})",
                        operation,
                        reason,
                        detail,
                        delay,
                        failures + 1,
                        self.policy.max_attempts
                    );
                    (self.sleep)(delay);
                }
            }
        }
    }
}
