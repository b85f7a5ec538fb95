//! Search criteria: which senders, how far back

use chrono::{Days, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::{DigestError, Result};

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("address pattern")
});

/// Check an address against the accepted `local@domain.tld` syntax
pub fn is_valid_address(address: &str) -> bool {
    ADDRESS_RE.is_match(address)
}

/// Validated sender list and lookback window
///
/// Construction is the only place validation happens, so a `SearchCriteria`
/// value is always safe to turn into a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    senders: Vec<String>,
    days: i64,
}

impl SearchCriteria {
    /// Lookback used when the caller doesn't pick one
    pub const DEFAULT_DAYS: i64 = 7;

    /// Build criteria from raw caller input.
    ///
    /// Senders are trimmed and de-duplicated (first occurrence wins).
    ///
    /// # Errors
    /// `Validation` if the list is empty, an address is malformed, or
    /// `days` is not positive.
    pub fn new<I, S>(senders: I, days: i64) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut validated: Vec<String> = Vec::new();
        for sender in senders {
            let trimmed = sender.as_ref().trim();
            if !is_valid_address(trimmed) {
                return Err(DigestError::Validation(format!(
                    "invalid email format: '{}'",
                    sender.as_ref()
                )));
            }
            if !validated.iter().any(|s| s.eq_ignore_ascii_case(trimmed)) {
                validated.push(trimmed.to_string());
            }
        }

        if validated.is_empty() {
            return Err(DigestError::Validation(
                "at least one sender email is required".to_string(),
            ));
        }

        if days <= 0 {
            return Err(DigestError::Validation(format!(
                "days must be a positive integer, got {}",
                days
            )));
        }

        Ok(Self {
            senders: validated,
            days,
        })
    }

    /// Criteria with the default seven-day window
    pub fn with_default_days<I, S>(senders: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(senders, Self::DEFAULT_DAYS)
    }

    pub fn senders(&self) -> &[String] {
        &self.senders
    }

    pub fn days(&self) -> i64 {
        self.days
    }

    /// First calendar day that is *not* included, i.e. `today - days`
    pub fn threshold_date(&self, today: NaiveDate) -> NaiveDate {
        // days > 0 is guaranteed by construction
        today
            .checked_sub_days(Days::new(self.days as u64))
            .unwrap_or(NaiveDate::MIN)
    }
}
