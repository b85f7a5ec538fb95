//! Digest result assembly

use serde::{Deserialize, Serialize};

use crate::error::{DigestError, Result};
use crate::gmail::ParsedMessage;
use crate::models::{MessageContent, SearchCriteria};

/// What was searched and how it went
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestMetadata {
    /// Ids the search listed
    pub total_found: usize,
    pub senders_queried: Vec<String>,
    pub days_window: i64,
    /// Listed messages that were skipped because their fetch failed, plus
    /// messages that came back with parsing problems
    pub failed_count: usize,
    /// Non-fatal part-level problems across all parsed messages
    pub parse_issues: usize,
}

/// Parsed messages plus search metadata, in provider listing order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestResult {
    pub messages: Vec<MessageContent>,
    pub metadata: DigestMetadata,
}

impl DigestResult {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DigestError::Parsing(format!("failed to serialize digest: {}", e)))
    }
}

/// Combine parsed messages with the criteria they were found by.
///
/// Messages with parsing issues are kept (whatever could be recovered) and
/// each one adds to `failed_count` alongside the `fetch_failed` skips.
pub fn assemble(
    criteria: &SearchCriteria,
    total_found: usize,
    fetch_failed: usize,
    parsed: Vec<ParsedMessage>,
) -> DigestResult {
    let parse_issues = parsed.iter().map(|p| p.issues.len()).sum();
    let parse_failed = parsed.iter().filter(|p| !p.issues.is_empty()).count();

    DigestResult {
        messages: parsed.into_iter().map(|p| p.content).collect(),
        metadata: DigestMetadata {
            total_found,
            senders_queried: criteria.senders().to_vec(),
            days_window: criteria.days(),
            failed_count: fetch_failed + parse_failed,
            parse_issues,
        },
    }
}
