//! Gmail search query construction
//!
//! Turns validated [`SearchCriteria`] into the provider's search syntax:
//! `(from:a@x.com OR from:b@y.com) is:unread after:2026/10/12`.

use chrono::NaiveDate;

use crate::models::SearchCriteria;

/// Date format Gmail's `after:` operator expects
const QUERY_DATE_FORMAT: &str = "%Y/%m/%d";

/// Build the search query for unread mail from the criteria's senders
/// received after `today - days`.
///
/// `today` is passed in so results are reproducible; callers use
/// `Local::now().date_naive()`.
pub fn build_query(criteria: &SearchCriteria, today: NaiveDate) -> String {
    let senders = criteria
        .senders()
        .iter()
        .map(|sender| format!("from:{}", sender))
        .collect::<Vec<_>>()
        .join(" OR ");

    format!(
        "({}) is:unread after:{}",
        senders,
        criteria.threshold_date(today).format(QUERY_DATE_FORMAT)
    )
}
