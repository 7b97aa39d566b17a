//! Incremental channel membership: who still needs an invite.

use std::collections::HashSet;

/// Returns `(sticky ∪ assignees) − already_invited`, deduplicated, sticky
/// accounts first in configured order followed by assignees in input order.
/// Blank ids are ignored.
pub fn invitee_delta(
    already_invited: &[String],
    sticky_account_ids: &[String],
    assignee_account_ids: &[String],
) -> Vec<String> {
    let mut seen = already_invited
        .iter()
        .map(String::as_str)
        .collect::<HashSet<_>>();
    let mut delta = Vec::new();
    for account_id in sticky_account_ids.iter().chain(assignee_account_ids) {
        let account_id = account_id.trim();
        if account_id.is_empty() {
            continue;
        }
        if seen.insert(account_id) {
            delta.push(account_id.to_string());
        }
    }
    delta
}
