//! Ordered access-control list evaluation.
//!
//! Both evaluators scan the list in order and stop at the first matching
//! entry. The OIDC evaluator always allows on a match; the Header evaluator
//! returns the inverse of the entry's `forbidden` flag. The difference is
//! inherited behavior that callers depend on, so the two paths stay
//! separate.

use crate::config::AccessControlEntry;

fn entry_matches(entry: &AccessControlEntry, groups: &[String], email: &str) -> bool {
    if entry.regexp {
        if !entry.group.is_empty()
            && let Some(pattern) = &entry.group_regexp
            && groups.iter().any(|group| pattern.is_match(group))
        {
            return true;
        }
        if !entry.email.is_empty()
            && let Some(pattern) = &entry.email_regexp
            && pattern.is_match(email)
        {
            return true;
        }
        false
    } else {
        (!entry.group.is_empty() && groups.iter().any(|group| group == &entry.group))
            || (!entry.email.is_empty() && entry.email == email)
    }
}

fn first_match<'a>(
    entries: &'a [AccessControlEntry],
    groups: &[String],
    email: &str,
) -> Option<&'a AccessControlEntry> {
    entries.iter().find(|entry| entry_matches(entry, groups, email))
}

/// ACL evaluation for OIDC-authenticated resources. An empty list means
/// authentication alone is sufficient. The first matching entry always
/// allows, even when flagged forbidden.
pub fn is_oidc_authorized(groups: &[String], email: &str, entries: &[AccessControlEntry]) -> bool {
    if entries.is_empty() {
        return true;
    }
    first_match(entries, groups, email).is_some()
}

/// ACL evaluation for Header-authenticated resources. An empty list means
/// authentication alone is sufficient. The first matching entry decides:
/// allow unless it is flagged forbidden.
pub fn is_header_authorized(groups: &[String], email: &str, entries: &[AccessControlEntry]) -> bool {
    if entries.is_empty() {
        return true;
    }
    first_match(entries, groups, email)
        .map(|entry| !entry.forbidden)
        .unwrap_or(false)
}
