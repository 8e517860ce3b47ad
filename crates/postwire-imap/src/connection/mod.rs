//! IMAP connection management.

mod blocking;
mod client;
mod session;

pub use blocking::BlockingClient;
pub use client::Client;
pub use session::Session;

use crate::parser::UntaggedResponse;
use crate::types::ListEntry;

/// Extracts `AUTH=<name>` mechanism names from a capability list.
pub(crate) fn auth_mechanisms(capabilities: &[String]) -> Vec<String> {
    capabilities
        .iter()
        .filter_map(|cap| cap.strip_prefix("AUTH="))
        .map(ToString::to_string)
        .collect()
}

/// Extracts LIST entries from collected untagged responses.
pub(crate) fn collect_list(responses: Vec<UntaggedResponse>) -> Vec<ListEntry> {
    responses
        .into_iter()
        .filter_map(|r| match r {
            UntaggedResponse::List(entry) => Some(entry),
            _ => None,
        })
        .collect()
}

/// Extracts SEARCH hits from collected untagged responses.
pub(crate) fn collect_search(responses: Vec<UntaggedResponse>) -> Vec<u32> {
    responses
        .into_iter()
        .filter_map(|r| match r {
            UntaggedResponse::Search(hits) => Some(hits),
            _ => None,
        })
        .flatten()
        .collect()
}

/// Extracts raw FETCH records from collected untagged responses.
pub(crate) fn collect_fetch(responses: Vec<UntaggedResponse>) -> Vec<(u32, Vec<u8>)> {
    responses
        .into_iter()
        .filter_map(|r| match r {
            UntaggedResponse::Fetch { seq, raw } => Some((seq, raw)),
            _ => None,
        })
        .collect()
}

/// Extracts expunged sequence numbers from collected responses.
pub(crate) fn collect_expunge(responses: Vec<UntaggedResponse>) -> Vec<u32> {
    responses
        .into_iter()
        .filter_map(|r| match r {
            UntaggedResponse::Expunge(seq) => Some(seq),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_mechanisms() {
        let caps = vec![
            "IMAP4rev1".to_string(),
            "AUTH=PLAIN".to_string(),
            "AUTH=SCRAM-SHA-256".to_string(),
            "IDLE".to_string(),
        ];
        assert_eq!(auth_mechanisms(&caps), vec!["PLAIN", "SCRAM-SHA-256"]);
    }

    #[test]
    fn test_collect_search_flattens() {
        let responses = vec![
            UntaggedResponse::Search(vec![1, 2]),
            UntaggedResponse::Exists(5),
            UntaggedResponse::Search(vec![9]),
        ];
        assert_eq!(collect_search(responses), vec![1, 2, 9]);
    }
}
