//! POP3 connection management.

mod blocking;
mod client;

pub use blocking::BlockingClient;
pub use client::Client;

/// Extracts the APOP timestamp (`<...>`) from a greeting banner.
pub(crate) fn apop_timestamp(banner: &str) -> Option<String> {
    let start = banner.find('<')?;
    let end = banner[start..].find('>')? + start;
    Some(banner[start..=end].to_string())
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
    fn test_apop_timestamp_extraction() {
        assert_eq!(
            apop_timestamp("POP3 server ready <1896.697170952@dbc.mtview.ca.us>"),
            Some("<1896.697170952@dbc.mtview.ca.us>".to_string())
        );
        assert_eq!(apop_timestamp("POP3 server ready"), None);
        assert_eq!(apop_timestamp("broken <timestamp"), None);
    }
}
