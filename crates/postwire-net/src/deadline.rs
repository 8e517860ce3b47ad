//! Deadline wrapper for response waits.
//!
//! Every wait-for-response in the async clients goes through
//! [`deadline`]. Three outcomes are possible and kept distinct:
//!
//! - the response arrives: the inner future's result is returned
//! - nothing arrives in time: [`Error::Timeout`]
//! - the peer closes the stream: [`Error::ConnectionClosed`], produced
//!   by the read path itself (a timeout must never mask a closed
//!   connection)
//!
//! A limit of `None` disables the timer entirely. The losing branch of
//! the race is dropped without side effects: cancelling a wait never
//! closes the transport.

use std::future::Future;
use std::time::Duration;

use crate::Error;

/// Runs `fut` under an optional deadline.
///
/// # Errors
///
/// Returns `Error::Timeout` (converted into `E`) if the deadline expires
/// first, otherwise whatever the inner future returns.
pub async fn deadline<T, E, F>(limit: Option<Duration>, fut: F) -> Result<T, E>
where
    E: From<Error>,
    F: Future<Output = Result<T, E>>,
{
    match limit {
        None => fut.await,
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(limit).into()),
        },
    }
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

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let result: Result<(), Error> = deadline(Some(Duration::from_millis(100)), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(Error::Timeout(d)) if d == Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_inner_completes() {
        let result: Result<u32, Error> =
            deadline(Some(Duration::from_secs(60)), async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_deadline_never_times_out() {
        let result: Result<u32, Error> = deadline(None, async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inner_error_passes_through() {
        // A connection closed during the wait must surface as
        // ConnectionClosed, not Timeout.
        let result: Result<(), Error> = deadline(Some(Duration::from_secs(60)), async {
            Err(Error::ConnectionClosed)
        })
        .await;

        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }
}
