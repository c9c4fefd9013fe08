//! Time utilities for the ledger.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Parse a millisecond count into a duration; `0` means "no limit".
pub fn millis_to_limit(millis: u64) -> Option<Duration> {
    if millis == 0 {
        None
    } else {
        Some(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_to_limit() {
        assert_eq!(millis_to_limit(0), None);
        assert_eq!(millis_to_limit(250), Some(Duration::from_millis(250)));
    }
}
