//! Helpers to implement throttling within the wire protocol.

use std::time::Duration;

use tracing::warn;

/// Convert the `throttle_time_ms` field of a response into a delay the caller
/// should observe before issuing further requests.
///
/// Returns `None` when the request was not throttled.
pub(crate) fn throttle_duration(throttle_time_ms: i32) -> Option<Duration> {
    let throttle_time_ms: u64 = match throttle_time_ms.try_into() {
        Ok(t) => t,
        Err(_) => {
            warn!(throttle_time_ms, "broker sent invalid throttle time");
            return None;
        }
    };

    (throttle_time_ms > 0).then(|| Duration::from_millis(throttle_time_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_duration() {
        assert_eq!(throttle_duration(0), None);
        assert_eq!(throttle_duration(-5), None);
        assert_eq!(throttle_duration(250), Some(Duration::from_millis(250)));
    }
}
