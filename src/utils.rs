//! Formatting helpers for analytics properties

use std::time::Duration;

/// Placeholder used wherever a size or percentage cannot be computed
pub const UNKNOWN: &str = "Unknown";

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Format a byte count in MiB with four decimals
///
/// # Examples
///
/// ```
/// use fetch_tracker::utils::format_mib;
///
/// assert_eq!(format_mib(1_048_576), "1.0000");
/// assert_eq!(format_mib(500_000), "0.4768");
/// ```
pub fn format_mib(bytes: u64) -> String {
    format!("{:.4}", bytes as f64 / BYTES_PER_MIB)
}

/// Format a declared size, or [`UNKNOWN`] when the size is not known
pub fn format_size(total: Option<u64>) -> String {
    match total {
        Some(bytes) => format_mib(bytes),
        None => UNKNOWN.to_string(),
    }
}

/// Format a speed given in bytes per second as MiB/s with four decimals
pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{:.4}", bytes_per_sec / BYTES_PER_MIB)
}

/// Format a duration as seconds with two decimals
pub fn format_seconds(elapsed: Duration) -> String {
    format!("{:.2}", elapsed.as_secs_f64())
}

/// Format a percentage with two decimals, or [`UNKNOWN`]
///
/// Non-finite values are treated as unknown, so the label is never "NaN".
pub fn format_percent(percent: Option<f64>) -> String {
    match percent {
        Some(value) if value.is_finite() => format!("{value:.2}"),
        _ => UNKNOWN.to_string(),
    }
}

/// Bytes per second over an elapsed duration, zero when nothing has elapsed
pub fn bytes_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { bytes as f64 / secs } else { 0.0 }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_use_mebibytes() {
        assert_eq!(format_mib(0), "0.0000");
        assert_eq!(format_mib(1_000_000), "0.9537");
        assert_eq!(format_size(Some(2 * 1024 * 1024)), "2.0000");
        assert_eq!(format_size(None), "Unknown");
    }

    #[test]
    fn speed_and_time_formatting() {
        assert_eq!(format_speed(500_000.0), "0.4768");
        assert_eq!(format_seconds(Duration::from_millis(2000)), "2.00");
        assert_eq!(format_seconds(Duration::from_millis(1234)), "1.23");
    }

    #[test]
    fn percent_is_never_nan() {
        assert_eq!(format_percent(Some(100.0)), "100.00");
        assert_eq!(format_percent(Some(33.333)), "33.33");
        assert_eq!(format_percent(None), "Unknown");
        assert_eq!(format_percent(Some(f64::NAN)), "Unknown");
    }

    #[test]
    fn bytes_per_second_handles_zero_elapsed() {
        assert_eq!(bytes_per_second(1_000, Duration::ZERO), 0.0);
        assert_eq!(bytes_per_second(1_000_000, Duration::from_secs(2)), 500_000.0);
    }
}
