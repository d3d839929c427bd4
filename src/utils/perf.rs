//! Performance measurement utilities for the binaries.
//!
//! Peak memory is read from `/proc/self/status` on Linux; wall-clock timings use
//! [`std::time::Instant`].

use std::time::{Duration, Instant};

/// Reads the peak resident set size (`VmHWM`) from `/proc/self/status` on Linux.
///
/// # Returns
/// The peak resident memory in kilobytes (KB), or 0 if the value cannot be read.
#[cfg(target_os = "linux")]
pub fn get_peak_rss_kb() -> u64 {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return 0;
    };
    status
        .lines()
        .find(|line| line.starts_with("VmHWM:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

/// Peak RSS is only available on Linux; elsewhere this returns 0.
#[cfg(not(target_os = "linux"))]
pub fn get_peak_rss_kb() -> u64 {
    use std::sync::Once;
    static WARN_ONCE: Once = Once::new();
    WARN_ONCE.call_once(|| {
        log::warn!("Peak RSS measurement is only supported on Linux; returning 0.");
    });
    0
}

/// Runs `f` and returns its result with the elapsed wall-clock time.
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let value = f();
    (value, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_returns_value() {
        let (value, elapsed) = timed(|| 6 * 7);
        assert_eq!(value, 42);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_peak_rss_is_reported_on_linux() {
        assert!(get_peak_rss_kb() > 0);
    }
}
