//! Human-readable clock formatting
//!
//! Positions in an audiobook run from seconds to tens of hours; logs and
//! event payloads render them as `M:SS` below one hour and `H:MM:SS` above.

/// Format a playback position as a clock string
///
/// Fractional seconds are truncated. Negative and non-finite inputs are
/// rendered with a leading `-` or as `--:--`.
///
/// # Examples
///
/// ```
/// use sravana_common::human_time::format_clock;
///
/// assert_eq!(format_clock(5.0), "0:05");
/// assert_eq!(format_clock(305.9), "5:05");
/// assert_eq!(format_clock(3661.0), "1:01:01");
/// assert_eq!(format_clock(f64::NAN), "--:--");
/// ```
pub fn format_clock(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "--:--".to_string();
    }

    let is_negative = seconds < 0.0;
    let total = seconds.abs().trunc() as u64;
    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;

    let formatted = if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    };

    if is_negative {
        format!("-{}", formatted)
    } else {
        formatted
    }
}
