use chrono::Duration;

/// Render a signed duration with microsecond precision, e.g. `12.345ms` or `-0.120ms`.
pub fn format_delta(delta: Duration) -> String {
    let micros = delta.num_microseconds().unwrap_or(i64::MAX);
    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    format!("{}{}.{:03}ms", sign, abs / 1000, abs % 1000)
}

pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let mins = ms / 60_000;
        let secs = (ms % 60_000) / 1000;
        format!("{}m {}s", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_delta_positive() {
        assert_eq!(format_delta(Duration::microseconds(12_345)), "12.345ms");
    }

    #[test]
    fn test_format_delta_negative() {
        assert_eq!(format_delta(Duration::microseconds(-120)), "-0.120ms");
    }

    #[test]
    fn test_format_delta_zero() {
        assert_eq!(format_delta(Duration::zero()), "0.000ms");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(250), "250ms");
        assert_eq!(format_duration(1500), "1.5s");
        assert_eq!(format_duration(61_000), "1m 1s");
    }
}
