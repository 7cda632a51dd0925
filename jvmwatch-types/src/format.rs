//! Human-readable formatting for byte counts, pauses and ratios.

/// Binary unit suffixes, smallest first.
const BYTE_UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];

/// Format a byte count, e.g. `512 B`, `1.50 MiB`.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, BYTE_UNITS[unit])
    }
}

/// Format a signed byte rate, e.g. `+1.50 MiB/min`.
pub fn format_byte_rate(bytes_per_unit: f64, unit: &str) -> String {
    let sign = if bytes_per_unit < 0.0 { "-" } else { "+" };
    format!("{}{}/{}", sign, format_bytes(bytes_per_unit.abs() as u64), unit)
}

/// Format a pause duration given in milliseconds.
pub fn format_millis(ms: f64) -> String {
    if ms < 1.0 {
        format!("{:.0}µs", ms * 1_000.0)
    } else if ms < 1_000.0 {
        format!("{:.1}ms", ms)
    } else {
        format!("{:.2}s", ms / 1_000.0)
    }
}

/// Format a ratio in `0.0..=1.0` as a percentage.
pub fn format_percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(900 * 1024 * 1024), "900.00 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GiB");
    }

    #[test]
    fn test_format_byte_rate() {
        assert_eq!(format_byte_rate(2048.0, "s"), "+2.00 KiB/s");
        assert_eq!(format_byte_rate(-1024.0 * 1024.0, "min"), "-1.00 MiB/min");
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0.25), "250µs");
        assert_eq!(format_millis(12.34), "12.3ms");
        assert_eq!(format_millis(1500.0), "1.50s");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0.9), "90.0%");
        assert_eq!(format_percent(0.05), "5.0%");
    }
}
