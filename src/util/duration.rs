//! Utility helpers for representing durations in human-readable form.

use std::time::Duration;

/// Format a duration as a compact list of units (`1d 2h 3m 4.5s`, `850ms`).
///
/// Units that are zero are skipped; sub-second remainders are folded into the
/// seconds component with one trimmed decimal.
pub fn format_duration(duration: Duration) -> String {
    const UNITS: [(&str, u128); 3] = [("d", 86_400_000), ("h", 3_600_000), ("m", 60_000)];

    let total_ms = duration.as_millis();
    if total_ms < 1000 {
        return format!("{total_ms}ms");
    }

    let mut remaining = total_ms;
    let mut parts = Vec::with_capacity(4);

    for (suffix, unit_ms) in UNITS {
        let value = remaining / unit_ms;
        if value > 0 {
            parts.push(format!("{value}{suffix}"));
            remaining %= unit_ms;
        }
    }

    let whole = remaining / 1000;
    let tenths = (remaining % 1000) / 100;
    match (whole, tenths) {
        (0, 0) => {}
        (_, 0) => parts.push(format!("{whole}s")),
        _ => parts.push(format!("{whole}.{tenths}s")),
    }

    parts.join(" ")
}
