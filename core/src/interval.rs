//! Logarithmic PTP/NTP interval scaling, recovered from `original_source`
//! (`ptp.cpp` / `clock_event.cpp`), where intervals are stored as a
//! logarithmic exponent `n` and expected to be expanded to microseconds
//! by the reader as `2^n * 1_000_000`.

/// Default poll cadence used whenever a source reports a non-positive
/// interval (spec.md §4.6's "falling back to a 1 s default").
pub const DEFAULT_POLL_INTERVAL_US: i64 = 1_000_000;

/// Convert a logarithmic interval exponent into microseconds.
///
/// Clamps rather than overflows at the extremes of `i8`: values of `n`
/// large enough to overflow `i64` saturate to `i64::MAX`, and `n` small
/// enough to underflow to zero microseconds instead fall back to the
/// default poll cadence (a zero or negative interval is not actionable).
pub fn log_interval_to_micros(n: i8) -> i64 {
    if n >= 63 {
        return i64::MAX;
    }
    if n <= -21 {
        // 2^-21 * 1e6 < 1us; nothing meaningful survives truncation.
        return DEFAULT_POLL_INTERVAL_US;
    }
    let scaled = if n >= 0 {
        1_000_000i64.checked_shl(n as u32)
    } else {
        Some(1_000_000i64 >> (-n as u32))
    };
    match scaled {
        Some(v) if v > 0 => v,
        Some(_) | None => DEFAULT_POLL_INTERVAL_US,
    }
}
