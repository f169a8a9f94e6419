//! Time and serial helpers for the reformatter.

use jiff::Timestamp;

/// Render seconds in the shortest exact unit form.
///
/// Exact multiples of a week, day, hour or minute use the `W`/`D`/`H`/`M`
/// suffixes (largest unit first); anything else stays decimal seconds.
pub fn seconds_to_human(secs: u32) -> String {
    if secs == 0 {
        return "0".into();
    }
    for (unit_secs, suffix) in [(604_800, 'W'), (86_400, 'D'), (3_600, 'H'), (60, 'M')] {
        if secs % unit_secs == 0 {
            return format!("{}{}", secs / unit_secs, suffix);
        }
    }
    secs.to_string()
}

/// Re-render a duration token (decimal seconds or unit-suffixed) in the
/// shortest unit form.  Unparseable tokens pass through unchanged.
pub fn humanize_duration(token: &str) -> String {
    match zonewright_zonefile::parse_ttl(token) {
        Some(secs) => seconds_to_human(secs),
        None => token.to_string(),
    }
}

/// Interpret a serial as a Unix timestamp and render it as a UTC date.
///
/// Only serials that are exactly ten decimal digits and fit in an unsigned
/// 32-bit integer qualify; anything else yields `None`.
pub fn serial_to_human_date(serial: &str) -> Option<String> {
    if serial.len() != 10 || !serial.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs: u32 = serial.parse().ok()?;
    let ts = Timestamp::from_second(i64::from(secs)).ok()?;
    Some(ts.strftime("%a, %d %b %Y %H:%M:%S UTC").to_string())
}

/// Bump a SOA serial.
///
/// Serials at or below the current Unix time become the current Unix time
/// (the epoch-seconds serial scheme); anything later is incremented by one.
/// Non-numeric serials pass through unchanged.
pub fn increase_serial(serial: &str) -> String {
    let now = Timestamp::now().as_second();
    match serial.parse::<u64>() {
        Ok(n) => match i64::try_from(n) {
            Ok(signed) if signed <= now => now.to_string(),
            _ => n.saturating_add(1).to_string(),
        },
        Err(_) => serial.to_string(),
    }
}
