use jiff::{
    civil::{Date, DateTime},
    tz::TimeZone,
    Timestamp,
};

/// Formats tried, in order, after the ISO 8601 variants.
const FALLBACK_FORMATS: [&str; 4] = [
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Parse a datetime string without knowing its format in advance.
///
/// Values with an offset (`2021-01-01T00:30:10Z`, `...-05:00`) are converted
/// to UTC.  Civil datetimes (`2021-01-01 00:30:10`, `2021-01-01T00:30:10.250`)
/// are taken as they are and a bare date means midnight.
pub fn parse_datetime(s: &str) -> Option<DateTime> {
    let s = s.trim();
    if let Ok(ts) = s.parse::<Timestamp>() {
        return Some(ts.to_zoned(TimeZone::UTC).datetime());
    }
    if let Ok(dt) = s.parse::<DateTime>() {
        return Some(dt);
    }
    if let Ok(date) = s.parse::<Date>() {
        return Some(date.at(0, 0, 0, 0));
    }
    FALLBACK_FORMATS
        .iter()
        .find_map(|fmt| DateTime::strptime(fmt, s).ok())
}
