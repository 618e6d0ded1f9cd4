//! Duration parsing utilities.
//!
//! Protocol timers in the inventory may be written as bare seconds (`30`) or
//! with a unit suffix (`30s`, `2m`, `1h`).

/// Parse a duration string (e.g., "10s", "2m", "1h", "30") to seconds
///
/// # Examples
/// ```
/// use dn42gen::utils::duration::parse_duration_to_seconds;
///
/// assert_eq!(parse_duration_to_seconds("30"), Ok(30));
/// assert_eq!(parse_duration_to_seconds("2m"), Ok(120));
/// assert!(parse_duration_to_seconds("soon").is_err());
/// ```
pub fn parse_duration_to_seconds(duration: &str) -> Result<u64, String> {
    let duration = duration.trim();
    let split = duration
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(duration.len());
    let (number, unit) = duration.split_at(split);

    let value = number
        .parse::<u64>()
        .map_err(|_| format!("Invalid duration format: {}", duration))?;

    let multiplier = match unit.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600,
        _ => return Err(format!("Invalid duration format: {}", duration)),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Duration out of range: {}", duration))
}
