//! Expiry shorthand accepted by the operator surface: `Nh`, `Nd`, `Nw`,
//! `Ny`, or the literal `never`.

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};

/// Resolves a shorthand against `now`. `never` maps to `None`.
pub fn parse_expiry(raw: &str, now: DateTime<Utc>) -> anyhow::Result<Option<DateTime<Utc>>> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("never") {
        return Ok(None);
    }

    let (number, unit) = raw.split_at(raw.len().saturating_sub(1));
    let count: i64 = number
        .parse()
        .map_err(|_| anyhow!("Invalid expiry '{}': expected <N>h|d|w|y or 'never'", raw))?;
    if count <= 0 {
        return Err(anyhow!("Invalid expiry '{}': duration must be positive", raw));
    }

    let duration = match unit {
        "h" => Duration::hours(count),
        "d" => Duration::days(count),
        "w" => Duration::weeks(count),
        "y" => Duration::days(count * 365),
        _ => {
            return Err(anyhow!(
                "Invalid expiry '{}': expected <N>h|d|w|y or 'never'",
                raw
            ))
        }
    };

    Ok(Some(now + duration))
}
