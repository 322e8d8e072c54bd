//! Position tokens: `[+|-][[hours:]minutes:]seconds`
//!
//! A leading sign marks the position as relative; the sign also applies to
//! the value. Unsigned tokens are absolute.

use crate::error::{PlaybackError, Result};
use crate::types::{Nanos, SECOND};

/// A parsed position token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionToken {
    /// Token had a leading `+` or `-`
    pub relative: bool,

    /// Signed position in nanoseconds
    pub nanos: Nanos,
}

/// Parse a position token into nanoseconds
pub fn parse_position(raw: &str) -> Result<PositionToken> {
    let invalid = || PlaybackError::InvalidPosition(raw.to_string());

    let (relative, sign, digits) = if let Some(rest) = raw.strip_prefix('-') {
        (true, -1, rest)
    } else if let Some(rest) = raw.strip_prefix('+') {
        (true, 1, rest)
    } else {
        (false, 1, raw)
    };

    if !digits.chars().all(|c| c.is_ascii_digit() || c == ':') {
        return Err(invalid());
    }

    let parts: Vec<&str> = digits.split(':').collect();
    if parts.len() > 3 || parts.iter().any(|part| part.is_empty()) {
        return Err(invalid());
    }

    let mut seconds: Nanos = 0;
    for part in &parts {
        let value: Nanos = part.parse().map_err(|_| invalid())?;
        seconds = seconds
            .checked_mul(60)
            .and_then(|s| s.checked_add(value))
            .ok_or_else(invalid)?;
    }

    let nanos = seconds
        .checked_mul(SECOND)
        .map(|n| n * sign)
        .ok_or_else(invalid)?;

    Ok(PositionToken { relative, nanos })
}

/// Render nanoseconds as `[-]H:MM:SS`, truncating to whole seconds
pub fn format_position(nanos: Nanos) -> String {
    let sign = if nanos < 0 { "-" } else { "" };
    let total = (nanos / SECOND).unsigned_abs();
    format!(
        "{}{}:{:02}:{:02}",
        sign,
        total / 3600,
        (total / 60) % 60,
        total % 60
    )
}
