use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// True when the value is missing or only whitespace.
pub fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// Compare two strings case-insensitively without allocating.
pub fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Check whether `haystack` contains `needle`. The needle must already be lowercased.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Primary collation weight of a character in Swedish alphabetical order.
///
/// Whitespace and punctuation sort first, then digits, then `a`-`z`, then
/// `å`, `ä`, `ö`. Other accented Latin letters fold onto their base letter
/// (`ü` counts as `y`, `æ`/`ø` as `ä`/`ö`, as Swedish dictionaries do).
fn swedish_weight(c: char) -> u32 {
    let lower = c.to_lowercase().next().unwrap_or(c);
    let folded = match lower {
        'á' | 'à' | 'â' | 'ã' => 'a',
        'ç' => 'c',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ó' | 'ò' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'û' => 'u',
        'ü' | 'ý' | 'ÿ' => 'y',
        'æ' => 'ä',
        'ø' => 'ö',
        other => other,
    };
    match folded {
        c if c.is_whitespace() => 1,
        c if c.is_ascii_digit() => 10 + (c as u32 - '0' as u32),
        c if c.is_ascii_lowercase() => 100 + (c as u32 - 'a' as u32),
        'å' => 126,
        'ä' => 127,
        'ö' => 128,
        c if c.is_ascii_punctuation() => 2,
        c => 1000 + c as u32,
    }
}

/// Locale-aware comparison for Swedish names.
///
/// Ties on the collation weights fall back to a plain comparison so the
/// ordering is total.
pub fn cmp_swedish(a: &str, b: &str) -> Ordering {
    a.chars()
        .map(swedish_weight)
        .cmp(b.chars().map(swedish_weight))
        .then_with(|| a.cmp(b))
}

/// Parse the leading integer of a string.
///
/// Leading whitespace and a sign are accepted, and anything after the
/// digits is ignored, so `"123abc"` is 123 and `"abc"` is `None`.
pub fn parse_leading_int(value: &str) -> Option<i64> {
    let trimmed = value.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits: &str = {
        let end = rest
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        &rest[..end]
    };
    if digits.is_empty() {
        return None;
    }
    let magnitude: i64 = digits.parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Parse a timestamp as stored by the backend.
///
/// Accepts RFC 3339, Postgres' space-separated form, naive timestamps
/// (taken as UTC) and plain dates (midnight UTC). Anything else is `None`.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format a stored timestamp as `YYYY-MM-DD`, or "-" when missing or unparseable.
pub fn format_date(value: Option<&str>) -> String {
    value
        .and_then(parse_timestamp)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Format an E.164 Swedish mobile number for display, e.g. `070-123 45 67`.
pub fn format_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let national = match digits.strip_prefix("46") {
        Some(rest) if phone.trim_start().starts_with('+') => format!("0{}", rest),
        _ => digits.clone(),
    };

    match national.len() {
        10 if national.starts_with("07") => format!(
            "{}-{} {} {}",
            &national[0..3],
            &national[3..6],
            &national[6..8],
            &national[8..10]
        ),
        _ => phone.to_string(), // Return original if can't format
    }
}
