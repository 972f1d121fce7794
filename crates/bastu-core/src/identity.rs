//! Swedish personal identity numbers (personnummer).
//!
//! Only the date part is interpreted; the check digit is not validated
//! because the backend owns the records and this crate never rejects them.

use chrono::{Datelike, NaiveDate};

/// Two-digit years at or above this pivot are read as 19xx, below as 20xx.
const CENTURY_PIVOT: i32 = 30;

/// Coordination numbers (samordningsnummer) add this to the day of birth.
const COORDINATION_DAY_OFFSET: u32 = 60;

/// Extract the date of birth from a personal identity number.
///
/// Accepts `YYYYMMDD-NNNN`, `YYMMDD-NNNN`, `YYMMDD+NNNN` and the same
/// forms without separator. Returns `None` for anything it cannot read.
pub fn birth_date(pnr: &str) -> Option<NaiveDate> {
    let compact: String = pnr.chars().filter(|c| !c.is_whitespace()).collect();
    let date_part = compact.split(['-', '+']).next().unwrap_or("");
    if !date_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let date_digits = match date_part.len() {
        12 => &date_part[..8],
        10 => &date_part[..6],
        8 | 6 => date_part,
        _ => return None,
    };

    let (year, rest) = if date_digits.len() == 8 {
        (date_digits[..4].parse::<i32>().ok()?, &date_digits[4..])
    } else {
        let yy = date_digits[..2].parse::<i32>().ok()?;
        let century = if yy >= CENTURY_PIVOT { 1900 } else { 2000 };
        (century + yy, &date_digits[2..])
    };

    let month = rest[..2].parse::<u32>().ok()?;
    let mut day = rest[2..4].parse::<u32>().ok()?;
    if day > COORDINATION_DAY_OFFSET {
        day -= COORDINATION_DAY_OFFSET;
    }

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Age in whole years on `today`, borrowing a year if the birthday has not
/// yet occurred this year.
pub fn age_on(pnr: &str, today: NaiveDate) -> Option<i32> {
    let born = birth_date(pnr)?;
    let mut age = today.year() - born.year();
    if (today.month(), today.day()) < (born.month(), born.day()) {
        age -= 1;
    }
    Some(age)
}
