use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::reservation::BookingError;

pub const MAX_CLIENT_NAME_LEN: usize = 100;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("regex compiles")
});

// dotless domains are only accepted for localhost
static LOCALHOST_EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@localhost$").expect("regex compiles")
});

pub fn validate_client_name(value: &str) -> Result<&str, BookingError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BookingError::InvalidInput("client_name must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_CLIENT_NAME_LEN {
        return Err(BookingError::InvalidInput(format!(
            "client_name must be at most {MAX_CLIENT_NAME_LEN} characters"
        )));
    }
    Ok(trimmed)
}

pub fn validate_email(value: &str) -> Result<&str, BookingError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BookingError::InvalidInput(
            "client_email must not be empty".into(),
        ));
    }
    let local_part = trimmed.split('@').next().unwrap_or_default();
    let bad_dots =
        local_part.starts_with('.') || local_part.ends_with('.') || local_part.contains("..");
    let well_formed = EMAIL_REGEX.is_match(trimmed) || LOCALHOST_EMAIL_REGEX.is_match(trimmed);
    if bad_dots || !well_formed {
        return Err(BookingError::InvalidInput(
            "Enter a valid email address".into(),
        ));
    }
    Ok(trimmed)
}

/// Lookups only require presence; the format is not checked.
pub fn require_email(value: Option<&str>) -> Result<&str, BookingError> {
    match value.map(str::trim) {
        Some(email) if !email.is_empty() => Ok(email),
        _ => Err(BookingError::InvalidInput(
            "Email parameter is required".into(),
        )),
    }
}

/// Unknown zone names are ignored rather than rejected.
pub fn parse_timezone_hint(value: Option<&str>) -> Option<Tz> {
    value.and_then(|name| name.trim().parse::<Tz>().ok())
}
