use chrono::NaiveDate;

use crate::models::Field;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please provide a value.")]
    Empty,

    #[error("Invalid date format. Please enter date as YYYY-MM-DD.")]
    Date,

    #[error("Please enter a valid positive number.")]
    PositiveNumber,

    #[error("Please enter a valid email address.")]
    Email,
}

/// Checks a raw value for `field` and returns its normalized form.
pub fn validate_field(field: Field, raw: &str) -> Result<String, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty);
    }

    match field {
        Field::Date => validate_date(value).map(|d| d.format("%Y-%m-%d").to_string()),
        Field::NumberOfPeople => validate_party_size(value).map(|n| n.to_string()),
        Field::ContactEmail => validate_email(value).map(str::to_string),
        _ => Ok(value.to_string()),
    }
}

pub fn validate_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ValidationError::Date)
}

pub fn validate_party_size(value: &str) -> Result<u32, ValidationError> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ValidationError::PositiveNumber),
    }
}

/// Requires an `@` followed by a domain containing a `.` separator.
pub fn validate_email(value: &str) -> Result<&str, ValidationError> {
    let value = value.trim();
    let valid = value
        .split_once('@')
        .map(|(local, domain)| {
            !local.is_empty()
                && domain
                    .split_once('.')
                    .map(|(host, tld)| !host.is_empty() && !tld.is_empty())
                    .unwrap_or(false)
        })
        .unwrap_or(false);

    if valid && !value.contains(char::is_whitespace) {
        Ok(value)
    } else {
        Err(ValidationError::Email)
    }
}
