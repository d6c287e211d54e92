use {
    chrono::Utc,
    std::time::Duration,
};

/// Converts a relative duration assumed from now to an absolute UNIX timestamp measured in
/// seconds.
///
/// Uses an [`i64`] instead of an [`u64`] due to SQL having no proper unsigned integer type.
#[must_use]
pub fn relative_to_absolute(duration: Duration) -> i64 {
    let now = Utc::now();
    let duration = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
    (now + duration).timestamp()
}

/// Whether a timepoint expired already, measured using the system time.
#[must_use]
pub fn timepoint_expired(timepoint: i64) -> bool {
    Utc::now().timestamp() > timepoint
}

/// Parses what an `<input type="date">` sends. Empty input means "not set".
pub fn parse_form_date(input: &str) -> Result<Option<chrono::NaiveDate>, chrono::ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    chrono::NaiveDate::parse_from_str(input, "%Y-%m-%d").map(Some)
}

/// Parses what an `<input type="datetime-local">` sends, with or without seconds.
pub fn parse_form_datetime(
    input: &str,
) -> Result<Option<chrono::NaiveDateTime>, chrono::ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    chrono::NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S"))
        .map(Some)
}

#[must_use]
pub fn format_date(date: chrono::NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

#[must_use]
pub fn format_datetime(datetime: chrono::NaiveDateTime) -> String {
    datetime.format("%d/%m/%Y %H:%M").to_string()
}

/// Formats a value back into what `<input type="datetime-local">` expects.
#[must_use]
pub fn to_form_datetime(datetime: chrono::NaiveDateTime) -> String {
    datetime.format("%Y-%m-%dT%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_dates() {
        assert_eq!(parse_form_date("").unwrap(), None);
        assert_eq!(
            parse_form_date("2024-06-01").unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 6, 1)
        );
        assert!(parse_form_date("01.06.2024").is_err());

        let with_seconds = parse_form_datetime("2024-06-01T08:30:15").unwrap().unwrap();
        let without = parse_form_datetime("2024-06-01T08:30").unwrap().unwrap();
        assert_eq!(to_form_datetime(with_seconds), to_form_datetime(without));
    }
}
