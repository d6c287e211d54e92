//! Field rules shared by every form of the application.
//!
//! Each rule returns the user-facing message on failure. Forms collect the messages into
//! [`FieldErrors`], keyed by the same name the HTML input carries, so templates can show them
//! right next to the offending input.

use std::{collections::BTreeMap, sync::OnceLock};

use regex::Regex;
use serde::Serialize;

/// Error messages per form field, keyed by the field's input name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of a rule for `field`. The first failure for a field wins.
    pub fn check(&mut self, field: impl Into<String>, outcome: Result<(), &'static str>) {
        if let Err(message) = outcome {
            self.add(field, message);
        }
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    /// Same as [`FieldErrors::check`], but hands out the parsed value for further use.
    pub fn parse<T>(
        &mut self,
        field: impl Into<String>,
        outcome: Result<T, &'static str>,
    ) -> Option<T> {
        match outcome {
            Ok(value) => Some(value),
            Err(message) => {
                self.add(field, message);
                None
            }
        }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Moves all errors of `other` into `self`, prefixing the field names.
    pub fn merge_prefixed(&mut self, prefix: &str, other: FieldErrors) {
        for (field, message) in other.0 {
            self.add(format!("{prefix}.{field}"), message);
        }
    }

    /// Turns a value into `Ok` if no errors were recorded.
    pub fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

pub fn required(value: &str) -> Result<(), &'static str> {
    if value.trim().is_empty() {
        Err("this field is required")
    } else {
        Ok(())
    }
}

fn char_count(value: &str) -> usize {
    value.trim().chars().count()
}

/// Person names need at least two characters.
pub fn name(value: &str) -> Result<(), &'static str> {
    required(value)?;
    if char_count(value) < 2 {
        Err("must be at least 2 characters")
    } else {
        Ok(())
    }
}

pub fn password(value: &str) -> Result<(), &'static str> {
    if value.chars().count() < 8 {
        Err("must be at least 8 characters")
    } else {
        Ok(())
    }
}

pub fn email(value: &str) -> Result<(), &'static str> {
    value
        .trim()
        .parse::<lettre::Address>()
        .map(|_| ())
        .map_err(|_| "must be a valid email address")
}

pub fn phone(value: &str) -> Result<(), &'static str> {
    required(value)?;
    if char_count(value) < 10 {
        Err("must be at least 10 characters")
    } else {
        Ok(())
    }
}

fn four_digits() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{4}$").expect("hardcoded pattern is valid"))
}

/// Accepts exactly four ASCII digits, nothing around them.
pub fn year(value: &str) -> Result<(), &'static str> {
    if four_digits().is_match(value) {
        Ok(())
    } else {
        Err("must be a 4-digit year")
    }
}

pub fn positive_distance(value: &str) -> Result<f64, &'static str> {
    let number = number(value)?.ok_or("this field is required")?;
    if number > 0.0 {
        Ok(number)
    } else {
        Err("distance must be positive")
    }
}

/// Parses an optional decimal number, empty input being [`None`].
pub fn number(value: &str) -> Result<Option<f64>, &'static str> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.replace(',', ".").parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(Some(number)),
        _ => Err("must be a number"),
    }
}

/// Parses an optional integer that may not be negative.
pub fn non_negative_integer(value: &str) -> Result<Option<i64>, &'static str> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<i64>() {
        Ok(number) if number >= 0 => Ok(Some(number)),
        Ok(_) => Err("must not be negative"),
        Err(_) => Err("must be a whole number"),
    }
}

pub fn latitude(value: &str) -> Result<Option<f64>, &'static str> {
    match number(value)? {
        Some(lat) if !(-90.0..=90.0).contains(&lat) => Err("latitude must be between -90 and 90"),
        lat => Ok(lat),
    }
}

pub fn longitude(value: &str) -> Result<Option<f64>, &'static str> {
    match number(value)? {
        Some(lon) if !(-180.0..=180.0).contains(&lon) => {
            Err("longitude must be between -180 and 180")
        }
        lon => Ok(lon),
    }
}

/// Turns empty input into [`None`], trimming everything else.
#[must_use]
pub fn optional_text(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_accepts_only_four_digits() {
        assert!(year("2022").is_ok());
        assert!(year("1987").is_ok());
        for invalid in ["202", "20203", "abcd", "", " 2022", "2022 ", "２０２２"] {
            assert!(year(invalid).is_err(), "{invalid:?} should be rejected");
        }
    }

    #[test]
    fn names_and_contacts() {
        assert!(name("Jo").is_ok());
        assert_eq!(name("J"), Err("must be at least 2 characters"));
        assert_eq!(name("   "), Err("this field is required"));
        assert!(password("hunter22").is_ok());
        assert!(password("short").is_err());
        assert!(email("jean@example.com").is_ok());
        assert!(email("jean.example.com").is_err());
        assert!(phone("0600000000").is_ok());
        assert!(phone("060000").is_err());
    }

    #[test]
    fn numbers() {
        assert_eq!(positive_distance("0"), Err("distance must be positive"));
        assert_eq!(positive_distance("-3"), Err("distance must be positive"));
        assert_eq!(positive_distance("12,5"), Ok(12.5));
        assert_eq!(positive_distance(""), Err("this field is required"));
        assert_eq!(positive_distance("far"), Err("must be a number"));
        assert_eq!(non_negative_integer("0"), Ok(Some(0)));
        assert_eq!(non_negative_integer("-1"), Err("must not be negative"));
        assert_eq!(non_negative_integer(""), Ok(None));
        assert_eq!(latitude("91"), Err("latitude must be between -90 and 90"));
        assert_eq!(longitude("-7.25"), Ok(Some(-7.25)));
    }

    #[test]
    fn first_error_per_field_wins() {
        let mut errors = FieldErrors::new();
        errors.check("name", Err("first"));
        errors.check("name", Err("second"));
        errors.check("location", Ok(()));
        assert_eq!(errors.get("name"), Some("first"));
        assert_eq!(errors.len(), 1);

        let mut outer = FieldErrors::new();
        outer.merge_prefixed("driver", errors);
        assert_eq!(outer.get("driver.name"), Some("first"));
    }
}
