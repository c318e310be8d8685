//! Presence and length checks on SMS request fields.

use std::ops::RangeInclusive;

use serde::Deserialize;

const NUMBER_LEN: RangeInclusive<usize> = 6..=16;
const TEXT_LEN: RangeInclusive<usize> = 1..=120;

/// Form body of both SMS endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmsRequest {
    pub from: Option<String>,
    pub to: Option<String>,
    pub text: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Fields that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsFields<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub text: &'a str,
}

impl SmsRequest {
    /// First missing field, then first out-of-bounds field, in the order
    /// `from`, `to`, `text`.
    pub fn validate(&self) -> Result<SmsFields<'_>, String> {
        let from = required("from", &self.from)?;
        let to = required("to", &self.to)?;
        let text = required("text", &self.text)?;

        for (name, value, bounds) in [
            ("from", from, &NUMBER_LEN),
            ("to", to, &NUMBER_LEN),
            ("text", text, &TEXT_LEN),
        ] {
            if !bounds.contains(&value.chars().count()) {
                return Err(format!("parameter '{name}' is invalid"));
            }
        }

        Ok(SmsFields { from, to, text })
    }
}

fn required<'a>(name: &str, value: &'a Option<String>) -> Result<&'a str, String> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(format!("parameter '{name}' is missing")),
    }
}
