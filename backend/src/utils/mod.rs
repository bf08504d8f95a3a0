//! # Utilities Module
//!
//! This module contains helper functions and utilities used
//! across the backend service.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Format a gold quantity as human-readable grams.
///
/// Rounds to two decimal places and groups thousands.
///
/// ## Examples
///
/// ```rust,ignore
/// assert_eq!(format_grams(dec!(15)), "15.00 gm");
/// assert_eq!(format_grams(dec!(1234.567)), "1,234.57 gm");
/// ```
pub fn format_grams(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let negative = rounded < Decimal::ZERO;
    let text = format!("{:.2}", rounded.abs());

    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    // Add commas
    let mut grouped = String::new();
    for (i, c) in whole.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let whole: String = grouped.chars().rev().collect();

    format!("{}{}.{} gm", if negative { "-" } else { "" }, whole, frac)
}

/// Parse a path id.
///
/// ## Returns
///
/// * `Ok(Uuid)` - Valid id
/// * `Err(String)` - Message naming the bad value
pub fn parse_id(raw: &str) -> Result<Uuid, String> {
    Uuid::parse_str(raw.trim()).map_err(|_| format!("Invalid id: {}", raw))
}

/// Normalize an email for storage and lookup: trimmed and lower-cased.
///
/// Returns an error for an empty value or one without a local part and
/// a domain around a single `@`.
pub fn normalize_email(raw: &str) -> Result<String, String> {
    let email = raw.trim().to_lowercase();

    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email)
        }
        _ => Err(format!("Invalid email: {}", raw.trim())),
    }
}

/// Format a timestamp as ISO 8601 with second precision.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Trim an optional text field, treating blank as absent.
pub fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
