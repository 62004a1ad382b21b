//! Field-level validation helpers shared by the domain services.

use rust_decimal::Decimal;
use std::collections::HashMap;

/// Accumulates field errors so a request reports every problem at once.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValidationErrors {
    errors: HashMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        // First error for a field wins
        self.errors.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.errors
    }

    /// Ok when nothing was recorded, otherwise the collected errors
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn require_length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.trim().chars().count();
        if len < min {
            if min == 1 {
                self.add(field, "This field is required");
            } else {
                self.add(field, format!("Must be at least {} characters", min));
            }
        } else if value.chars().count() > max {
            self.add(field, format!("Must be at most {} characters", max));
        }
    }

    pub fn optional_length(&mut self, field: &str, value: Option<&str>, max: usize) {
        if let Some(v) = value {
            if v.chars().count() > max {
                self.add(field, format!("Must be at most {} characters", max));
            }
        }
    }

    /// Non-negative money with at most two decimal places
    pub fn money(&mut self, field: &str, value: Decimal, max: Decimal) {
        if value.is_sign_negative() && !value.is_zero() {
            self.add(field, "Must not be negative");
        } else if value.normalize().scale() > 2 {
            self.add(field, "Must have at most 2 decimal places");
        } else if value > max {
            self.add(field, format!("Must not exceed {}", max));
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut fields: Vec<_> = self.errors.iter().collect();
        fields.sort();
        let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// `#RRGGBB` colour used by tags and select options
pub fn is_hex_color(value: &str) -> bool {
    value.len() == 7 && value.starts_with('#') && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn collects_first_error_per_field() {
        let mut errors = ValidationErrors::new();
        errors.add("name", "required");
        errors.add("name", "too long");
        assert_eq!(errors.get("name"), Some("required"));
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn length_checks_trim_for_minimum() {
        let mut errors = ValidationErrors::new();
        errors.require_length("name", "   ", 1, 10);
        errors.require_length("title", "abcdefghijk", 1, 10);
        assert_eq!(errors.get("name"), Some("This field is required"));
        assert_eq!(errors.get("title"), Some("Must be at most 10 characters"));
    }

    #[test]
    fn money_rejects_negative_and_fractional_cents() {
        let max = Decimal::from_str("1000").unwrap();
        let mut errors = ValidationErrors::new();
        errors.money("a", Decimal::from_str("-1").unwrap(), max);
        errors.money("b", Decimal::from_str("1.005").unwrap(), max);
        errors.money("c", Decimal::from_str("1000.01").unwrap(), max);
        errors.money("d", Decimal::from_str("12.50").unwrap(), max);
        assert!(errors.contains("a"));
        assert!(errors.contains("b"));
        assert!(errors.contains("c"));
        assert!(!errors.contains("d"));
    }

    #[test]
    fn hex_colors() {
        assert!(is_hex_color("#1a2B3c"));
        assert!(!is_hex_color("1a2b3c"));
        assert!(!is_hex_color("#12345g"));
    }
}
