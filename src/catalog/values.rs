use chrono::{DateTime, NaiveDate};
use serde_json::{Number, Value};
use std::collections::HashSet;
use uuid::Uuid;

use super::{PropertyDefinition, PropertyType};

const TITLE_MAX: usize = 255;
const TEXT_MAX: usize = 10_000;
const EMAIL_MAX: usize = 254;

/// Check a single record value against its column definition.
/// Returns a client-facing message on failure.
pub fn validate_value(def: &PropertyDefinition, value: &Value) -> Result<(), String> {
    if def.property_type.is_read_only() {
        return Err("Property is read-only".to_string());
    }
    if value.is_null() {
        return if def.required { Err("This property is required".to_string()) } else { Ok(()) };
    }

    match def.property_type {
        PropertyType::Title => {
            let s = expect_str(value)?;
            if def.required && s.trim().is_empty() {
                return Err("This property is required".to_string());
            }
            check_len(s, def.options.max_length.unwrap_or(TITLE_MAX))
        }
        PropertyType::Text => check_len(expect_str(value)?, def.options.max_length.unwrap_or(TEXT_MAX)),
        PropertyType::Number => match value {
            Value::Number(_) => Ok(()),
            _ => Err("Expected a number".to_string()),
        },
        PropertyType::Checkbox => match value {
            Value::Bool(_) => Ok(()),
            _ => Err("Expected true or false".to_string()),
        },
        PropertyType::Date => {
            let s = expect_str(value)?;
            if parse_date(s) {
                Ok(())
            } else {
                Err("Expected a date (YYYY-MM-DD) or RFC 3339 timestamp".to_string())
            }
        }
        PropertyType::Select => {
            let s = expect_str(value)?;
            if def.has_choice(s) {
                Ok(())
            } else {
                Err(format!("'{}' is not an option of this property", s))
            }
        }
        PropertyType::MultiSelect => {
            let items = expect_str_list(value)?;
            let mut seen = HashSet::new();
            for item in items {
                if !def.has_choice(item) {
                    return Err(format!("'{}' is not an option of this property", item));
                }
                if !seen.insert(item) {
                    return Err(format!("'{}' is selected more than once", item));
                }
            }
            Ok(())
        }
        PropertyType::Person => {
            for subject in expect_str_list(value)? {
                if subject.trim().is_empty() || subject.len() > 255 {
                    return Err("Person entries must be non-empty user ids".to_string());
                }
            }
            Ok(())
        }
        PropertyType::Url => {
            let s = expect_str(value)?;
            match url::Url::parse(s) {
                Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Ok(()),
                _ => Err("Expected an http(s) URL".to_string()),
            }
        }
        PropertyType::Email => {
            let s = expect_str(value)?;
            if is_email(s) {
                Ok(())
            } else {
                Err("Expected an email address".to_string())
            }
        }
        PropertyType::Phone => {
            let s = expect_str(value)?;
            if is_phone(s) {
                Ok(())
            } else {
                Err("Expected a phone number".to_string())
            }
        }
        PropertyType::File | PropertyType::Relation => {
            for id in expect_str_list(value)? {
                Uuid::parse_str(id).map_err(|_| format!("'{}' is not a valid id", id))?;
            }
            Ok(())
        }
        PropertyType::CreatedTime | PropertyType::UpdatedTime | PropertyType::CreatedBy => {
            Err("Property is read-only".to_string())
        }
    }
}

/// Rewrite a stored value for a column whose type changed to `target.property_type`.
/// Values that cannot be represented in the new type become `null`.
pub fn convert_value(target: &PropertyDefinition, value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    let candidate = match target.property_type {
        PropertyType::Title | PropertyType::Text | PropertyType::Url | PropertyType::Email | PropertyType::Phone => {
            stringify(value).map(Value::String)
        }
        PropertyType::Date => value.as_str().map(|s| Value::String(s.to_string())),
        PropertyType::Number => match value {
            Value::Number(_) => Some(value.clone()),
            Value::String(s) => s.trim().parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number),
            _ => None,
        },
        PropertyType::Checkbox => match value {
            Value::Bool(_) => Some(value.clone()),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(Value::Bool(true)),
                "false" | "no" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        PropertyType::Select => match value {
            Value::String(s) => Some(Value::String(s.clone())),
            Value::Array(items) => items.first().cloned(),
            _ => None,
        },
        PropertyType::MultiSelect => match value {
            Value::String(s) => Some(Value::Array(vec![Value::String(s.clone())])),
            Value::Array(_) => Some(value.clone()),
            _ => None,
        },
        _ => match value {
            Value::Array(_) => Some(value.clone()),
            _ => None,
        },
    };

    match candidate {
        Some(v) if validate_value(&PropertyDefinition { required: false, ..target.clone() }, &v).is_ok() => v,
        _ => Value::Null,
    }
}

fn expect_str(value: &Value) -> Result<&str, String> {
    value.as_str().ok_or_else(|| "Expected a string".to_string())
}

fn expect_str_list(value: &Value) -> Result<Vec<&str>, String> {
    let items = value.as_array().ok_or_else(|| "Expected an array".to_string())?;
    items
        .iter()
        .map(|v| v.as_str().ok_or_else(|| "Expected an array of strings".to_string()))
        .collect()
}

fn check_len(s: &str, max: usize) -> Result<(), String> {
    if s.chars().count() > max {
        Err(format!("Must be at most {} characters", max))
    } else {
        Ok(())
    }
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(stringify).collect();
            Some(parts.join(", "))
        }
        _ => None,
    }
}

fn parse_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() || DateTime::parse_from_rfc3339(s).is_ok()
}

fn is_email(s: &str) -> bool {
    if s.len() > EMAIL_MAX || s.chars().any(char::is_whitespace) {
        return false;
    }
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

fn is_phone(s: &str) -> bool {
    let len = s.chars().count();
    let digits = s.chars().filter(|c| c.is_ascii_digit()).count();
    (3..=32).contains(&len)
        && digits >= 3
        && s.chars().all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PropertyOptions, SelectOption};
    use serde_json::json;

    fn select(id: &str, kind: PropertyType) -> PropertyDefinition {
        let mut def = PropertyDefinition::new(id, id, kind);
        def.options = PropertyOptions {
            choices: vec![
                SelectOption { id: "open".into(), name: "Open".into(), color: None },
                SelectOption { id: "closed".into(), name: "Closed".into(), color: None },
            ],
            ..Default::default()
        };
        def
    }

    #[test]
    fn null_respects_required() {
        let mut def = PropertyDefinition::new("n", "Notes", PropertyType::Text);
        assert!(validate_value(&def, &Value::Null).is_ok());
        def.required = true;
        assert!(validate_value(&def, &Value::Null).is_err());
    }

    #[test]
    fn select_values_must_be_choices() {
        let def = select("status", PropertyType::Select);
        assert!(validate_value(&def, &json!("open")).is_ok());
        assert!(validate_value(&def, &json!("pending")).is_err());

        let multi = select("labels", PropertyType::MultiSelect);
        assert!(validate_value(&multi, &json!(["open", "closed"])).is_ok());
        assert!(validate_value(&multi, &json!(["open", "open"])).is_err());
        assert!(validate_value(&multi, &json!("open")).is_err());
    }

    #[test]
    fn scalar_shapes() {
        let number = PropertyDefinition::new("fee", "Fee", PropertyType::Number);
        assert!(validate_value(&number, &json!(12.5)).is_ok());
        assert!(validate_value(&number, &json!("12.5")).is_err());

        let date = PropertyDefinition::new("due", "Due", PropertyType::Date);
        assert!(validate_value(&date, &json!("2024-02-29")).is_ok());
        assert!(validate_value(&date, &json!("2024-02-30")).is_err());
        assert!(validate_value(&date, &json!("2024-03-01T10:00:00Z")).is_ok());

        let url = PropertyDefinition::new("site", "Site", PropertyType::Url);
        assert!(validate_value(&url, &json!("https://example.com/a")).is_ok());
        assert!(validate_value(&url, &json!("ftp://example.com")).is_err());

        let email = PropertyDefinition::new("mail", "Mail", PropertyType::Email);
        assert!(validate_value(&email, &json!("a@firm.example")).is_ok());
        assert!(validate_value(&email, &json!("a@firm")).is_err());

        let phone = PropertyDefinition::new("tel", "Tel", PropertyType::Phone);
        assert!(validate_value(&phone, &json!("+81 (3) 1234-5678")).is_ok());
        assert!(validate_value(&phone, &json!("call me")).is_err());
    }

    #[test]
    fn read_only_types_reject_writes() {
        let def = PropertyDefinition::new("created", "Created", PropertyType::CreatedTime);
        assert!(validate_value(&def, &json!("2024-01-01")).is_err());
    }

    #[test]
    fn conversion_keeps_compatible_values() {
        let to_multi = select("labels", PropertyType::MultiSelect);
        assert_eq!(convert_value(&to_multi, &json!("open")), json!(["open"]));

        let to_number = PropertyDefinition::new("fee", "Fee", PropertyType::Number);
        assert_eq!(convert_value(&to_number, &json!(" 42 ")), json!(42.0));
        assert_eq!(convert_value(&to_number, &json!("n/a")), Value::Null);

        let to_text = PropertyDefinition::new("t", "T", PropertyType::Text);
        assert_eq!(convert_value(&to_text, &json!(["a", "b"])), json!("a, b"));
        assert_eq!(convert_value(&to_text, &json!(true)), json!("true"));

        let to_email = PropertyDefinition::new("e", "E", PropertyType::Email);
        assert_eq!(convert_value(&to_email, &json!("not an email")), Value::Null);
    }
}
