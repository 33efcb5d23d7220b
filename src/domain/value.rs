use std::fmt;

use serde::Serialize;
use serde_json::Value;

use super::field::FieldType;

/// A stored field value, tagged by the declared type it was coerced to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Decimal(f64),
    Timestamp(i64),
    Boolean(bool),
    Raw(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected} value, got {raw}")]
pub struct CoercionError {
    pub expected: String,
    pub raw: String,
}

impl CoercionError {
    fn new(expected: &FieldType, raw: &Value) -> Self {
        Self {
            expected: expected.as_str().to_string(),
            raw: raw.to_string(),
        }
    }
}

/// Coerces a raw JSON value to the stored representation for `field_type`.
///
/// `null` is accepted for every type and means "no value". Coercing an
/// already-coerced value yields the same value.
pub fn coerce(field_type: &FieldType, raw: &Value) -> Result<FieldValue, CoercionError> {
    if raw.is_null() {
        return Ok(FieldValue::Raw(Value::Null));
    }
    let err = || CoercionError::new(field_type, raw);
    match field_type {
        FieldType::String => match raw {
            Value::String(text) => Ok(FieldValue::Text(text.clone())),
            Value::Bool(_) | Value::Number(_) => Ok(FieldValue::Text(raw.to_string())),
            _ => Err(err()),
        },
        FieldType::Int => parse_integer(raw).map(FieldValue::Int).ok_or_else(err),
        FieldType::Date | FieldType::Datetime => {
            parse_integer(raw).map(FieldValue::Timestamp).ok_or_else(err)
        }
        FieldType::Decimal | FieldType::Currency => {
            parse_decimal(raw).map(FieldValue::Decimal).ok_or_else(err)
        }
        FieldType::Boolean => parse_boolean(raw).map(FieldValue::Boolean).ok_or_else(err),
        FieldType::ItemRelation | FieldType::Other(_) => Ok(FieldValue::Raw(raw.clone())),
    }
}

fn parse_integer(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(number) => {
            if let Some(value) = number.as_i64() {
                return Some(value);
            }
            let float = number.as_f64()?;
            if float.fract() == 0.0 && float >= i64::MIN as f64 && float < i64::MAX as f64 {
                Some(float as i64)
            } else {
                None
            }
        }
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn parse_decimal(raw: &Value) -> Option<f64> {
    let value = match raw {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

fn parse_boolean(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => {
            let text = text.trim();
            if text.eq_ignore_ascii_case("true") {
                Some(true)
            } else if text.eq_ignore_ascii_case("false") {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

impl FieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(text) => Value::String(text.clone()),
            FieldValue::Int(value) | FieldValue::Timestamp(value) => Value::from(*value),
            FieldValue::Decimal(value) => Value::from(*value),
            FieldValue::Boolean(flag) => Value::Bool(*flag),
            FieldValue::Raw(value) => value.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Raw(Value::Null))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Int(value) | FieldValue::Timestamp(value) => write!(f, "{value}"),
            FieldValue::Decimal(value) => write!(f, "{value}"),
            FieldValue::Boolean(flag) => write!(f, "{flag}"),
            FieldValue::Raw(Value::Null) => f.write_str("-"),
            FieldValue::Raw(value) => write!(f, "{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{coerce, FieldValue};
    use crate::domain::field::FieldType;

    #[test]
    fn coercion_matches_documented_examples() {
        assert_eq!(
            coerce(&FieldType::Boolean, &json!("true")),
            Ok(FieldValue::Boolean(true))
        );
        assert_eq!(
            coerce(&FieldType::Date, &json!("1700000000")),
            Ok(FieldValue::Timestamp(1_700_000_000))
        );
        assert_eq!(
            coerce(&FieldType::Decimal, &json!("12.50")),
            Ok(FieldValue::Decimal(12.5))
        );
        assert_eq!(
            coerce(&FieldType::Currency, &json!(" 3 ")),
            Ok(FieldValue::Decimal(3.0))
        );
    }

    #[test]
    fn int_coercion_is_integral_on_every_path() {
        assert_eq!(coerce(&FieldType::Int, &json!(7)), Ok(FieldValue::Int(7)));
        assert_eq!(coerce(&FieldType::Int, &json!(7.0)), Ok(FieldValue::Int(7)));
        assert_eq!(coerce(&FieldType::Int, &json!("-12")), Ok(FieldValue::Int(-12)));
        assert!(coerce(&FieldType::Int, &json!(7.5)).is_err());
        assert!(coerce(&FieldType::Int, &json!("7.5")).is_err());
        assert!(coerce(&FieldType::Int, &json!(true)).is_err());
    }

    #[test]
    fn decimal_rejects_locale_separators_and_non_finite_values() {
        assert!(coerce(&FieldType::Decimal, &json!("12,50")).is_err());
        assert!(coerce(&FieldType::Decimal, &json!("NaN")).is_err());
        assert!(coerce(&FieldType::Decimal, &json!("inf")).is_err());
        assert!(coerce(&FieldType::Decimal, &json!([1])).is_err());
    }

    #[test]
    fn boolean_and_string_edge_cases() {
        assert_eq!(
            coerce(&FieldType::Boolean, &json!(" FALSE ")),
            Ok(FieldValue::Boolean(false))
        );
        assert!(coerce(&FieldType::Boolean, &json!("yes")).is_err());
        assert!(coerce(&FieldType::Boolean, &json!(1)).is_err());
        assert_eq!(
            coerce(&FieldType::String, &json!(42)),
            Ok(FieldValue::Text("42".to_string()))
        );
        assert!(coerce(&FieldType::String, &json!({"a": 1})).is_err());
    }

    #[test]
    fn null_and_unknown_types_pass_through() {
        assert!(coerce(&FieldType::Int, &json!(null))
            .expect("null should be accepted")
            .is_empty());
        let other = FieldType::Other("geo".to_string());
        assert_eq!(
            coerce(&other, &json!({"lat": 1})),
            Ok(FieldValue::Raw(json!({"lat": 1})))
        );
    }

    #[test]
    fn coercion_is_idempotent_on_stored_values() {
        let cases = [
            (FieldType::String, json!("Acme")),
            (FieldType::Int, json!("10")),
            (FieldType::Decimal, json!("12.50")),
            (FieldType::Date, json!("1700000000")),
            (FieldType::Boolean, json!("True")),
        ];
        for (field_type, raw) in cases {
            let first = coerce(&field_type, &raw).expect("first coercion should succeed");
            let second =
                coerce(&field_type, &first.to_json()).expect("second coercion should succeed");
            assert_eq!(first, second);
        }
    }
}
