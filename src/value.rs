//! Wire value model shared by the JSON-RPC and XML-RPC codecs.

use std::collections::BTreeMap;

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Number, Value};

use crate::errors::EncodeError;

pub type Struct = BTreeMap<String, RpcValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum RpcValue {
    Nil,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<RpcValue>),
    Struct(Struct),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Binary(Vec<u8>),
    Decimal(BigDecimal),
}

impl RpcValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Struct(_) => "struct",
            Self::DateTime(_) => "datetime",
            Self::Date(_) => "date",
            Self::Binary(_) => "binary",
            Self::Decimal(_) => "decimal",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RpcValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Builds a struct from `(key, value)` pairs.
    pub fn structure<K, I>(members: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, RpcValue)>,
    {
        Self::Struct(
            members
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    /// Converts to JSON for the natively representable kinds only.
    ///
    /// Datetimes, dates, binary and decimals other than unsigned integers
    /// have no JSON form and are reported through [`EncodeError::Unsupported`] so that a
    /// [`crate::protocol::jsonrpc::JsonEncoder`] may handle them.
    pub fn to_json_with<F>(&self, fallback: &F) -> Result<Value, EncodeError>
    where
        F: Fn(&RpcValue) -> Result<Value, EncodeError> + ?Sized,
    {
        Ok(match self {
            Self::Nil => Value::Null,
            Self::Bool(value) => Value::Bool(*value),
            Self::Int(value) => Value::Number((*value).into()),
            Self::Double(value) => {
                Value::Number(Number::from_f64(*value).ok_or(EncodeError::NonFinite)?)
            }
            Self::String(value) => Value::String(value.clone()),
            Self::Decimal(decimal) if decimal.is_integer() => match decimal.to_u64() {
                Some(unsigned) => Value::Number(unsigned.into()),
                None => fallback(self)?,
            },
            Self::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.to_json_with(fallback))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Struct(members) => Value::Object(
                members
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), item.to_json_with(fallback)?)))
                    .collect::<Result<_, EncodeError>>()?,
            ),
            other => fallback(other)?,
        })
    }
}

impl From<Value> for RpcValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Nil,
            Value::Bool(value) => Self::Bool(value),
            Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Self::Int(int)
                } else if let Some(unsigned) = number.as_u64() {
                    Self::Decimal(BigDecimal::from(unsigned))
                } else {
                    Self::Double(number.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(value) => Self::String(value),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Struct(
                map.into_iter()
                    .map(|(key, item)| (key, Self::from(item)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for RpcValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for RpcValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for RpcValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for RpcValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for RpcValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for RpcValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<RpcValue>> From<Vec<T>> for RpcValue {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<NaiveDateTime> for RpcValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<NaiveDate> for RpcValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<BigDecimal> for RpcValue {
    fn from(value: BigDecimal) -> Self {
        Self::Decimal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reject(value: &RpcValue) -> Result<Value, EncodeError> {
        Err(EncodeError::Unsupported(value.kind()))
    }

    #[test]
    fn json_numbers_keep_integers_apart_from_doubles() {
        let value = RpcValue::from(json!([1, 2.5, -7]));
        assert_eq!(
            value,
            RpcValue::Array(vec![
                RpcValue::Int(1),
                RpcValue::Double(2.5),
                RpcValue::Int(-7)
            ])
        );
    }

    #[test]
    fn integers_beyond_i64_stay_exact() {
        let value = RpcValue::from(json!(18_446_744_073_709_551_615_u64));
        assert_eq!(
            value,
            RpcValue::Decimal(BigDecimal::from(18_446_744_073_709_551_615_u64))
        );
        assert_eq!(
            value.to_json_with(&reject),
            Ok(json!(18_446_744_073_709_551_615_u64))
        );
    }

    #[test]
    fn fractional_decimals_defer_to_fallback() {
        let value = RpcValue::Decimal(BigDecimal::new(110.into(), 2));
        assert_eq!(
            value.to_json_with(&reject),
            Err(EncodeError::Unsupported("decimal"))
        );
    }

    #[test]
    fn nested_structs_convert_back_to_json() {
        let value = RpcValue::structure([
            ("name", RpcValue::from("add")),
            ("params", RpcValue::from(vec![1_i64, 2])),
        ]);
        let encoded = value.to_json_with(&reject).expect("native kinds encode");
        assert_eq!(encoded, json!({"name": "add", "params": [1, 2]}));
    }

    #[test]
    fn datetimes_defer_to_fallback() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date");
        let value = RpcValue::Array(vec![RpcValue::Date(date)]);
        assert_eq!(
            value.to_json_with(&reject),
            Err(EncodeError::Unsupported("date"))
        );
    }

    #[test]
    fn non_finite_doubles_fail_to_encode() {
        assert_eq!(
            RpcValue::Double(f64::INFINITY).to_json_with(&reject),
            Err(EncodeError::NonFinite)
        );
    }
}
