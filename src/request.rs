//! Typed request parameters for the action routes.
//!
//! Parameters arrive either as query-string pairs or as a JSON object.
//! Integers may be JSON numbers, decimal strings or `0x`-prefixed hex.
//! Everything is range-checked here so no frame is ever built from an
//! out-of-range value.

use crate::error::{ControllerError, Result};
use crate::routes::Action;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Named parameters of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams(Map<String, Value>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_query(query: HashMap<String, String>) -> Self {
        Self(
            query
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        )
    }

    /// Merge a JSON object body; body values win over query values.
    pub fn merge_json(&mut self, body: Value) -> Result<()> {
        match body {
            Value::Object(map) => {
                self.0.extend(map);
                Ok(())
            }
            Value::Null => Ok(()),
            other => Err(ControllerError::validation(
                "body",
                format!("expected a JSON object, got {}", other),
            )),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    /// Required unsigned 16-bit parameter.
    pub fn u16(&self, name: &'static str) -> Result<u16> {
        let value = self
            .0
            .get(name)
            .ok_or_else(|| ControllerError::validation(name, "missing"))?;
        let number = match value {
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| ControllerError::validation(name, format!("{} is not an integer", n)))?,
            Value::String(s) => parse_integer(s)
                .ok_or_else(|| ControllerError::validation(name, format!("'{}' is not numeric", s)))?,
            other => {
                return Err(ControllerError::validation(
                    name,
                    format!("{} is not numeric", other),
                ));
            }
        };
        u16::try_from(number).map_err(|_| {
            ControllerError::validation(name, format!("{} is outside 0..=65535", number))
        })
    }
}

fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.parse().ok()?
        }
        None => return None,
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// Parameters of the `level` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelParams {
    /// Brightness target.
    pub val: u16,
    /// Transition time in 100 ms units.
    pub rate: u16,
}

impl LevelParams {
    pub fn from_params(params: &RequestParams) -> Result<Self> {
        Ok(Self {
            val: params.u16("val")?,
            rate: params.u16("rate")?,
        })
    }
}

/// Parameters of the `identify` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifyParams {
    /// Seconds to stay in identify mode.
    pub identify_time: u16,
}

impl IdentifyParams {
    pub fn from_params(params: &RequestParams) -> Result<Self> {
        Ok(Self {
            identify_time: params.u16("identifytime")?,
        })
    }
}

/// A fully validated action request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionRequest {
    QueryState,
    Toggle,
    SetLevel(LevelParams),
    Identify(IdentifyParams),
}

impl ActionRequest {
    pub fn parse(action: Action, params: &RequestParams) -> Result<Self> {
        Ok(match action {
            Action::QueryState => Self::QueryState,
            Action::Toggle => Self::Toggle,
            Action::SetLevel => Self::SetLevel(LevelParams::from_params(params)?),
            Action::Identify => Self::Identify(IdentifyParams::from_params(params)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(pairs: &[(&str, &str)]) -> RequestParams {
        RequestParams::from_query(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_hex_and_decimal_strings() {
        let params = query(&[("val", "0x00FA"), ("rate", "5")]);
        assert_eq!(
            LevelParams::from_params(&params).unwrap(),
            LevelParams { val: 250, rate: 5 }
        );
        assert_eq!(parse_integer("0XFFFF"), Some(65535));
        assert_eq!(parse_integer("-3"), Some(-3));
        assert_eq!(parse_integer("1e3"), None);
        assert_eq!(parse_integer(""), None);
    }

    #[test]
    fn test_json_numbers() {
        let params = RequestParams::new().with("identifytime", 65535);
        assert_eq!(
            IdentifyParams::from_params(&params).unwrap().identify_time,
            65535
        );
    }

    #[test]
    fn test_range_and_type_errors() {
        for bad in [json!(65536), json!(-1), json!("0x10000"), json!("-0x1"), json!(2.5), json!("dim"), json!(true)] {
            let params = RequestParams::new().with("val", bad.clone()).with("rate", 1);
            let err = LevelParams::from_params(&params).unwrap_err();
            assert!(
                matches!(err, ControllerError::Validation { name: "val", .. }),
                "{} should be rejected, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_missing_parameter() {
        let params = query(&[("val", "10")]);
        let err = LevelParams::from_params(&params).unwrap_err();
        assert!(matches!(err, ControllerError::Validation { name: "rate", .. }));

        let err = ActionRequest::parse(Action::Identify, &RequestParams::new()).unwrap_err();
        assert!(matches!(err, ControllerError::Validation { name: "identifytime", .. }));
    }

    #[test]
    fn test_body_overrides_query() {
        let mut params = query(&[("val", "1"), ("rate", "2")]);
        params.merge_json(json!({ "val": 200 })).unwrap();
        assert_eq!(
            LevelParams::from_params(&params).unwrap(),
            LevelParams { val: 200, rate: 2 }
        );
        assert!(params.merge_json(json!([1, 2])).is_err());
        assert!(params.merge_json(Value::Null).is_ok());
    }

    #[test]
    fn test_parameterless_actions_ignore_params() {
        let params = query(&[("val", "not a number")]);
        assert_eq!(
            ActionRequest::parse(Action::Toggle, &params).unwrap(),
            ActionRequest::Toggle
        );
        assert_eq!(
            ActionRequest::parse(Action::QueryState, &params).unwrap(),
            ActionRequest::QueryState
        );
    }
}
