// file: src/http/params.rs
// description: query string and path placeholder formatting
// reference: https://docs.rs/regex

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder pattern is valid");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Ordered parameter map; keys render in lexicographic order.
pub type Params = BTreeMap<String, ParamValue>;

/// Builds a [`Params`] map from `key => value` pairs.
#[macro_export]
macro_rules! params {
    () => { $crate::http::Params::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::http::Params::new();
        $(params.insert($key.to_string(), $crate::http::ParamValue::from($value));)+
        params
    }};
}

/// `?key=value&...`, or an empty string when there are no params.
pub fn stringify_params(params: &Params) -> String {
    if params.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    format!("?{}", pairs.join("&"))
}

/// Replaces the first `{key}` placeholder for every key in `params`.
/// Keys without a placeholder are ignored.
pub fn fill_path_params(url: &str, params: &Params) -> String {
    let mut filled = url.to_string();
    for (key, value) in params {
        let placeholder = format!("{{{}}}", key);
        if filled.contains(&placeholder) {
            filled = filled.replacen(&placeholder, &value.to_string(), 1);
        }
    }

    let missing = unfilled_placeholders(&filled);
    if !missing.is_empty() {
        warn!("URL {} still has unfilled path params: {}", filled, missing.join(", "));
    }
    filled
}

pub fn unfilled_placeholders(url: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(url)
        .map(|caps| caps[1].to_string())
        .collect()
}
