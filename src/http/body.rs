// file: src/http/body.rs
// description: request payloads rendered as raw text, json or multipart form
// reference: https://docs.rs/reqwest/latest/reqwest/multipart/index.html

use super::params::ParamValue;
use crate::error::HttpError;
use reqwest::RequestBuilder;
use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: None,
            bytes,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Value(ParamValue),
    File(FilePart),
}

macro_rules! form_value_from {
    ($($source:ty),+) => {
        $(impl From<$source> for FormValue {
            fn from(value: $source) -> Self {
                FormValue::Value(value.into())
            }
        })+
    };
}

form_value_from!(ParamValue, &str, String, i64, i32, u32, f64, bool);

impl From<FilePart> for FormValue {
    fn from(file: FilePart) -> Self {
        FormValue::File(file)
    }
}

pub type RequestData = BTreeMap<String, FormValue>;

/// What the caller hands to `post`/`put`/`patch`.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Fields(RequestData),
    Raw(String),
}

impl From<RequestData> for Payload {
    fn from(fields: RequestData) -> Self {
        Payload::Fields(fields)
    }
}

impl From<String> for Payload {
    fn from(raw: String) -> Self {
        Payload::Raw(raw)
    }
}

impl From<&str> for Payload {
    fn from(raw: &str) -> Self {
        Payload::Raw(raw.to_string())
    }
}

/// Encoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Text(String),
    Json(Value),
    Multipart(RequestData),
}

impl RequestBody {
    /// Raw strings pass through, field maps with any file become a multipart
    /// form and everything else is sent as a JSON object.
    pub fn from_payload(payload: Option<Payload>) -> Result<Self, HttpError> {
        match payload {
            None => Ok(RequestBody::Empty),
            Some(Payload::Raw(text)) => Ok(RequestBody::Text(text)),
            Some(Payload::Fields(fields)) if has_files(&fields) => Ok(RequestBody::Multipart(fields)),
            Some(Payload::Fields(fields)) => {
                let mut object = Map::new();
                for (key, value) in fields {
                    if let FormValue::Value(value) = value {
                        let encoded = serde_json::to_value(value)
                            .map_err(|e| HttpError::InvalidRequest(e.to_string()))?;
                        object.insert(key, encoded);
                    }
                }
                Ok(RequestBody::Json(Value::Object(object)))
            }
        }
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Text(_) => Some("text/plain"),
            RequestBody::Json(_) => Some("application/json"),
            RequestBody::Multipart(_) => Some("multipart/form-data"),
        }
    }

    pub(crate) fn apply(self, builder: RequestBuilder) -> Result<RequestBuilder, HttpError> {
        match self {
            RequestBody::Empty => Ok(builder),
            RequestBody::Text(text) => Ok(builder.body(text)),
            RequestBody::Json(value) => Ok(builder.json(&value)),
            RequestBody::Multipart(fields) => Ok(builder.multipart(to_form(fields)?)),
        }
    }
}

fn has_files(fields: &RequestData) -> bool {
    fields.values().any(|value| matches!(value, FormValue::File(_)))
}

fn to_form(fields: RequestData) -> Result<Form, HttpError> {
    let mut form = Form::new();
    for (key, value) in fields {
        form = match value {
            FormValue::Value(value) => form.text(key, value.to_string()),
            FormValue::File(file) => {
                let mut part = Part::bytes(file.bytes).file_name(file.file_name);
                if let Some(mime) = file.mime {
                    part = part
                        .mime_str(&mime)
                        .map_err(|e| HttpError::InvalidRequest(format!("invalid mime type {}: {}", mime, e)))?;
                }
                form.part(key, part)
            }
        };
    }
    Ok(form)
}
