// file: src/utils/validation.rs
// description: input validation for configuration and request settings
// reference: input validation patterns

use crate::error::{Result, ToolkitError};
use std::path::Path;

pub struct Validator;

impl Validator {
    pub fn validate_url(url: &str) -> Result<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolkitError::Validation(format!(
                "Invalid URL format: {}",
                url
            )));
        }
        Ok(())
    }

    /// Header names follow the RFC 7230 token grammar.
    pub fn validate_header_name(name: &str) -> Result<()> {
        let is_token_char = |c: char| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c);
        if name.is_empty() || !name.chars().all(is_token_char) {
            return Err(ToolkitError::Validation(format!(
                "Invalid header name: {:?}",
                name
            )));
        }
        Ok(())
    }

    pub fn validate_header_value(name: &str, value: &str) -> Result<()> {
        if value.contains(['\r', '\n']) {
            return Err(ToolkitError::Validation(format!(
                "Header {} contains a line break",
                name
            )));
        }
        Ok(())
    }

    pub fn validate_timeout(secs: u64) -> Result<()> {
        if secs == 0 {
            return Err(ToolkitError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_config_file(path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(ToolkitError::Validation(format!(
                "Config file does not exist: {}",
                path.display()
            )));
        }

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(()),
            _ => Err(ToolkitError::Validation(format!(
                "Config file must be a .toml file: {}",
                path.display()
            ))),
        }
    }

    pub fn truncate_text(text: &str, max_length: usize) -> String {
        match text.char_indices().nth(max_length) {
            None => text.to_string(),
            Some((cut, _)) => format!("{}...", &text[..cut]),
        }
    }
}
