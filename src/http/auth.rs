// file: src/http/auth.rs
// description: authorization header construction for basic and bearer auth
// reference: https://docs.rs/base64

use crate::error::HttpError;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Basic,
    #[default]
    Bearer,
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Token(String),
    Basic { username: String, password: String },
}

impl Credentials {
    pub fn token(token: impl Into<String>) -> Self {
        Credentials::Token(token.into())
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Credentials::Token(***)"),
            Credentials::Basic { username, .. } => f
                .debug_struct("Credentials::Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// Value of the `Authorization` header for `credentials` under `auth_type`.
pub fn authorization_header(credentials: &Credentials, auth_type: AuthType) -> Result<String, HttpError> {
    match (auth_type, credentials) {
        (AuthType::Basic, Credentials::Token(_)) => Err(HttpError::InvalidAuthToken(
            "basic authorization needs a username and password instead of a token".to_string(),
        )),
        (AuthType::Basic, Credentials::Basic { password, .. }) if password.is_empty() => Err(
            HttpError::InvalidAuthToken("password must not be empty in basic authorization".to_string()),
        ),
        (AuthType::Basic, Credentials::Basic { username, password }) => Ok(format!(
            "Basic {}",
            BASE64.encode(format!("{}:{}", username, password))
        )),
        (AuthType::Bearer, Credentials::Token(token)) if token.is_empty() => Err(
            HttpError::InvalidAuthToken("bearer token must not be empty".to_string()),
        ),
        (AuthType::Bearer, Credentials::Token(token)) => Ok(format!("Bearer {}", token)),
        (AuthType::Bearer, Credentials::Basic { .. }) => Err(HttpError::InvalidAuthToken(
            "bearer authorization needs a token".to_string(),
        )),
    }
}
