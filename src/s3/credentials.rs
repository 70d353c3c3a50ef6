//! S3 Credentials Module
//!
//! Resolves the access key pair used to sign object store requests.
//!
//! Sources are tried in order: explicit values (CLI flags or the config file),
//! then the standard AWS environment variables. Interactive prompting lives in
//! the binary, which falls back to it when this module reports missing
//! credentials.
//!
//! # Example
//!
//! ```
//! use mizuchi_backup::s3::{Credentials, CredentialsProvider};
//!
//! let creds = CredentialsProvider::resolve(Some("access-key"), Some("secret-key")).unwrap();
//! assert_eq!(creds.access_key_id(), "access-key");
//! assert_eq!(creds.secret_access_key(), "secret-key");
//! ```

use crate::config::S3Config;
use thiserror::Error;

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Credentials for AWS authentication
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .finish()
    }
}

impl Credentials {
    /// Create new credentials
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Create credentials with session token (for temporary credentials)
    pub fn with_session_token(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: Some(session_token.into()),
        }
    }

    /// Get the access key ID
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Get the secret access key
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    /// Get the session token (if any)
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub(crate) fn into_sdk(self) -> aws_credential_types::Credentials {
        aws_credential_types::Credentials::new(
            self.access_key_id,
            self.secret_access_key,
            self.session_token,
            None,
            "mizuchi-backup",
        )
    }
}

/// Factory methods for the supported credential sources
pub struct CredentialsProvider;

impl CredentialsProvider {
    /// Load credentials from environment variables
    ///
    /// Looks for:
    /// - `AWS_ACCESS_KEY_ID`
    /// - `AWS_SECRET_ACCESS_KEY`
    /// - `AWS_SESSION_TOKEN` (optional)
    pub fn from_env() -> Result<Credentials, CredentialsError> {
        let access_key = non_empty_env("AWS_ACCESS_KEY_ID").ok_or_else(|| {
            CredentialsError::MissingCredentials("AWS_ACCESS_KEY_ID not set".into())
        })?;

        let secret_key = non_empty_env("AWS_SECRET_ACCESS_KEY").ok_or_else(|| {
            CredentialsError::MissingCredentials("AWS_SECRET_ACCESS_KEY not set".into())
        })?;

        Ok(match non_empty_env("AWS_SESSION_TOKEN") {
            Some(token) => Credentials::with_session_token(access_key, secret_key, token),
            None => Credentials::new(access_key, secret_key),
        })
    }

    /// Load credentials from S3Config
    pub fn from_config(config: &S3Config) -> Result<Credentials, CredentialsError> {
        Self::from_parts(config.access_key.as_deref(), config.secret_key.as_deref())
    }

    /// Use explicit values when both halves are present, otherwise fall back
    /// to the environment
    pub fn resolve(
        access_key: Option<&str>,
        secret_key: Option<&str>,
    ) -> Result<Credentials, CredentialsError> {
        match (access_key, secret_key) {
            (None, None) => Self::from_env(),
            _ => Self::from_parts(access_key, secret_key),
        }
    }

    fn from_parts(
        access_key: Option<&str>,
        secret_key: Option<&str>,
    ) -> Result<Credentials, CredentialsError> {
        let access_key = access_key
            .ok_or_else(|| CredentialsError::MissingCredentials("access key not set".into()))?;
        let secret_key = secret_key
            .ok_or_else(|| CredentialsError::MissingCredentials("secret key not set".into()))?;

        if access_key.trim().is_empty() || secret_key.trim().is_empty() {
            return Err(CredentialsError::InvalidCredentials(
                "access key and secret key must not be empty".into(),
            ));
        }

        Ok(Credentials::new(access_key, secret_key))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
