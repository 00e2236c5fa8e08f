use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;

use super::{SessionInfo, SessionValidator};
use crate::error::AdmissionError;

/// Header carrying the session token (an optional `Bearer ` prefix is stripped).
pub const TOKEN_HEADER: &str = "authorization";

/// Header carrying the identity the client claims to be.
pub const IDENTITY_HEADER: &str = "profileid";

/// Credentials presented in a WebSocket handshake.
#[derive(Debug, Clone, Default)]
pub struct ConnectionAttempt {
    pub token: Option<String>,
    pub identity: Option<String>,
}

impl ConnectionAttempt {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let token = header(TOKEN_HEADER).map(|t| match t.strip_prefix("Bearer ") {
            Some(stripped) => stripped.to_string(),
            None => t,
        });

        Self {
            token,
            identity: header(IDENTITY_HEADER),
        }
    }
}

/// An attempt the authentication service accepted.
#[derive(Debug, Clone)]
pub struct AdmittedSession {
    /// Identity the connection registers under (the claimed one).
    pub identity: String,
    pub session: SessionInfo,
}

/// Gatekeeper consulted once per connection attempt, before any registration.
pub struct AdmissionController {
    validator: Arc<dyn SessionValidator>,
    timeout: Duration,
}

impl AdmissionController {
    pub fn new(validator: Arc<dyn SessionValidator>, timeout: Duration) -> Self {
        Self { validator, timeout }
    }

    /// Validate an attempt. Any error, timeout or empty answer is a refusal;
    /// this never touches the registry or the connection table.
    pub async fn admit(&self, attempt: &ConnectionAttempt) -> Result<AdmittedSession, AdmissionError> {
        let token = attempt
            .token
            .as_deref()
            .ok_or(AdmissionError::MissingCredential(TOKEN_HEADER))?;
        let identity = attempt
            .identity
            .as_deref()
            .ok_or(AdmissionError::MissingCredential(IDENTITY_HEADER))?;

        let answer = tokio::time::timeout(
            self.timeout,
            self.validator.validate_session(token, identity, false),
        )
        .await
        .map_err(|_| AdmissionError::Timeout(self.timeout))??;

        let session = answer.ok_or(AdmissionError::EmptySession)?;

        tracing::debug!(
            identity = %identity,
            account_id = session.account_id,
            "Session validated"
        );

        Ok(AdmittedSession {
            identity: identity.to_string(),
            session,
        })
    }
}
