//! Connection admission against the external authentication service.

pub mod admission;
pub mod grpc;

use async_trait::async_trait;

pub use admission::{AdmissionController, AdmittedSession, ConnectionAttempt};
pub use grpc::GrpcSessionValidator;

use crate::error::AdmissionError;

/// Session data returned by the authentication service for a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub account_id: i32,
    pub user_name: String,
}

/// The one capability admission needs from the authentication service.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Validate `token` for `identity`. `strict` additionally asks the service
    /// to check that the identity belongs to the token's account.
    ///
    /// `Ok(None)` means the service answered without session data.
    async fn validate_session(
        &self,
        token: &str,
        identity: &str,
        strict: bool,
    ) -> Result<Option<SessionInfo>, AdmissionError>;
}
