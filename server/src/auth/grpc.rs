use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};
use tonic::Code;

use super::{SessionInfo, SessionValidator};
use crate::error::AdmissionError;
use crate::proto::authv1::auth_service_client::AuthServiceClient;
use crate::proto::authv1::ValidateUserRequest;

/// `SessionValidator` backed by the `auth.v1.AuthService/ValidateUser` RPC.
#[derive(Clone)]
pub struct GrpcSessionValidator {
    client: AuthServiceClient<Channel>,
}

impl GrpcSessionValidator {
    /// Build a client for `url`. The channel connects on first use, so the
    /// server can start before the authentication service is up.
    pub fn connect_lazy(url: &str) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::from_shared(url.to_string())?.connect_lazy();
        Ok(Self {
            client: AuthServiceClient::new(channel),
        })
    }
}

#[async_trait]
impl SessionValidator for GrpcSessionValidator {
    async fn validate_session(
        &self,
        token: &str,
        identity: &str,
        strict: bool,
    ) -> Result<Option<SessionInfo>, AdmissionError> {
        let request = ValidateUserRequest {
            token: token.to_string(),
            profile_id: identity.to_string(),
            is_profile_validate: strict,
        };

        let mut client = self.client.clone();
        let reply = client
            .validate_user(request)
            .await
            .map_err(|status| match status.code() {
                Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled => {
                    AdmissionError::Unreachable(status.message().to_string())
                }
                _ => AdmissionError::Rejected(status.message().to_string()),
            })?
            .into_inner();

        Ok(reply.data.map(|account| SessionInfo {
            account_id: account.id,
            user_name: account.user_name,
        }))
    }
}
