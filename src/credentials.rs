//! Temporary credential acquisition for cross-account bucket access.
//!
//! The credential provider is a collaborator: it issues short-lived,
//! region-agnostic session credentials for an account, and the store
//! layer binds them to the bucket's actual region before any data call.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sts::error::DisplayErrorContext;
use chrono::{DateTime, Utc};

use crate::config::AwsAccount;
use crate::error::CredentialError;

/// Short-lived session credentials issued for one account and purpose.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

/// Issues temporary credentials for an account, scoped to a named
/// session purpose.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn temporary_credentials(
        &self,
        account: &AwsAccount,
        session_name: &str,
    ) -> Result<SessionCredentials, CredentialError>;
}

/// STS-backed provider: assumes the account's role with the session
/// purpose as the role session name.
pub struct StsCredentialProvider {
    client: aws_sdk_sts::Client,
}

impl StsCredentialProvider {
    pub fn new(client: aws_sdk_sts::Client) -> Self {
        Self { client }
    }

    /// Build a provider from the ambient environment configuration.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(aws_sdk_sts::Client::new(&config))
    }
}

#[async_trait]
impl CredentialProvider for StsCredentialProvider {
    async fn temporary_credentials(
        &self,
        account: &AwsAccount,
        session_name: &str,
    ) -> Result<SessionCredentials, CredentialError> {
        let mut request = self
            .client
            .assume_role()
            .role_arn(&account.role_arn)
            .role_session_name(session_name);
        if let Some(external_id) = &account.external_id {
            request = request.external_id(external_id);
        }

        let output = request
            .send()
            .await
            .map_err(|err| CredentialError::Temporary {
                role_arn: account.role_arn.clone(),
                message: DisplayErrorContext(&err).to_string(),
            })?;

        let credentials = output
            .credentials()
            .ok_or_else(|| CredentialError::Temporary {
                role_arn: account.role_arn.clone(),
                message: "AssumeRole response carried no credentials".to_string(),
            })?;

        let expiration = credentials.expiration();
        Ok(SessionCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: Some(credentials.session_token().to_string()),
            expiration: DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos()),
        })
    }
}

/// Fixed-credential provider for local runs and tests.
pub struct StaticCredentialProvider {
    credentials: SessionCredentials,
}

impl StaticCredentialProvider {
    pub fn new(credentials: SessionCredentials) -> Self {
        Self { credentials }
    }
}

impl Default for StaticCredentialProvider {
    fn default() -> Self {
        Self::new(SessionCredentials {
            access_key_id: "local".to_string(),
            secret_access_key: "local".to_string(),
            session_token: None,
            expiration: None,
        })
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn temporary_credentials(
        &self,
        _account: &AwsAccount,
        _session_name: &str,
    ) -> Result<SessionCredentials, CredentialError> {
        Ok(self.credentials.clone())
    }
}
