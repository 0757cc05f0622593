//! Credential Broker
//!
//! Turns an account id into an authenticated session by assuming the
//! configured peering role in that account. Sessions are cached per account
//! for the lifetime of the broker.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{PeeringError, Result};

/// Session name recorded by the provider for every assumed-role session.
pub const ROLE_SESSION_NAME: &str = "vpc-auto-peering";

/// Cached sessions are refreshed this long before they actually expire.
const EXPIRY_SKEW_SECS: i64 = 300;

/// Temporary (or base) AWS credentials
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AwsCredentials {
    /// Base credentials injected by the function runtime.
    pub fn from_env() -> Result<Self> {
        let access_key_id = env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| PeeringError::Credentials("AWS_ACCESS_KEY_ID not set".to_string()))?;
        let secret_access_key = env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| PeeringError::Credentials("AWS_SECRET_ACCESS_KEY not set".to_string()))?;
        let session_token = env::var("AWS_SESSION_TOKEN").ok().filter(|t| !t.is_empty());

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
            expires_at: None,
        })
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS) >= expires_at,
            None => false,
        }
    }
}

/// `arn:aws:iam::<account_id>:role/<role_name>`
pub fn role_arn_for(account_id: &str, role_name: &str) -> String {
    format!("arn:aws:iam::{}:role/{}", account_id, role_name)
}

/// Capability to exchange a role ARN for a session
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(&self, role_arn: &str, session_name: &str) -> Result<AwsCredentials>;
}

/// Memoizing role-assumption broker.
///
/// At most one assume-role call is made per account id while the cached
/// session is still valid. Authorization failures propagate unmodified.
pub struct CredentialBroker {
    assumer: Arc<dyn RoleAssumer>,
    role_name: String,
    sessions: Mutex<HashMap<String, Arc<AwsCredentials>>>,
}

impl CredentialBroker {
    pub fn new(assumer: Arc<dyn RoleAssumer>, role_name: &str) -> Self {
        Self {
            assumer,
            role_name: role_name.to_string(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    pub async fn session_for(&self, account_id: &str) -> Result<Arc<AwsCredentials>> {
        // Held across the assume call so concurrent callers for the same
        // account never trigger a second role assumption.
        let mut sessions = self.sessions.lock().await;

        if let Some(session) = sessions.get(account_id) {
            if !session.is_expired() {
                return Ok(session.clone());
            }
            debug!(account_id = %account_id, "Cached session expired, assuming role again");
        }

        let role_arn = role_arn_for(account_id, &self.role_name);
        let credentials = self.assumer.assume_role(&role_arn, ROLE_SESSION_NAME).await?;

        info!(account_id = %account_id, role_arn = %role_arn, "Assumed peering role");

        let session = Arc::new(credentials);
        sessions.insert(account_id.to_string(), session.clone());
        Ok(session)
    }
}
