//! STS Client
//!
//! `AssumeRole` for the credential broker and `GetCallerIdentity` to find
//! the account the base credentials belong to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::query::QueryClient;
use crate::agents::auto_peering::identity::{AwsCredentials, RoleAssumer};
use crate::error::Result;

const STS_VERSION: &str = "2011-06-15";

/// Sessions are requested for one hour.
const SESSION_DURATION_SECS: u32 = 3600;

#[derive(Debug, Deserialize)]
struct AssumeRoleResponse {
    #[serde(rename = "AssumeRoleResult")]
    result: AssumeRoleResult,
}

#[derive(Debug, Deserialize)]
struct AssumeRoleResult {
    #[serde(rename = "Credentials")]
    credentials: StsCredentials,
}

#[derive(Debug, Deserialize)]
struct StsCredentials {
    #[serde(rename = "AccessKeyId")]
    access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    secret_access_key: String,
    #[serde(rename = "SessionToken")]
    session_token: String,
    #[serde(rename = "Expiration")]
    expiration: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GetCallerIdentityResponse {
    #[serde(rename = "GetCallerIdentityResult")]
    result: CallerIdentity,
}

#[derive(Debug, Deserialize)]
struct CallerIdentity {
    #[serde(rename = "Account")]
    account: String,
}

fn decode_assume_role(body: &str) -> Result<AwsCredentials> {
    let response: AssumeRoleResponse = quick_xml::de::from_str(body)?;
    let creds = response.result.credentials;

    Ok(AwsCredentials {
        access_key_id: creds.access_key_id,
        secret_access_key: creds.secret_access_key,
        session_token: Some(creds.session_token),
        expires_at: Some(creds.expiration),
    })
}

fn decode_caller_account(body: &str) -> Result<String> {
    let response: GetCallerIdentityResponse = quick_xml::de::from_str(body)?;
    Ok(response.result.account)
}

/// STS in the engine's home region, signed with the base credentials.
pub struct StsClient {
    client: QueryClient,
}

impl StsClient {
    pub fn new(http: Client, credentials: AwsCredentials, region: &str) -> Self {
        Self {
            client: QueryClient::new(http, credentials, "sts", STS_VERSION, region),
        }
    }

    /// Account id of the base credentials.
    pub async fn get_caller_identity(&self) -> Result<String> {
        let body = self.client.call("GetCallerIdentity", Vec::new()).await?;
        decode_caller_account(&body)
    }
}

#[async_trait]
impl RoleAssumer for StsClient {
    async fn assume_role(&self, role_arn: &str, session_name: &str) -> Result<AwsCredentials> {
        let body = self
            .client
            .call(
                "AssumeRole",
                vec![
                    ("RoleArn".to_string(), role_arn.to_string()),
                    ("RoleSessionName".to_string(), session_name.to_string()),
                    ("DurationSeconds".to_string(), SESSION_DURATION_SECS.to_string()),
                ],
            )
            .await?;
        decode_assume_role(&body)
    }
}
