//! AWS Query API transport
//!
//! Form-encoded, SigV4-signed `POST /` requests with XML responses, as
//! spoken by STS and EC2.

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::sigv4::RequestSigner;
use crate::agents::auto_peering::identity::AwsCredentials;
use crate::error::{PeeringError, Result};

/// HTTP client shared by every Query API client.
pub fn http_client() -> Result<Client> {
    Ok(Client::builder().timeout(Duration::from_secs(30)).build()?)
}

/// `k1=v1&k2=v2`, percent-encoded.
pub fn form_body(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// EC2: `<Response><Errors><Error>..</Error></Errors></Response>`
#[derive(Debug, Deserialize)]
struct Ec2ErrorResponse {
    #[serde(rename = "Errors")]
    errors: ErrorList,
}

#[derive(Debug, Deserialize)]
struct ErrorList {
    #[serde(rename = "Error", default)]
    error: Vec<ErrorDetail>,
}

/// STS: `<ErrorResponse><Error>..</Error></ErrorResponse>`
#[derive(Debug, Deserialize)]
struct StsErrorResponse {
    #[serde(rename = "Error")]
    error: ErrorDetail,
}

/// Maps a non-success response to a provider error when the body is an AWS
/// error document, and to a decode error otherwise.
pub fn parse_error(status: StatusCode, body: &str) -> PeeringError {
    let detail = quick_xml::de::from_str::<Ec2ErrorResponse>(body)
        .ok()
        .and_then(|r| r.errors.error.into_iter().next())
        .or_else(|| {
            quick_xml::de::from_str::<StsErrorResponse>(body)
                .ok()
                .map(|r| r.error)
        });

    match detail {
        Some(ErrorDetail { code, message }) => PeeringError::provider(code, message),
        None => PeeringError::Decode(format!("HTTP {} with unrecognised body: {}", status, body)),
    }
}

/// One service endpoint, signed with one set of credentials.
pub struct QueryClient {
    http: Client,
    credentials: AwsCredentials,
    service: &'static str,
    version: &'static str,
    region: String,
    host: String,
}

impl QueryClient {
    pub fn new(
        http: Client,
        credentials: AwsCredentials,
        service: &'static str,
        version: &'static str,
        region: &str,
    ) -> Self {
        Self {
            http,
            credentials,
            service,
            version,
            region: region.to_string(),
            host: format!("{}.{}.amazonaws.com", service, region),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Invokes `action` and returns the raw XML body of a successful response.
    pub async fn call(&self, action: &str, params: Vec<(String, String)>) -> Result<String> {
        let mut form = vec![
            ("Action".to_string(), action.to_string()),
            ("Version".to_string(), self.version.to_string()),
        ];
        form.extend(params);
        let body = form_body(&form);

        let headers = RequestSigner::new(&self.credentials, self.service, &self.region)
            .sign_form_post(&self.host, &body, Utc::now());

        let mut request = self.http.post(format!("https://{}/", self.host)).body(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        debug!(service = self.service, region = %self.region, action, "Calling AWS");
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            Ok(text)
        } else {
            Err(parse_error(status, &text))
        }
    }
}
