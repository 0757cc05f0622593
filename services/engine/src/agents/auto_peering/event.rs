//! Trigger Event
//!
//! Bucket notifications arrive wrapped in a topic message: the outer
//! envelope's first record carries a JSON string whose first record is the
//! object-change event. The object key names the target network.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use super::types::Action;
use crate::error::{PeeringError, Result};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Records")]
    records: Vec<EnvelopeRecord>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeRecord {
    #[serde(rename = "Sns")]
    sns: SnsPayload,
}

#[derive(Debug, Deserialize)]
struct SnsPayload {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct S3Notification {
    #[serde(rename = "Records")]
    records: Vec<S3Record>,
}

#[derive(Debug, Deserialize)]
struct S3Record {
    #[serde(rename = "eventName")]
    event_name: String,
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: String,
}

/// What the event asks for. `Unknown` never reaches a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerAction {
    Provision,
    Destroy,
    Unknown,
}

impl std::fmt::Display for TriggerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provision => write!(f, "provision"),
            Self::Destroy => write!(f, "destroy"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl TriggerAction {
    pub fn action(self) -> Option<Action> {
        match self {
            Self::Provision => Some(Action::Provision),
            Self::Destroy => Some(Action::Destroy),
            Self::Unknown => None,
        }
    }
}

/// Layout of the object key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeySchema {
    /// `<type>/<accountId>/<vpcId>`
    #[default]
    TypeAccountVpc,
    /// `<type>/<vpcId>`, the account being the invocation's own
    TypeVpc,
}

impl FromStr for KeySchema {
    type Err = PeeringError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "type/account/vpc" => Ok(Self::TypeAccountVpc),
            "type/vpc" => Ok(Self::TypeVpc),
            other => Err(PeeringError::Config(format!(
                "unknown key schema '{}', expected 'type/account/vpc' or 'type/vpc'",
                other
            ))),
        }
    }
}

/// The network an event refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub object_type: String,
    pub account_id: String,
    pub vpc_id: String,
}

#[derive(Debug, Clone)]
pub struct S3EventSnsMessage {
    event_name: String,
    object_key: String,
}

impl S3EventSnsMessage {
    pub fn parse(event: &Value) -> Result<Self> {
        let envelope = Envelope::deserialize(event)?;
        let record = envelope
            .records
            .into_iter()
            .next()
            .ok_or_else(|| PeeringError::InvalidEvent("envelope has no records".to_string()))?;

        let notification: S3Notification = serde_json::from_str(&record.sns.message)?;
        let s3_record = notification
            .records
            .into_iter()
            .next()
            .ok_or_else(|| PeeringError::InvalidEvent("notification has no records".to_string()))?;

        Ok(Self {
            event_name: s3_record.event_name,
            object_key: s3_record.s3.object.key,
        })
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn action(&self) -> TriggerAction {
        if self.event_name.starts_with("ObjectCreated") {
            TriggerAction::Provision
        } else if self.event_name.starts_with("ObjectRemoved") {
            TriggerAction::Destroy
        } else {
            TriggerAction::Unknown
        }
    }

    /// Splits the URL-decoded object key according to `schema`.
    /// `default_account_id` fills in the account for keys without one.
    pub fn target(&self, schema: KeySchema, default_account_id: &str) -> Result<Target> {
        let key = urlencoding::decode(&self.object_key)
            .map_err(|e| PeeringError::InvalidEvent(format!("undecodable object key: {}", e)))?;
        let parts: Vec<&str> = key.split('/').collect();

        let segment = |index: usize, name: &str| -> Result<String> {
            parts
                .get(index)
                .filter(|part| !part.is_empty())
                .map(|part| part.to_string())
                .ok_or_else(|| {
                    PeeringError::InvalidEvent(format!(
                        "object key '{}' has no {} segment",
                        key, name
                    ))
                })
        };

        match schema {
            KeySchema::TypeAccountVpc => Ok(Target {
                object_type: segment(0, "type")?,
                account_id: segment(1, "account")?,
                vpc_id: segment(2, "VPC")?,
            }),
            KeySchema::TypeVpc => Ok(Target {
                object_type: segment(0, "type")?,
                account_id: default_account_id.to_string(),
                vpc_id: segment(1, "VPC")?,
            }),
        }
    }
}
