//! Auto-Peering Types
//!
//! Core types for networks, peering connections and route tables as seen
//! through a provider gateway.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use super::tags::{TagReader, COMPONENT_TAG, DEPENDENCIES_TAG, DEPLOYMENT_IDENTIFIER_TAG};

/// A single provider tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// A VPC as described by a gateway, before decoration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcDescription {
    pub vpc_id: String,
    pub cidr_block: String,
    /// `None` when the provider reports no tag set at all
    pub tags: Option<Vec<Tag>>,
}

/// A VPC decorated with its owning account/region and the metadata derived
/// from its tags.
///
/// Equality and hashing use `(account_id, region, id)` only.
#[derive(Debug, Clone, Serialize)]
pub struct Network {
    pub id: String,
    pub account_id: String,
    pub region: String,
    pub cidr_block: String,
    #[serde(skip)]
    pub tags: Option<Vec<Tag>>,
    pub component: String,
    pub deployment_identifier: String,
    pub dependencies: Vec<String>,
}

impl Network {
    pub fn from_description(description: VpcDescription, account_id: &str, region: &str) -> Self {
        let reader = TagReader::new(description.tags.as_deref());
        let component = reader.value_of(COMPONENT_TAG);
        let deployment_identifier = reader.value_of(DEPLOYMENT_IDENTIFIER_TAG);
        let dependencies = reader.values_of(DEPENDENCIES_TAG);

        Self {
            id: description.vpc_id,
            account_id: account_id.to_string(),
            region: region.to_string(),
            cidr_block: description.cidr_block,
            tags: description.tags,
            component,
            deployment_identifier,
            dependencies,
        }
    }

    /// `component-deploymentIdentifier`, the key dependency declarations refer to.
    pub fn instance_identifier(&self) -> String {
        format!("{}-{}", self.component, self.deployment_identifier)
    }

    pub fn depends_on(&self, identifier: &str) -> bool {
        self.dependencies.iter().any(|d| d == identifier)
    }

    pub fn key(&self) -> NetworkKey {
        NetworkKey {
            account_id: self.account_id.clone(),
            region: self.region.clone(),
            vpc_id: self.id.clone(),
        }
    }
}

impl PartialEq for Network {
    fn eq(&self, other: &Self) -> bool {
        self.account_id == other.account_id && self.region == other.region && self.id == other.id
    }
}

impl Eq for Network {}

impl Hash for Network {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.account_id.hash(state);
        self.region.hash(state);
        self.id.hash(state);
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.account_id, self.region, self.id)
    }
}

/// Identity of a network independent of its decorations
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NetworkKey {
    pub account_id: String,
    pub region: String,
    pub vpc_id: String,
}

/// Provider-side state of a peering connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeeringStatus {
    InitiatingRequest,
    PendingAcceptance,
    Provisioning,
    Active,
    Deleting,
    Deleted,
    Rejected,
    Failed,
    Expired,
    #[serde(other)]
    Unknown,
}

impl PeeringStatus {
    pub fn from_code(code: &str) -> Self {
        match code {
            "initiating-request" => Self::InitiatingRequest,
            "pending-acceptance" => Self::PendingAcceptance,
            "provisioning" => Self::Provisioning,
            "active" => Self::Active,
            "deleting" => Self::Deleting,
            "deleted" => Self::Deleted,
            "rejected" => Self::Rejected,
            "failed" => Self::Failed,
            "expired" => Self::Expired,
            _ => Self::Unknown,
        }
    }

    /// Connections in any other state are on their way out and are treated
    /// as absent.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            Self::InitiatingRequest | Self::PendingAcceptance | Self::Provisioning | Self::Active
        )
    }
}

impl std::fmt::Display for PeeringStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Self::InitiatingRequest => "initiating-request",
            Self::PendingAcceptance => "pending-acceptance",
            Self::Provisioning => "provisioning",
            Self::Active => "active",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", code)
    }
}

/// One side of a peering connection
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PeeringSide {
    pub vpc_id: String,
    pub owner_id: Option<String>,
    pub region: Option<String>,
}

/// A peering connection as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeeringConnection {
    pub id: String,
    pub requester: PeeringSide,
    pub accepter: PeeringSide,
    pub status: PeeringStatus,
}

/// Accepter/requester filter used to probe for an existing connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeeringFilter {
    pub accepter_vpc_id: String,
    pub requester_vpc_id: String,
}

/// Parameters for requesting a new peering connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeeringRequest {
    pub vpc_id: String,
    pub peer_vpc_id: String,
    pub peer_owner_id: String,
    pub peer_region: String,
}

/// A route table and the routes it currently carries
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteTable {
    pub id: String,
    pub vpc_id: String,
    pub routes: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn route_to(&self, destination_cidr_block: &str) -> Option<&RouteEntry> {
        self.routes
            .iter()
            .find(|r| r.destination_cidr_block.as_deref() == Some(destination_cidr_block))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteEntry {
    pub destination_cidr_block: Option<String>,
    pub vpc_peering_connection_id: Option<String>,
}

/// The reconciliation to apply to a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Provision,
    Destroy,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Provision => write!(f, "provision"),
            Action::Destroy => write!(f, "destroy"),
        }
    }
}
