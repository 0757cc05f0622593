//! VPC Auto-Peering Agent
//!
//! Keeps VPC peering connections and private-subnet routes in line with the
//! dependency graph declared through VPC tags.
//!
//! ## Architecture
//!
//! - **Identity**: one assumed-role session per searched account
//! - **Gateways**: one EC2 client per (account, region)
//! - **Catalog**: tag-decorated view of every searched VPC, rebuilt per event
//! - **Links**: peering connection plus routes for each network pair
//!
//! A `Dependencies` tag lists other VPCs by `Component-DeploymentIdentifier`
//! rather than VPC id, so declarations survive environment rebuilds.

pub mod catalog;
pub mod event;
pub mod gateways;
pub mod identity;
pub mod link;
pub mod orchestrator;
pub mod relationship;
pub mod resolver;
pub mod routes;
pub mod tags;
pub mod types;

pub use catalog::NetworkCatalog;
pub use event::{KeySchema, S3EventSnsMessage, Target, TriggerAction};
pub use gateways::{Ec2Api, Ec2Connector, Ec2Gateway, GatewayDirectory};
pub use identity::{AwsCredentials, CredentialBroker, RoleAssumer};
pub use link::{Link, LinkKind, LinkSummary};
pub use orchestrator::{AutoPeeringAgent, ReconcileReport};
pub use relationship::{PeeringRelationship, WaitPolicy};
pub use resolver::LinkResolver;
pub use routes::{PeeringRoutes, RouteDirection};
pub use types::{Action, Network, NetworkKey, PeeringConnection, PeeringStatus};
