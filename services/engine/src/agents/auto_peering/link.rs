//! Link
//!
//! The unit of reconciliation: one network pair, the peering relationship
//! between them and the route directions that must exist over it.

use serde::Serialize;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::info;

use super::gateways::GatewayDirectory;
use super::relationship::{PeeringRelationship, WaitPolicy};
use super::routes::{PeeringRoutes, RouteDirection};
use super::types::{Action, Network, NetworkKey};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkKind {
    /// Both ends declare each other; routes in both directions.
    Bidirectional,
    /// The first network depends on the second.
    DependencyOnly,
    /// The first network is a dependent of the second.
    DependentOnly,
}

pub struct Link {
    first: Network,
    second: Network,
    kind: LinkKind,
    relationship: Arc<PeeringRelationship>,
    routes: PeeringRoutes,
}

impl Link {
    /// Routes are derived from `kind`: `first → second`, plus the reverse
    /// for bidirectional links.
    pub fn new(
        first: Network,
        second: Network,
        kind: LinkKind,
        directory: Arc<GatewayDirectory>,
        wait: WaitPolicy,
    ) -> Self {
        let mut directions = vec![RouteDirection::new(&first, &second)];
        if kind == LinkKind::Bidirectional {
            directions.push(RouteDirection::new(&second, &first));
        }

        let relationship = Arc::new(PeeringRelationship::new(
            first.clone(),
            second.clone(),
            directory.clone(),
            wait,
        ));
        let routes = PeeringRoutes::new(directions, relationship.clone(), directory);

        Self {
            first,
            second,
            kind,
            relationship,
            routes,
        }
    }

    pub fn first(&self) -> &Network {
        &self.first
    }

    pub fn second(&self) -> &Network {
        &self.second
    }

    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    pub fn routes(&self) -> &[RouteDirection] {
        self.routes.directions()
    }

    /// The unordered pair, as a sorted tuple.
    pub fn key(&self) -> (NetworkKey, NetworkKey) {
        let (a, b) = (self.first.key(), self.second.key());
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Provision builds the connection before its routes; destroy removes
    /// the routes while the connection id can still be looked up.
    pub async fn perform(&self, action: Action) -> Result<()> {
        info!(
            action = %action,
            kind = ?self.kind,
            "Performing '{}' on link between '{}' and '{}'.",
            action,
            self.first,
            self.second
        );

        match action {
            Action::Provision => {
                self.relationship.provision().await?;
                self.routes.provision().await
            }
            Action::Destroy => {
                self.routes.destroy().await?;
                self.relationship.destroy().await
            }
        }
    }

    pub fn summary(&self) -> LinkSummary {
        LinkSummary {
            kind: self.kind,
            networks: (self.first.key(), self.second.key()),
            routes: self
                .routes()
                .iter()
                .map(|r| RouteSummary {
                    source_vpc_id: r.source.id.clone(),
                    destination_vpc_id: r.destination.id.clone(),
                    destination_cidr_block: r.destination.cidr_block.clone(),
                })
                .collect(),
        }
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Link {}

impl Hash for Link {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("first", &self.first.to_string())
            .field("second", &self.second.to_string())
            .field("kind", &self.kind)
            .finish()
    }
}

/// Serializable view of a link for reconciliation reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkSummary {
    pub kind: LinkKind,
    pub networks: (NetworkKey, NetworkKey),
    pub routes: Vec<RouteSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSummary {
    pub source_vpc_id: String,
    pub destination_vpc_id: String,
    pub destination_cidr_block: String,
}
