//! Peering Routes
//!
//! Route-table entries that make a peering connection usable from private
//! subnets. Failures are tolerated per route table: one table refusing a
//! route never stops the others from being processed.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::gateways::GatewayDirectory;
use super::relationship::PeeringRelationship;
use super::tags::PRIVATE_TIER;
use super::types::{Network, RouteTable};
use crate::error::Result;

/// Traffic from `source`'s private subnets to `destination`'s CIDR.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteDirection {
    pub source: Network,
    pub destination: Network,
}

impl RouteDirection {
    pub fn new(source: &Network, destination: &Network) -> Self {
        Self {
            source: source.clone(),
            destination: destination.clone(),
        }
    }
}

pub struct PeeringRoutes {
    directions: Vec<RouteDirection>,
    relationship: Arc<PeeringRelationship>,
    directory: Arc<GatewayDirectory>,
}

impl PeeringRoutes {
    pub fn new(
        directions: Vec<RouteDirection>,
        relationship: Arc<PeeringRelationship>,
        directory: Arc<GatewayDirectory>,
    ) -> Self {
        Self {
            directions,
            relationship,
            directory,
        }
    }

    pub fn directions(&self) -> &[RouteDirection] {
        &self.directions
    }

    async fn private_route_tables_of(&self, network: &Network) -> Result<Vec<RouteTable>> {
        let gateway = self.directory.for_network(network).await?;
        gateway
            .client()
            .describe_route_tables(&network.id, PRIVATE_TIER)
            .await
    }

    pub async fn provision(&self) -> Result<()> {
        let Some(connection) = self.relationship.fetch().await? else {
            let (first, second) = self.relationship.networks();
            warn!(
                "No peering connection between: '{}' and: '{}'. Skipping route creation.",
                first.id,
                second.id
            );
            return Ok(());
        };

        for direction in &self.directions {
            self.create_routes_for(direction, &connection.id).await?;
        }
        Ok(())
    }

    async fn create_routes_for(&self, direction: &RouteDirection, connection_id: &str) -> Result<()> {
        let RouteDirection { source, destination } = direction;
        info!(
            vpc_id = %source.id,
            peering_connection_id = %connection_id,
            "Adding routes to private subnets in: '{}' pointing at '{}:{}:{}'.",
            source.id,
            destination.id,
            destination.cidr_block,
            connection_id
        );

        let client = self.directory.for_network(source).await?.client();
        for table in self.private_route_tables_of(source).await? {
            match client
                .create_route(&table.id, &destination.cidr_block, connection_id)
                .await
            {
                Ok(()) => info!(
                    route_table_id = %table.id,
                    "Route creation succeeded for '{}'. Continuing.",
                    table.id
                ),
                Err(e) if e.is_client_error() => warn!(
                    route_table_id = %table.id,
                    "Route creation failed for '{}'. Error was: {}",
                    table.id,
                    e
                ),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub async fn destroy(&self) -> Result<()> {
        let Some(connection) = self.relationship.fetch().await? else {
            let (first, second) = self.relationship.networks();
            debug!(
                "No peering connection between: '{}' and: '{}'. No routes to remove.",
                first.id,
                second.id
            );
            return Ok(());
        };

        for direction in &self.directions {
            self.delete_routes_for(direction, &connection.id).await?;
        }
        Ok(())
    }

    async fn delete_routes_for(&self, direction: &RouteDirection, connection_id: &str) -> Result<()> {
        let RouteDirection { source, destination } = direction;
        info!(
            vpc_id = %source.id,
            peering_connection_id = %connection_id,
            "Removing routes from private subnets in: '{}' pointing at '{}:{}:{}'.",
            source.id,
            destination.id,
            destination.cidr_block,
            connection_id
        );

        let client = self.directory.for_network(source).await?.client();
        for table in self.private_route_tables_of(source).await? {
            let pertains = table
                .route_to(&destination.cidr_block)
                .map(|route| route.vpc_peering_connection_id.as_deref() == Some(connection_id));

            match pertains {
                None => {
                    debug!(
                        route_table_id = %table.id,
                        "No route to '{}' in '{}'. Continuing.",
                        destination.cidr_block,
                        table.id
                    );
                    continue;
                }
                Some(false) => {
                    info!(
                        route_table_id = %table.id,
                        "Route deletion skipped for '{}' as route does not pertain to VPC peering connection '{}'. Continuing.",
                        table.id,
                        connection_id
                    );
                    continue;
                }
                Some(true) => {}
            }

            match client.delete_route(&table.id, &destination.cidr_block).await {
                Ok(()) => info!(
                    route_table_id = %table.id,
                    "Route deletion succeeded for '{}'. Continuing.",
                    table.id
                ),
                Err(e) if e.is_client_error() => warn!(
                    route_table_id = %table.id,
                    "Route deletion failed for '{}'. Error was: {}",
                    table.id,
                    e
                ),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
