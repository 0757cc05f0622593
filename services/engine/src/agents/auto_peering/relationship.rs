//! Peering Relationship
//!
//! Accessor/mutator for the single peering connection joining two networks.
//! Nothing is persisted here; every operation re-reads provider state.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::gateways::{Ec2Gateway, GatewayDirectory};
use super::types::{Network, PeeringConnection, PeeringFilter, PeeringRequest, PeeringStatus};
use crate::error::{PeeringError, Result};

/// Bounded poll used while a freshly requested connection becomes visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            max_attempts: 10,
        }
    }
}

fn is_not_found(error: &PeeringError) -> bool {
    error.code().map_or(false, |code| code.ends_with(".NotFound"))
}

/// Peering between `first` (requester when provisioning) and `second`
/// (accepter).
pub struct PeeringRelationship {
    first: Network,
    second: Network,
    directory: Arc<GatewayDirectory>,
    wait: WaitPolicy,
}

impl PeeringRelationship {
    pub fn new(first: Network, second: Network, directory: Arc<GatewayDirectory>, wait: WaitPolicy) -> Self {
        Self {
            first,
            second,
            directory,
            wait,
        }
    }

    pub fn networks(&self) -> (&Network, &Network) {
        (&self.first, &self.second)
    }

    /// Probes accepter=first/requester=second, then the reverse, each
    /// through the accepter's gateway. Returns the first live connection
    /// together with the gateway that reported it.
    async fn locate(&self) -> Result<Option<(PeeringConnection, Ec2Gateway)>> {
        for (accepter, requester) in [(&self.first, &self.second), (&self.second, &self.first)] {
            let gateway = self.directory.for_network(accepter).await?;
            let filter = PeeringFilter {
                accepter_vpc_id: accepter.id.clone(),
                requester_vpc_id: requester.id.clone(),
            };

            let found = gateway
                .client()
                .describe_peering_connections(&filter)
                .await?
                .into_iter()
                .find(|connection| connection.status.is_live());

            if let Some(connection) = found {
                return Ok(Some((connection, gateway)));
            }
        }

        Ok(None)
    }

    pub async fn fetch(&self) -> Result<Option<PeeringConnection>> {
        Ok(self.locate().await?.map(|(connection, _)| connection))
    }

    /// (accepter, requester) networks of an existing connection.
    fn sides_of(&self, connection: &PeeringConnection) -> (&Network, &Network) {
        if connection.accepter.vpc_id == self.first.id {
            (&self.first, &self.second)
        } else {
            (&self.second, &self.first)
        }
    }

    pub async fn provision(&self) -> Result<()> {
        if let Some((connection, _)) = self.locate().await? {
            return match connection.status {
                PeeringStatus::Active => {
                    info!(
                        peering_connection_id = %connection.id,
                        "Peering connection between '{}' and '{}' already active.",
                        self.first.id,
                        self.second.id
                    );
                    Ok(())
                }
                PeeringStatus::PendingAcceptance => {
                    let (accepter, requester) = self.sides_of(&connection);
                    let accepter_gateway = self.directory.for_network(accepter).await?;
                    let requester_gateway = self.directory.for_network(requester).await?;
                    self.accept_or_compensate(&connection.id, &accepter_gateway, &requester_gateway)
                        .await
                }
                status => {
                    info!(
                        peering_connection_id = %connection.id,
                        status = %status,
                        "Peering connection between '{}' and '{}' still being set up.",
                        self.first.id,
                        self.second.id
                    );
                    Ok(())
                }
            };
        }

        let requester_gateway = self.directory.for_network(&self.first).await?;
        let accepter_gateway = self.directory.for_network(&self.second).await?;

        info!(
            requester_vpc_id = %self.first.id,
            accepter_vpc_id = %self.second.id,
            "Requesting peering connection between: '{}' and: '{}'.",
            self.first.id,
            self.second.id
        );
        let request = PeeringRequest {
            vpc_id: self.first.id.clone(),
            peer_vpc_id: self.second.id.clone(),
            peer_owner_id: self.second.account_id.clone(),
            peer_region: self.second.region.clone(),
        };
        let connection = requester_gateway
            .client()
            .create_peering_connection(&request)
            .await?;

        self.wait_until_exists(&accepter_gateway, &connection.id).await?;
        self.accept_or_compensate(&connection.id, &accepter_gateway, &requester_gateway)
            .await
    }

    async fn wait_until_exists(&self, gateway: &Ec2Gateway, connection_id: &str) -> Result<()> {
        let client = gateway.client();

        for attempt in 1..=self.wait.max_attempts {
            match client.describe_peering_connection(connection_id).await {
                Ok(Some(_)) => return Ok(()),
                Ok(None) => {}
                Err(e) if is_not_found(&e) => {}
                Err(e) => return Err(e),
            }

            debug!(
                peering_connection_id = %connection_id,
                attempt,
                "Waiting for peering connection to exist"
            );
            if attempt < self.wait.max_attempts {
                tokio::time::sleep(self.wait.delay).await;
            }
        }

        Err(PeeringError::WaitTimeout {
            connection_id: connection_id.to_string(),
            attempts: self.wait.max_attempts,
        })
    }

    /// Accepts through the accepter's gateway. A rejected acceptance deletes
    /// the connection through the requester's gateway and is not raised.
    async fn accept_or_compensate(
        &self,
        connection_id: &str,
        accepter: &Ec2Gateway,
        requester: &Ec2Gateway,
    ) -> Result<()> {
        match accepter.client().accept_peering_connection(connection_id).await {
            Ok(()) => {
                info!(
                    peering_connection_id = %connection_id,
                    "Accepted peering connection between: '{}' and: '{}'.",
                    self.first.id,
                    self.second.id
                );
                Ok(())
            }
            Err(e) if e.is_client_error() => {
                warn!(
                    peering_connection_id = %connection_id,
                    error = %e,
                    "Could not accept peering connection between: '{}' and: '{}'. Deleting it.",
                    self.first.id,
                    self.second.id
                );
                match requester.client().delete_peering_connection(connection_id).await {
                    Ok(()) => Ok(()),
                    Err(delete_error) if delete_error.is_client_error() => {
                        error!(
                            peering_connection_id = %connection_id,
                            error = %delete_error,
                            "Failed to delete unaccepted peering connection"
                        );
                        Ok(())
                    }
                    Err(delete_error) => Err(delete_error),
                }
            }
            Err(e) => Err(e),
        }
    }

    pub async fn destroy(&self) -> Result<()> {
        let Some((connection, gateway)) = self.locate().await? else {
            debug!(
                "No peering connection to destroy between: '{}' and: '{}'",
                self.first.id,
                self.second.id
            );
            return Ok(());
        };

        info!(
            peering_connection_id = %connection.id,
            "Destroying peering connection between: '{}' and: '{}'",
            connection.requester.vpc_id,
            connection.accepter.vpc_id
        );
        match gateway.client().delete_peering_connection(&connection.id).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!(peering_connection_id = %connection.id, "Peering connection already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
