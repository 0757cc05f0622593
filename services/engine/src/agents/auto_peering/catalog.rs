//! Network Catalog
//!
//! Read model over every VPC reachable through a [`GatewayDirectory`],
//! decorated with tag-derived identity and dependency metadata.
//!
//! A catalog is built for exactly one resolution pass. Provider state is
//! fetched lazily on first query and memoized in a [`PassCache`] whose
//! lifetime is the catalog's own, so a new pass always observes fresh
//! provider state.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use super::gateways::{Ec2Gateway, GatewayDirectory};
use super::types::Network;
use crate::error::Result;

/// Query results keyed by their arguments, bounded to one pass.
#[derive(Default)]
struct PassCache {
    all: OnceCell<Arc<Vec<Network>>>,
    by_account: Mutex<HashMap<String, Arc<Vec<Network>>>>,
    by_identifier: Mutex<HashMap<String, Option<Network>>>,
}

pub struct NetworkCatalog {
    directory: Arc<GatewayDirectory>,
    cache: PassCache,
}

impl NetworkCatalog {
    pub fn new(directory: Arc<GatewayDirectory>) -> Self {
        Self {
            directory,
            cache: PassCache::default(),
        }
    }

    async fn fetch_from(gateways: &[Ec2Gateway]) -> Result<Vec<Network>> {
        let mut networks = Vec::new();

        for gateway in gateways {
            let descriptions = gateway.client().describe_vpcs().await?;
            debug!(
                account_id = %gateway.account_id,
                region = %gateway.region,
                count = descriptions.len(),
                "Fetched VPCs"
            );
            networks.extend(
                descriptions
                    .into_iter()
                    .map(|d| Network::from_description(d, &gateway.account_id, &gateway.region)),
            );
        }

        Ok(networks)
    }

    /// Every network across all gateways, in gateway order then provider
    /// order. Stable for the lifetime of this catalog.
    pub async fn find_all(&self) -> Result<Arc<Vec<Network>>> {
        self.cache
            .all
            .get_or_try_init(|| async {
                let gateways = self.directory.all().await?;
                let networks = Self::fetch_from(&gateways).await?;
                info!(count = networks.len(), "Catalogued VPCs across all gateways");
                Ok(Arc::new(networks))
            })
            .await
            .cloned()
    }

    async fn find_by_account_id(&self, account_id: &str) -> Result<Arc<Vec<Network>>> {
        let mut by_account = self.cache.by_account.lock().await;
        if let Some(networks) = by_account.get(account_id) {
            return Ok(networks.clone());
        }

        let gateways = self.directory.by_account_id(account_id).await?;
        let networks = Arc::new(Self::fetch_from(&gateways).await?);
        by_account.insert(account_id.to_string(), networks.clone());
        Ok(networks)
    }

    /// Looks `network_id` up in `account_id`'s gateways only.
    pub async fn find_by_account_and_id(
        &self,
        account_id: &str,
        network_id: &str,
    ) -> Result<Option<Network>> {
        Ok(self
            .find_by_account_id(account_id)
            .await?
            .iter()
            .find(|n| n.id == network_id)
            .cloned())
    }

    /// First network whose instance identifier equals `identifier`.
    pub async fn find_by_instance_identifier(&self, identifier: &str) -> Result<Option<Network>> {
        if let Some(found) = self.cache.by_identifier.lock().await.get(identifier) {
            return Ok(found.clone());
        }

        let found = self
            .find_all()
            .await?
            .iter()
            .find(|n| n.instance_identifier() == identifier)
            .cloned();

        self.cache
            .by_identifier
            .lock()
            .await
            .insert(identifier.to_string(), found.clone());
        Ok(found)
    }

    /// Networks named by `network`'s dependency list. Identifiers that match
    /// nothing are logged and dropped.
    pub async fn find_dependencies_of(&self, network: &Network) -> Result<Vec<Network>> {
        let mut dependencies = Vec::with_capacity(network.dependencies.len());

        for identifier in &network.dependencies {
            match self.find_by_instance_identifier(identifier).await? {
                Some(dependency) => dependencies.push(dependency),
                None => info!(
                    vpc_id = %network.id,
                    dependency = %identifier,
                    "Ignoring dependency '{}' of VPC '{}': no matching VPC found.",
                    identifier,
                    network.id
                ),
            }
        }

        Ok(dependencies)
    }

    /// Networks whose dependency list names `network`'s instance identifier.
    pub async fn find_dependents_of(&self, network: &Network) -> Result<Vec<Network>> {
        let identifier = network.instance_identifier();

        Ok(self
            .find_all()
            .await?
            .iter()
            .filter(|candidate| candidate.depends_on(&identifier))
            .cloned()
            .collect())
    }
}
