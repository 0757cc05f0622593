//! Link Resolver
//!
//! Computes the deduplicated set of links a target network needs, from the
//! dependency declarations on both sides.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::catalog::NetworkCatalog;
use super::gateways::GatewayDirectory;
use super::link::{Link, LinkKind};
use super::relationship::WaitPolicy;
use super::types::Network;
use crate::error::Result;

fn ids(networks: &[Network]) -> Vec<&str> {
    networks.iter().map(|n| n.id.as_str()).collect()
}

pub struct LinkResolver {
    directory: Arc<GatewayDirectory>,
    wait: WaitPolicy,
}

impl LinkResolver {
    pub fn new(directory: Arc<GatewayDirectory>, wait: WaitPolicy) -> Self {
        Self { directory, wait }
    }

    /// Every call builds its own catalog, so each resolution observes
    /// current provider state.
    pub async fn resolve_for(&self, account_id: &str, vpc_id: &str) -> Result<HashSet<Link>> {
        let catalog = NetworkCatalog::new(self.directory.clone());

        let Some(target) = catalog.find_by_account_and_id(account_id, vpc_id).await? else {
            info!(
                account_id = %account_id,
                vpc_id = %vpc_id,
                "No VPC found with ID: '{}'. Aborting.",
                vpc_id
            );
            return Ok(HashSet::new());
        };
        info!(
            account_id = %account_id,
            vpc_id = %target.id,
            "Found target VPC with ID: '{}', component: '{}', deployment identifier: '{}' and dependencies: {:?}.",
            target.id,
            target.component,
            target.deployment_identifier,
            target.dependencies
        );

        let dependencies = Self::without_self(&target, catalog.find_dependencies_of(&target).await?, "dependency");
        info!(vpc_id = %target.id, "Found dependency VPCs: {:?}", ids(&dependencies));

        let dependents = Self::without_self(&target, catalog.find_dependents_of(&target).await?, "dependent");
        info!(vpc_id = %target.id, "Found dependent VPCs: {:?}", ids(&dependents));

        let mut links = HashSet::new();

        for dependency in &dependencies {
            let kind = if dependents.contains(dependency) {
                LinkKind::Bidirectional
            } else {
                LinkKind::DependencyOnly
            };
            links.insert(self.link(&target, dependency, kind));
        }

        for dependent in dependents.iter().filter(|d| !dependencies.contains(d)) {
            links.insert(self.link(dependent, &target, LinkKind::DependentOnly));
        }

        info!(vpc_id = %target.id, count = links.len(), "Resolved links");
        Ok(links)
    }

    fn link(&self, first: &Network, second: &Network, kind: LinkKind) -> Link {
        Link::new(first.clone(), second.clone(), kind, self.directory.clone(), self.wait)
    }

    /// A network naming its own instance identifier would yield a link to
    /// itself; such references are dropped.
    fn without_self(target: &Network, networks: Vec<Network>, relation: &str) -> Vec<Network> {
        networks
            .into_iter()
            .filter(|n| {
                let is_self = n == target;
                if is_self {
                    warn!(
                        vpc_id = %target.id,
                        "VPC '{}' lists itself as a {}. Ignoring.",
                        target.id,
                        relation
                    );
                }
                !is_self
            })
            .collect()
    }
}
