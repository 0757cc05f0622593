//! Gateway Directory
//!
//! Per-(account, region) EC2 gateways built from broker-issued sessions,
//! and the provider capability they expose.

use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use super::identity::{AwsCredentials, CredentialBroker};
use super::types::{
    Network, PeeringConnection, PeeringFilter, PeeringRequest, RouteTable, VpcDescription,
};
use crate::error::Result;

/// Low-level EC2 operations scoped to one account and region
#[async_trait]
pub trait Ec2Api: Send + Sync {
    /// All VPCs visible in this account/region
    async fn describe_vpcs(&self) -> Result<Vec<VpcDescription>>;

    /// Peering connections matching an accepter/requester VPC pair
    async fn describe_peering_connections(
        &self,
        filter: &PeeringFilter,
    ) -> Result<Vec<PeeringConnection>>;

    /// A single peering connection by id, `None` if the provider does not
    /// know it (yet)
    async fn describe_peering_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<PeeringConnection>>;

    async fn create_peering_connection(
        &self,
        request: &PeeringRequest,
    ) -> Result<PeeringConnection>;

    async fn accept_peering_connection(&self, connection_id: &str) -> Result<()>;

    async fn delete_peering_connection(&self, connection_id: &str) -> Result<()>;

    /// Route tables of `vpc_id` carrying the `Tier=<tier>` tag
    async fn describe_route_tables(&self, vpc_id: &str, tier: &str) -> Result<Vec<RouteTable>>;

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr_block: &str,
        peering_connection_id: &str,
    ) -> Result<()>;

    async fn delete_route(&self, route_table_id: &str, destination_cidr_block: &str)
        -> Result<()>;
}

/// Builds an [`Ec2Api`] bound to a session and region
pub trait Ec2Connector: Send + Sync {
    fn connect(&self, credentials: &AwsCredentials, region: &str) -> Arc<dyn Ec2Api>;
}

/// An (account, region) gateway. Cheap to construct; the client is built
/// on first use.
#[derive(Clone)]
pub struct Ec2Gateway {
    pub account_id: String,
    pub region: String,
    session: Arc<AwsCredentials>,
    connector: Arc<dyn Ec2Connector>,
    client: OnceLock<Arc<dyn Ec2Api>>,
}

impl Ec2Gateway {
    pub fn new(
        account_id: &str,
        region: &str,
        session: Arc<AwsCredentials>,
        connector: Arc<dyn Ec2Connector>,
    ) -> Self {
        Self {
            account_id: account_id.to_string(),
            region: region.to_string(),
            session,
            connector,
            client: OnceLock::new(),
        }
    }

    pub fn client(&self) -> Arc<dyn Ec2Api> {
        self.client
            .get_or_init(|| self.connector.connect(&self.session, &self.region))
            .clone()
    }
}

impl std::fmt::Debug for Ec2Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ec2Gateway")
            .field("account_id", &self.account_id)
            .field("region", &self.region)
            .finish()
    }
}

impl PartialEq for Ec2Gateway {
    fn eq(&self, other: &Self) -> bool {
        self.account_id == other.account_id && self.region == other.region
    }
}

impl Eq for Ec2Gateway {}

impl Hash for Ec2Gateway {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.account_id.hash(state);
        self.region.hash(state);
    }
}

/// Enumerates gateways over the configured accounts × regions
pub struct GatewayDirectory {
    broker: Arc<CredentialBroker>,
    connector: Arc<dyn Ec2Connector>,
    account_ids: Vec<String>,
    regions: Vec<String>,
}

impl GatewayDirectory {
    pub fn new(
        broker: Arc<CredentialBroker>,
        connector: Arc<dyn Ec2Connector>,
        account_ids: Vec<String>,
        regions: Vec<String>,
    ) -> Self {
        Self {
            broker,
            connector,
            account_ids,
            regions,
        }
    }

    pub fn account_ids(&self) -> &[String] {
        &self.account_ids
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    /// Cross product of configured accounts and regions, account-major.
    pub async fn all(&self) -> Result<Vec<Ec2Gateway>> {
        let mut gateways = Vec::with_capacity(self.account_ids.len() * self.regions.len());
        for account_id in &self.account_ids {
            gateways.extend(self.by_account_id(account_id).await?);
        }
        Ok(gateways)
    }

    /// One gateway per configured region for `account_id`.
    pub async fn by_account_id(&self, account_id: &str) -> Result<Vec<Ec2Gateway>> {
        let session = self.broker.session_for(account_id).await?;

        Ok(self
            .regions
            .iter()
            .map(|region| Ec2Gateway::new(account_id, region, session.clone(), self.connector.clone()))
            .collect())
    }

    pub async fn by_account_id_and_region(&self, account_id: &str, region: &str) -> Result<Ec2Gateway> {
        let session = self.broker.session_for(account_id).await?;
        Ok(Ec2Gateway::new(account_id, region, session, self.connector.clone()))
    }

    /// Gateway owning `network`.
    pub async fn for_network(&self, network: &Network) -> Result<Ec2Gateway> {
        self.by_account_id_and_region(&network.account_id, &network.region)
            .await
    }
}
