//! In-memory provider used by unit tests.
//!
//! `FakeCloud` plays STS and EC2 for every account and region at once. The
//! sessions it hands out carry the account id as their access key, which is
//! how its EC2 clients know which account they act for. Every EC2 call is
//! recorded so tests can assert on ordering.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::agents::auto_peering::gateways::{Ec2Api, Ec2Connector, GatewayDirectory};
use crate::agents::auto_peering::identity::{AwsCredentials, CredentialBroker, RoleAssumer};
use crate::agents::auto_peering::relationship::WaitPolicy;
use crate::agents::auto_peering::types::{
    Network, PeeringConnection, PeeringFilter, PeeringRequest, PeeringSide, PeeringStatus,
    RouteEntry, RouteTable, Tag, VpcDescription,
};
use crate::error::{PeeringError, Result};

pub const ACCOUNT_A: &str = "111122223333";
pub const ACCOUNT_B: &str = "444455556666";
pub const REGION_1: &str = "eu-west-1";
pub const REGION_2: &str = "eu-west-2";

/// A recorded EC2 call: (account, region, operation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub account_id: String,
    pub region: String,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    DescribeVpcs,
    DescribePeeringConnections { accepter: String, requester: String },
    DescribePeeringConnection { id: String },
    CreatePeeringConnection(PeeringRequest),
    AcceptPeeringConnection { id: String },
    DeletePeeringConnection { id: String },
    DescribeRouteTables { vpc_id: String, tier: String },
    CreateRoute { route_table_id: String, destination: String, peering_connection_id: String },
    DeleteRoute { route_table_id: String, destination: String },
}

/// Injected failure for a route-table call
#[derive(Debug, Clone)]
enum RouteFailure {
    Provider(String),
    Undecodable,
}

impl RouteFailure {
    fn into_error(self, what: &str) -> PeeringError {
        match self {
            Self::Provider(code) => PeeringError::provider(code, format!("{} refused", what)),
            Self::Undecodable => PeeringError::Decode(format!("{} response was not XML", what)),
        }
    }
}

struct FakeRouteTable {
    account_id: String,
    region: String,
    tier: String,
    table: RouteTable,
}

#[derive(Default)]
struct CloudState {
    vpcs: Vec<(String, String, VpcDescription)>,
    peerings: Vec<PeeringConnection>,
    route_tables: Vec<FakeRouteTable>,
    calls: Vec<Call>,
    assumed_roles: Vec<(String, String)>,
    denied_accounts: HashSet<String>,
    failing_route_creations: HashMap<String, RouteFailure>,
    failing_route_deletions: HashMap<String, RouteFailure>,
    acceptance_failure: Option<String>,
    never_exists: bool,
    next_id: u32,
}

#[derive(Default)]
pub struct FakeCloud {
    state: Arc<Mutex<CloudState>>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CloudState> {
        self.state.lock().unwrap()
    }

    /// Adds a tagged VPC and returns the decorated network.
    pub fn add_vpc(
        &self,
        account_id: &str,
        region: &str,
        vpc_id: &str,
        cidr_block: &str,
        component: &str,
        deployment_identifier: &str,
        dependencies: &[&str],
    ) -> Network {
        let description = VpcDescription {
            vpc_id: vpc_id.to_string(),
            cidr_block: cidr_block.to_string(),
            tags: Some(vec![
                Tag::new("Component", component),
                Tag::new("DeploymentIdentifier", deployment_identifier),
                Tag::new("Dependencies", &dependencies.join(",")),
            ]),
        };
        self.add_vpc_description(account_id, region, description.clone());
        Network::from_description(description, account_id, region)
    }

    pub fn add_vpc_description(&self, account_id: &str, region: &str, description: VpcDescription) {
        self.state()
            .vpcs
            .push((account_id.to_string(), region.to_string(), description));
    }

    pub fn add_route_table(&self, network: &Network, route_table_id: &str, tier: &str) {
        self.state().route_tables.push(FakeRouteTable {
            account_id: network.account_id.clone(),
            region: network.region.clone(),
            tier: tier.to_string(),
            table: RouteTable {
                id: route_table_id.to_string(),
                vpc_id: network.id.clone(),
                routes: Vec::new(),
            },
        });
    }

    pub fn add_route(&self, route_table_id: &str, destination: &str, peering_connection_id: Option<&str>) {
        let mut state = self.state();
        if let Some(table) = state
            .route_tables
            .iter_mut()
            .find(|t| t.table.id == route_table_id)
        {
            table.table.routes.push(RouteEntry {
                destination_cidr_block: Some(destination.to_string()),
                vpc_peering_connection_id: peering_connection_id.map(str::to_string),
            });
        }
    }

    /// Seeds an existing connection from `requester` to `accepter`.
    pub fn add_peering(
        &self,
        id: &str,
        requester: &Network,
        accepter: &Network,
        status: PeeringStatus,
    ) {
        self.state().peerings.push(PeeringConnection {
            id: id.to_string(),
            requester: side_of(requester),
            accepter: side_of(accepter),
            status,
        });
    }

    pub fn deny_role_assumption(&self, account_id: &str) {
        self.state().denied_accounts.insert(account_id.to_string());
    }

    pub fn fail_route_creation(&self, route_table_id: &str, code: &str) {
        self.state().failing_route_creations.insert(
            route_table_id.to_string(),
            RouteFailure::Provider(code.to_string()),
        );
    }

    /// Route creation in `route_table_id` fails with a non-provider error.
    pub fn garble_route_creation(&self, route_table_id: &str) {
        self.state()
            .failing_route_creations
            .insert(route_table_id.to_string(), RouteFailure::Undecodable);
    }

    pub fn fail_route_deletion(&self, route_table_id: &str, code: &str) {
        self.state().failing_route_deletions.insert(
            route_table_id.to_string(),
            RouteFailure::Provider(code.to_string()),
        );
    }

    pub fn fail_acceptance(&self, code: &str) {
        self.state().acceptance_failure = Some(code.to_string());
    }

    /// Newly created connections never become visible to describe-by-id.
    pub fn never_exists(&self) {
        self.state().never_exists = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.calls().into_iter().map(|c| c.operation).collect()
    }

    pub fn assumed_roles(&self) -> Vec<(String, String)> {
        self.state().assumed_roles.clone()
    }

    pub fn peerings(&self) -> Vec<PeeringConnection> {
        self.state().peerings.clone()
    }

    pub fn routes_in(&self, route_table_id: &str) -> Vec<RouteEntry> {
        self.state()
            .route_tables
            .iter()
            .find(|t| t.table.id == route_table_id)
            .map(|t| t.table.routes.clone())
            .unwrap_or_default()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

fn side_of(network: &Network) -> PeeringSide {
    PeeringSide {
        vpc_id: network.id.clone(),
        owner_id: Some(network.account_id.clone()),
        region: Some(network.region.clone()),
    }
}

fn account_from_role_arn(role_arn: &str) -> String {
    role_arn
        .trim_start_matches("arn:aws:iam::")
        .split(':')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl RoleAssumer for FakeCloud {
    async fn assume_role(&self, role_arn: &str, session_name: &str) -> Result<AwsCredentials> {
        let account_id = account_from_role_arn(role_arn);
        let mut state = self.state();
        state
            .assumed_roles
            .push((role_arn.to_string(), session_name.to_string()));

        if state.denied_accounts.contains(&account_id) {
            return Err(PeeringError::provider(
                "AccessDenied",
                format!("not authorized to assume {}", role_arn),
            ));
        }

        Ok(AwsCredentials {
            access_key_id: account_id,
            secret_access_key: "fake-secret".to_string(),
            session_token: Some("fake-token".to_string()),
            expires_at: None,
        })
    }
}

impl Ec2Connector for FakeCloud {
    fn connect(&self, credentials: &AwsCredentials, region: &str) -> Arc<dyn Ec2Api> {
        Arc::new(FakeEc2 {
            state: self.state.clone(),
            account_id: credentials.access_key_id.clone(),
            region: region.to_string(),
        })
    }
}

struct FakeEc2 {
    state: Arc<Mutex<CloudState>>,
    account_id: String,
    region: String,
}

impl FakeEc2 {
    fn state(&self) -> std::sync::MutexGuard<'_, CloudState> {
        self.state.lock().unwrap()
    }

    fn record(&self, state: &mut CloudState, operation: Operation) {
        state.calls.push(Call {
            account_id: self.account_id.clone(),
            region: self.region.clone(),
            operation,
        });
    }
}

#[async_trait]
impl Ec2Api for FakeEc2 {
    async fn describe_vpcs(&self) -> Result<Vec<VpcDescription>> {
        let mut state = self.state();
        self.record(&mut state, Operation::DescribeVpcs);
        Ok(state
            .vpcs
            .iter()
            .filter(|(account, region, _)| *account == self.account_id && *region == self.region)
            .map(|(_, _, vpc)| vpc.clone())
            .collect())
    }

    async fn describe_peering_connections(
        &self,
        filter: &PeeringFilter,
    ) -> Result<Vec<PeeringConnection>> {
        let mut state = self.state();
        self.record(
            &mut state,
            Operation::DescribePeeringConnections {
                accepter: filter.accepter_vpc_id.clone(),
                requester: filter.requester_vpc_id.clone(),
            },
        );
        Ok(state
            .peerings
            .iter()
            .filter(|p| {
                p.accepter.vpc_id == filter.accepter_vpc_id
                    && p.requester.vpc_id == filter.requester_vpc_id
            })
            .cloned()
            .collect())
    }

    async fn describe_peering_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<PeeringConnection>> {
        let mut state = self.state();
        self.record(
            &mut state,
            Operation::DescribePeeringConnection {
                id: connection_id.to_string(),
            },
        );
        if state.never_exists {
            return Err(PeeringError::provider(
                "InvalidVpcPeeringConnectionID.NotFound",
                format!("{} does not exist", connection_id),
            ));
        }
        Ok(state.peerings.iter().find(|p| p.id == connection_id).cloned())
    }

    async fn create_peering_connection(
        &self,
        request: &PeeringRequest,
    ) -> Result<PeeringConnection> {
        let mut state = self.state();
        self.record(&mut state, Operation::CreatePeeringConnection(request.clone()));
        state.next_id += 1;
        let connection = PeeringConnection {
            id: format!("pcx-{:08}", state.next_id),
            requester: PeeringSide {
                vpc_id: request.vpc_id.clone(),
                owner_id: Some(self.account_id.clone()),
                region: Some(self.region.clone()),
            },
            accepter: PeeringSide {
                vpc_id: request.peer_vpc_id.clone(),
                owner_id: Some(request.peer_owner_id.clone()),
                region: Some(request.peer_region.clone()),
            },
            status: PeeringStatus::PendingAcceptance,
        };
        state.peerings.push(connection.clone());
        Ok(connection)
    }

    async fn accept_peering_connection(&self, connection_id: &str) -> Result<()> {
        let mut state = self.state();
        self.record(
            &mut state,
            Operation::AcceptPeeringConnection {
                id: connection_id.to_string(),
            },
        );
        if let Some(code) = state.acceptance_failure.clone() {
            return Err(PeeringError::provider(code, "acceptance refused"));
        }
        match state.peerings.iter_mut().find(|p| p.id == connection_id) {
            Some(peering) => {
                peering.status = PeeringStatus::Active;
                Ok(())
            }
            None => Err(PeeringError::provider(
                "InvalidVpcPeeringConnectionID.NotFound",
                connection_id,
            )),
        }
    }

    async fn delete_peering_connection(&self, connection_id: &str) -> Result<()> {
        let mut state = self.state();
        self.record(
            &mut state,
            Operation::DeletePeeringConnection {
                id: connection_id.to_string(),
            },
        );
        match state.peerings.iter_mut().find(|p| p.id == connection_id) {
            Some(peering) => {
                peering.status = PeeringStatus::Deleted;
                Ok(())
            }
            None => Err(PeeringError::provider(
                "InvalidVpcPeeringConnectionID.NotFound",
                connection_id,
            )),
        }
    }

    async fn describe_route_tables(&self, vpc_id: &str, tier: &str) -> Result<Vec<RouteTable>> {
        let mut state = self.state();
        self.record(
            &mut state,
            Operation::DescribeRouteTables {
                vpc_id: vpc_id.to_string(),
                tier: tier.to_string(),
            },
        );
        Ok(state
            .route_tables
            .iter()
            .filter(|t| {
                t.account_id == self.account_id
                    && t.region == self.region
                    && t.table.vpc_id == vpc_id
                    && t.tier == tier
            })
            .map(|t| t.table.clone())
            .collect())
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr_block: &str,
        peering_connection_id: &str,
    ) -> Result<()> {
        let mut state = self.state();
        self.record(
            &mut state,
            Operation::CreateRoute {
                route_table_id: route_table_id.to_string(),
                destination: destination_cidr_block.to_string(),
                peering_connection_id: peering_connection_id.to_string(),
            },
        );
        if let Some(failure) = state.failing_route_creations.get(route_table_id).cloned() {
            return Err(failure.into_error("route creation"));
        }
        let table = state
            .route_tables
            .iter_mut()
            .find(|t| t.table.id == route_table_id)
            .ok_or_else(|| PeeringError::provider("InvalidRouteTableID.NotFound", route_table_id))?;
        if table.table.route_to(destination_cidr_block).is_some() {
            return Err(PeeringError::provider(
                "RouteAlreadyExists",
                format!("route to {} already exists", destination_cidr_block),
            ));
        }
        table.table.routes.push(RouteEntry {
            destination_cidr_block: Some(destination_cidr_block.to_string()),
            vpc_peering_connection_id: Some(peering_connection_id.to_string()),
        });
        Ok(())
    }

    async fn delete_route(&self, route_table_id: &str, destination_cidr_block: &str) -> Result<()> {
        let mut state = self.state();
        self.record(
            &mut state,
            Operation::DeleteRoute {
                route_table_id: route_table_id.to_string(),
                destination: destination_cidr_block.to_string(),
            },
        );
        if let Some(failure) = state.failing_route_deletions.get(route_table_id).cloned() {
            return Err(failure.into_error("route deletion"));
        }
        let table = state
            .route_tables
            .iter_mut()
            .find(|t| t.table.id == route_table_id)
            .ok_or_else(|| PeeringError::provider("InvalidRouteTableID.NotFound", route_table_id))?;
        let before = table.table.routes.len();
        table
            .table
            .routes
            .retain(|r| r.destination_cidr_block.as_deref() != Some(destination_cidr_block));
        if table.table.routes.len() == before {
            return Err(PeeringError::provider("InvalidRoute.NotFound", destination_cidr_block));
        }
        Ok(())
    }
}

/// Directory over `cloud` spanning both test accounts and regions.
pub fn directory(cloud: &Arc<FakeCloud>) -> Arc<GatewayDirectory> {
    directory_for(
        cloud,
        &[ACCOUNT_A, ACCOUNT_B],
        &[REGION_1, REGION_2],
    )
}

pub fn directory_for(cloud: &Arc<FakeCloud>, accounts: &[&str], regions: &[&str]) -> Arc<GatewayDirectory> {
    let broker = Arc::new(CredentialBroker::new(cloud.clone(), "vpc-auto-peering-role"));
    Arc::new(GatewayDirectory::new(
        broker,
        cloud.clone(),
        accounts.iter().map(|a| a.to_string()).collect(),
        regions.iter().map(|r| r.to_string()).collect(),
    ))
}

pub fn no_wait() -> WaitPolicy {
    WaitPolicy {
        delay: Duration::ZERO,
        max_attempts: 3,
    }
}

/// Topic-wrapped bucket notification for `key`.
pub fn bucket_event(event_name: &str, key: &str) -> serde_json::Value {
    let message = serde_json::json!({
        "Records": [{
            "eventVersion": "2.0",
            "eventSource": "aws:s3",
            "eventName": event_name,
            "s3": {
                "bucket": { "name": "infrastructure-events" },
                "object": { "key": key, "size": 0 }
            }
        }]
    });
    serde_json::json!({
        "Records": [{
            "EventSource": "aws:sns",
            "Sns": {
                "Type": "Notification",
                "Message": message.to_string()
            }
        }]
    })
}

/// Captures formatted `tracing` output for the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
