//! EC2 Query API Client
//!
//! Implements the gateway capability against the EC2 Query API for one
//! account (via its session) and one region.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

use super::query::QueryClient;
use crate::agents::auto_peering::gateways::{Ec2Api, Ec2Connector};
use crate::agents::auto_peering::identity::AwsCredentials;
use crate::agents::auto_peering::tags::TIER_TAG;
use crate::agents::auto_peering::types::{
    PeeringConnection, PeeringFilter, PeeringRequest, PeeringSide, PeeringStatus, RouteEntry,
    RouteTable, Tag, VpcDescription,
};
use crate::error::Result;

const EC2_VERSION: &str = "2016-11-15";

/// `<xxxSet><item/>..</xxxSet>`
#[derive(Debug, Deserialize)]
struct ItemSet<T> {
    #[serde(rename = "item", default = "Vec::new")]
    items: Vec<T>,
}

impl<T> Default for ItemSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
struct TagItem {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VpcItem {
    vpc_id: String,
    cidr_block: String,
    tag_set: Option<ItemSet<TagItem>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeVpcsResponse {
    #[serde(default)]
    vpc_set: ItemSet<VpcItem>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VpcInfo {
    vpc_id: String,
    owner_id: Option<String>,
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusInfo {
    code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeeringItem {
    vpc_peering_connection_id: String,
    requester_vpc_info: VpcInfo,
    accepter_vpc_info: VpcInfo,
    status: StatusInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribePeeringsResponse {
    #[serde(default)]
    vpc_peering_connection_set: ItemSet<PeeringItem>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePeeringResponse {
    vpc_peering_connection: PeeringItem,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteItem {
    destination_cidr_block: Option<String>,
    vpc_peering_connection_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteTableItem {
    route_table_id: String,
    vpc_id: String,
    #[serde(default)]
    route_set: ItemSet<RouteItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeRouteTablesResponse {
    #[serde(default)]
    route_table_set: ItemSet<RouteTableItem>,
    next_token: Option<String>,
}

impl From<VpcItem> for VpcDescription {
    fn from(item: VpcItem) -> Self {
        Self {
            vpc_id: item.vpc_id,
            cidr_block: item.cidr_block,
            tags: item.tag_set.map(|set| {
                set.items
                    .into_iter()
                    .map(|t| Tag {
                        key: t.key,
                        value: t.value,
                    })
                    .collect()
            }),
        }
    }
}

impl From<VpcInfo> for PeeringSide {
    fn from(info: VpcInfo) -> Self {
        Self {
            vpc_id: info.vpc_id,
            owner_id: info.owner_id,
            region: info.region,
        }
    }
}

impl From<PeeringItem> for PeeringConnection {
    fn from(item: PeeringItem) -> Self {
        Self {
            id: item.vpc_peering_connection_id,
            requester: item.requester_vpc_info.into(),
            accepter: item.accepter_vpc_info.into(),
            status: PeeringStatus::from_code(&item.status.code),
        }
    }
}

impl From<RouteTableItem> for RouteTable {
    fn from(item: RouteTableItem) -> Self {
        Self {
            id: item.route_table_id,
            vpc_id: item.vpc_id,
            routes: item
                .route_set
                .items
                .into_iter()
                .map(|r| RouteEntry {
                    destination_cidr_block: r.destination_cidr_block,
                    vpc_peering_connection_id: r.vpc_peering_connection_id,
                })
                .collect(),
        }
    }
}

fn param(name: &str, value: &str) -> (String, String) {
    (name.to_string(), value.to_string())
}

/// `Filter.N.Name` / `Filter.N.Value.1` pairs, numbered from 1.
fn filters(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .enumerate()
        .flat_map(|(i, (name, value))| {
            [
                (format!("Filter.{}.Name", i + 1), name.to_string()),
                (format!("Filter.{}.Value.1", i + 1), value.to_string()),
            ]
        })
        .collect()
}

fn decode_vpcs(body: &str) -> Result<(Vec<VpcDescription>, Option<String>)> {
    let response: DescribeVpcsResponse = quick_xml::de::from_str(body)?;
    Ok((
        response.vpc_set.items.into_iter().map(Into::into).collect(),
        response.next_token.filter(|t| !t.is_empty()),
    ))
}

fn decode_peerings(body: &str) -> Result<(Vec<PeeringConnection>, Option<String>)> {
    let response: DescribePeeringsResponse = quick_xml::de::from_str(body)?;
    Ok((
        response
            .vpc_peering_connection_set
            .items
            .into_iter()
            .map(Into::into)
            .collect(),
        response.next_token.filter(|t| !t.is_empty()),
    ))
}

fn decode_created_peering(body: &str) -> Result<PeeringConnection> {
    let response: CreatePeeringResponse = quick_xml::de::from_str(body)?;
    Ok(response.vpc_peering_connection.into())
}

fn decode_route_tables(body: &str) -> Result<(Vec<RouteTable>, Option<String>)> {
    let response: DescribeRouteTablesResponse = quick_xml::de::from_str(body)?;
    Ok((
        response.route_table_set.items.into_iter().map(Into::into).collect(),
        response.next_token.filter(|t| !t.is_empty()),
    ))
}

/// EC2 in one region, signed with one account's session.
pub struct Ec2QueryClient {
    client: QueryClient,
}

impl Ec2QueryClient {
    pub fn new(http: Client, credentials: AwsCredentials, region: &str) -> Self {
        Self {
            client: QueryClient::new(http, credentials, "ec2", EC2_VERSION, region),
        }
    }

    /// Follows `nextToken` until the last page.
    async fn paginate<T>(
        &self,
        action: &str,
        params: Vec<(String, String)>,
        decode: fn(&str) -> Result<(Vec<T>, Option<String>)>,
    ) -> Result<Vec<T>> {
        let mut all = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut page_params = params.clone();
            if let Some(token) = &next_token {
                page_params.push(param("NextToken", token));
            }

            let body = self.client.call(action, page_params).await?;
            let (items, token) = decode(&body)?;
            all.extend(items);

            match token {
                Some(token) => next_token = Some(token),
                None => return Ok(all),
            }
        }
    }
}

#[async_trait]
impl Ec2Api for Ec2QueryClient {
    async fn describe_vpcs(&self) -> Result<Vec<VpcDescription>> {
        self.paginate("DescribeVpcs", Vec::new(), decode_vpcs).await
    }

    async fn describe_peering_connections(
        &self,
        filter: &PeeringFilter,
    ) -> Result<Vec<PeeringConnection>> {
        let params = filters(&[
            ("accepter-vpc-info.vpc-id", filter.accepter_vpc_id.as_str()),
            ("requester-vpc-info.vpc-id", filter.requester_vpc_id.as_str()),
        ]);
        self.paginate("DescribeVpcPeeringConnections", params, decode_peerings)
            .await
    }

    async fn describe_peering_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<PeeringConnection>> {
        let body = self
            .client
            .call(
                "DescribeVpcPeeringConnections",
                vec![param("VpcPeeringConnectionId.1", connection_id)],
            )
            .await?;
        let (connections, _) = decode_peerings(&body)?;
        Ok(connections.into_iter().next())
    }

    async fn create_peering_connection(
        &self,
        request: &PeeringRequest,
    ) -> Result<PeeringConnection> {
        let body = self
            .client
            .call(
                "CreateVpcPeeringConnection",
                vec![
                    param("VpcId", &request.vpc_id),
                    param("PeerVpcId", &request.peer_vpc_id),
                    param("PeerOwnerId", &request.peer_owner_id),
                    param("PeerRegion", &request.peer_region),
                ],
            )
            .await?;
        decode_created_peering(&body)
    }

    async fn accept_peering_connection(&self, connection_id: &str) -> Result<()> {
        self.client
            .call(
                "AcceptVpcPeeringConnection",
                vec![param("VpcPeeringConnectionId", connection_id)],
            )
            .await?;
        Ok(())
    }

    async fn delete_peering_connection(&self, connection_id: &str) -> Result<()> {
        self.client
            .call(
                "DeleteVpcPeeringConnection",
                vec![param("VpcPeeringConnectionId", connection_id)],
            )
            .await?;
        Ok(())
    }

    async fn describe_route_tables(&self, vpc_id: &str, tier: &str) -> Result<Vec<RouteTable>> {
        let tier_filter = format!("tag:{}", TIER_TAG);
        let params = filters(&[("vpc-id", vpc_id), (tier_filter.as_str(), tier)]);
        self.paginate("DescribeRouteTables", params, decode_route_tables)
            .await
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr_block: &str,
        peering_connection_id: &str,
    ) -> Result<()> {
        self.client
            .call(
                "CreateRoute",
                vec![
                    param("RouteTableId", route_table_id),
                    param("DestinationCidrBlock", destination_cidr_block),
                    param("VpcPeeringConnectionId", peering_connection_id),
                ],
            )
            .await?;
        Ok(())
    }

    async fn delete_route(&self, route_table_id: &str, destination_cidr_block: &str) -> Result<()> {
        self.client
            .call(
                "DeleteRoute",
                vec![
                    param("RouteTableId", route_table_id),
                    param("DestinationCidrBlock", destination_cidr_block),
                ],
            )
            .await?;
        Ok(())
    }
}

/// Connects gateways to the real EC2 endpoints over a shared HTTP client.
pub struct QueryApiConnector {
    http: Client,
}

impl QueryApiConnector {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

impl Ec2Connector for QueryApiConnector {
    fn connect(&self, credentials: &AwsCredentials, region: &str) -> Arc<dyn Ec2Api> {
        Arc::new(Ec2QueryClient::new(self.http.clone(), credentials.clone(), region))
    }
}
