//! Auto-Peering Orchestrator
//!
//! Entry point for one trigger event: parse it, resolve the links of the
//! target network and perform the requested action on each of them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::event::{KeySchema, S3EventSnsMessage, TriggerAction};
use super::gateways::GatewayDirectory;
use super::link::{Link, LinkSummary};
use super::resolver::LinkResolver;
use crate::config::PeeringConfig;
use crate::error::Result;

/// Outcome of one invocation
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub invocation_id: Uuid,
    pub object_type: String,
    pub target_account_id: String,
    pub target_vpc_id: String,
    pub action: TriggerAction,
    pub links: Vec<LinkSummary>,
    pub timestamp: DateTime<Utc>,
}

pub struct AutoPeeringAgent {
    resolver: LinkResolver,
    key_schema: KeySchema,
    home_account_id: String,
}

impl AutoPeeringAgent {
    pub fn new(directory: Arc<GatewayDirectory>, config: &PeeringConfig) -> Self {
        info!(
            accounts = ?config.search_accounts,
            regions = ?config.search_regions,
            role = %config.peering_role_name,
            "AutoPeeringAgent initialized"
        );

        Self {
            resolver: LinkResolver::new(directory, config.wait),
            key_schema: config.key_schema,
            home_account_id: config.home_account_id.clone(),
        }
    }

    /// Processes one topic-wrapped bucket notification. Errors that reach
    /// this point fail the whole invocation.
    pub async fn handle(&self, event: &Value) -> Result<ReconcileReport> {
        let invocation_id = Uuid::new_v4();
        self.reconcile(invocation_id, event)
            .instrument(info_span!("invocation", %invocation_id))
            .await
    }

    async fn reconcile(&self, invocation_id: Uuid, event: &Value) -> Result<ReconcileReport> {
        debug!(event = %event, "Processing event");

        let message = S3EventSnsMessage::parse(event)?;
        let target = message.target(self.key_schema, &self.home_account_id)?;
        let trigger = message.action();

        let mut report = ReconcileReport {
            invocation_id,
            object_type: target.object_type.clone(),
            target_account_id: target.account_id.clone(),
            target_vpc_id: target.vpc_id.clone(),
            action: trigger,
            links: Vec::new(),
            timestamp: Utc::now(),
        };

        let Some(action) = trigger.action() else {
            warn!(
                event_name = %message.event_name(),
                vpc_id = %target.vpc_id,
                "Unrecognised event '{}'. Nothing to do.",
                message.event_name()
            );
            return Ok(report);
        };

        info!(
            object_type = %target.object_type,
            account_id = %target.account_id,
            vpc_id = %target.vpc_id,
            "'{}'ing peering connections for '{}'.",
            action,
            target.vpc_id
        );

        let mut links: Vec<Link> = self
            .resolver
            .resolve_for(&target.account_id, &target.vpc_id)
            .await?
            .into_iter()
            .collect();
        links.sort_by_key(|link| link.key());

        info!(
            vpc_id = %target.vpc_id,
            "Found {} VPC links for VPC with ID: '{}'.",
            links.len(),
            target.vpc_id
        );

        for link in &links {
            link.perform(action).await?;
            report.links.push(link.summary());
        }

        report.timestamp = Utc::now();
        Ok(report)
    }
}
