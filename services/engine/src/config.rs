//! Engine configuration
//!
//! Every option can be given as a flag or through the environment. Empty
//! environment values count as unset.

use clap::Args;
use std::time::Duration;

use crate::agents::auto_peering::event::KeySchema;
use crate::agents::auto_peering::relationship::WaitPolicy;
use crate::agents::auto_peering::tags::split_and_strip;
use crate::error::{PeeringError, Result};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_PEERING_ROLE_NAME: &str = "vpc-auto-peering-role";

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Region the engine runs in
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Comma-separated regions to search for VPCs (default: home region)
    #[arg(long, env = "AWS_SEARCH_REGIONS")]
    pub search_regions: Option<String>,

    /// Comma-separated accounts to search for VPCs (default: caller account)
    #[arg(long, env = "AWS_SEARCH_ACCOUNTS")]
    pub search_accounts: Option<String>,

    /// Role assumed in every searched account
    #[arg(long, env = "AWS_PEERING_ROLE_NAME")]
    pub peering_role_name: Option<String>,

    /// Object key layout: "type/account/vpc" or "type/vpc"
    #[arg(long, env = "AUTO_PEERING_KEY_SCHEMA")]
    pub key_schema: Option<String>,

    /// Seconds between peering connection existence checks
    #[arg(long, env = "AUTO_PEERING_WAIT_DELAY_SECS")]
    pub wait_delay_secs: Option<String>,

    /// Existence checks before giving up
    #[arg(long, env = "AUTO_PEERING_WAIT_MAX_ATTEMPTS")]
    pub wait_max_attempts: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(value: &Option<String>, name: &str, default: T) -> Result<T> {
    match non_empty(value) {
        Some(raw) => raw
            .parse()
            .map_err(|_| PeeringError::Config(format!("{} must be a non-negative integer, got '{}'", name, raw))),
        None => Ok(default),
    }
}

/// Fully resolved settings for one engine instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeeringConfig {
    pub home_region: String,
    pub home_account_id: String,
    pub search_regions: Vec<String>,
    pub search_accounts: Vec<String>,
    pub peering_role_name: String,
    pub key_schema: KeySchema,
    pub wait: WaitPolicy,
}

impl ConfigArgs {
    pub fn home_region(&self) -> String {
        non_empty(&self.region).unwrap_or(DEFAULT_REGION).to_string()
    }

    /// `caller_account_id` is the account the base credentials belong to.
    pub fn resolve(&self, caller_account_id: &str) -> Result<PeeringConfig> {
        let home_region = self.home_region();

        let search_regions = split_and_strip(non_empty(&self.search_regions).unwrap_or(&home_region));
        if search_regions.is_empty() {
            return Err(PeeringError::Config("no regions to search".to_string()));
        }
        let search_accounts = split_and_strip(non_empty(&self.search_accounts).unwrap_or(caller_account_id));
        if search_accounts.is_empty() {
            return Err(PeeringError::Config("no accounts to search".to_string()));
        }

        let key_schema = match non_empty(&self.key_schema) {
            Some(raw) => raw.parse()?,
            None => KeySchema::default(),
        };

        let defaults = WaitPolicy::default();
        let wait = WaitPolicy {
            delay: Duration::from_secs(parse_number(
                &self.wait_delay_secs,
                "AUTO_PEERING_WAIT_DELAY_SECS",
                defaults.delay.as_secs(),
            )?),
            max_attempts: parse_number(
                &self.wait_max_attempts,
                "AUTO_PEERING_WAIT_MAX_ATTEMPTS",
                defaults.max_attempts,
            )?,
        };
        if wait.max_attempts == 0 {
            return Err(PeeringError::Config(
                "AUTO_PEERING_WAIT_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(PeeringConfig {
            home_region,
            home_account_id: caller_account_id.to_string(),
            search_regions,
            search_accounts,
            peering_role_name: non_empty(&self.peering_role_name)
                .unwrap_or(DEFAULT_PEERING_ROLE_NAME)
                .to_string(),
            key_schema,
            wait,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = ConfigArgs::default().resolve("111122223333").unwrap();

        assert_eq!(
            config,
            PeeringConfig {
                home_region: "us-east-1".to_string(),
                home_account_id: "111122223333".to_string(),
                search_regions: vec!["us-east-1".to_string()],
                search_accounts: vec!["111122223333".to_string()],
                peering_role_name: "vpc-auto-peering-role".to_string(),
                key_schema: KeySchema::TypeAccountVpc,
                wait: WaitPolicy {
                    delay: Duration::from_secs(2),
                    max_attempts: 10,
                },
            }
        );
    }

    #[test]
    fn test_search_lists_default_to_home_region() {
        let args = ConfigArgs {
            region: Some("eu-west-1".to_string()),
            ..Default::default()
        };

        let config = args.resolve("111122223333").unwrap();

        assert_eq!(config.search_regions, vec!["eu-west-1"]);
    }

    #[test]
    fn test_explicit_values() {
        let args = ConfigArgs {
            region: Some("eu-west-1".to_string()),
            search_regions: Some("eu-west-1, eu-west-2,,".to_string()),
            search_accounts: Some("111122223333,444455556666".to_string()),
            peering_role_name: Some("custom-role".to_string()),
            key_schema: Some("type/vpc".to_string()),
            wait_delay_secs: Some("0".to_string()),
            wait_max_attempts: Some("4".to_string()),
        };

        let config = args.resolve("999999999999").unwrap();

        assert_eq!(config.search_regions, vec!["eu-west-1", "eu-west-2"]);
        assert_eq!(config.search_accounts, vec!["111122223333", "444455556666"]);
        assert_eq!(config.peering_role_name, "custom-role");
        assert_eq!(config.key_schema, KeySchema::TypeVpc);
        assert_eq!(config.wait.delay, Duration::ZERO);
        assert_eq!(config.wait.max_attempts, 4);
        assert_eq!(config.home_account_id, "999999999999");
    }

    #[test]
    fn test_empty_values_count_as_unset() {
        let args = ConfigArgs {
            region: Some(String::new()),
            search_regions: Some("  ".to_string()),
            search_accounts: Some(String::new()),
            peering_role_name: Some(String::new()),
            key_schema: Some(String::new()),
            wait_delay_secs: Some(String::new()),
            wait_max_attempts: Some(String::new()),
        };

        let config = args.resolve("111122223333").unwrap();

        assert_eq!(config, ConfigArgs::default().resolve("111122223333").unwrap());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let bad_schema = ConfigArgs {
            key_schema: Some("account/vpc".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad_schema.resolve("1"), Err(PeeringError::Config(_))));

        let bad_delay = ConfigArgs {
            wait_delay_secs: Some("soon".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad_delay.resolve("1"), Err(PeeringError::Config(_))));

        let no_regions = ConfigArgs {
            search_regions: Some(",".to_string()),
            ..Default::default()
        };
        assert!(matches!(no_regions.resolve("1"), Err(PeeringError::Config(_))));

        let no_accounts = ConfigArgs {
            search_accounts: Some(" , ".to_string()),
            ..Default::default()
        };
        assert!(matches!(no_accounts.resolve("1"), Err(PeeringError::Config(_))));

        let no_attempts = ConfigArgs {
            wait_max_attempts: Some("0".to_string()),
            ..Default::default()
        };
        assert!(matches!(no_attempts.resolve("1"), Err(PeeringError::Config(_))));
    }
}
