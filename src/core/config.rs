use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};
use super::types::{Address, Distance};
use super::{DEFAULT_LINK_COST, NO_ROUTE_DISTANCE};

/// Configuration for a mesh node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broadcast name prefix of a node that holds an id
    pub assigned_prefix: String,
    /// Broadcast name prefix of a node still waiting for the token
    pub unassigned_prefix: String,
    /// Address a node takes while it is the broadcaster of a link
    pub broadcaster_address: Address,
    /// Address a node takes while it is attached as a listener
    pub listener_address: Address,
    /// Cost of one hop to a neighbor
    pub link_cost: Distance,
    /// Upper bound on a single attach attempt
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub connect_timeout: Duration,
    /// Wait before a discovery scan so the previous token holder can broadcast again
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub settle_delay: Duration,
    /// Delay after receiving a distance vector before answering, to absorb bursts
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub dv_coalesce_delay: Duration,
    /// Lower bound of the randomized rescan cooldown
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub cooldown_min: Duration,
    /// Upper bound of the randomized rescan cooldown
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub cooldown_max: Duration,
    /// Tick of the runtime loop
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub poll_interval: Duration,
    /// Seed for the cooldown jitter; random when unset
    pub rng_seed: Option<u64>,
    /// Whether the root starts distance-vector routing once every id is assigned
    pub auto_start_routing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            assigned_prefix: "picow".to_string(),
            unassigned_prefix: "pidog".to_string(),
            broadcaster_address: Address::new("192.168.4.1"),
            listener_address: Address::new("192.168.4.10"),
            link_cost: DEFAULT_LINK_COST,
            connect_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(1),
            dv_coalesce_delay: Duration::from_secs(10),
            cooldown_min: Duration::from_secs(15),
            cooldown_max: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            rng_seed: None,
            auto_start_routing: true,
        }
    }
}

impl Config {
    /// Checks that the configuration is consistent
    pub fn validate(&self) -> Result<()> {
        for prefix in [&self.assigned_prefix, &self.unassigned_prefix] {
            if prefix.is_empty() {
                return Err(Error::config("name prefix must not be empty"));
            }
            if prefix.contains(['_', ';']) {
                return Err(Error::config(format!(
                    "name prefix {:?} must not contain '_' or ';'",
                    prefix
                )));
            }
        }
        if self.assigned_prefix == self.unassigned_prefix {
            return Err(Error::config("assigned and unassigned prefixes must differ"));
        }
        if self.broadcaster_address == self.listener_address {
            return Err(Error::config("broadcaster and listener addresses must differ"));
        }
        if self.link_cost == 0 || self.link_cost >= NO_ROUTE_DISTANCE {
            return Err(Error::config(format!(
                "link cost must be in 1..{}, got {}",
                NO_ROUTE_DISTANCE, self.link_cost
            )));
        }
        if self.cooldown_min > self.cooldown_max {
            return Err(Error::config("cooldown_min exceeds cooldown_max"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::config("poll interval must be positive"));
        }
        Ok(())
    }
}
