//! Reward bookkeeping over the masternode and supernode address lists

use crate::config::RewardsConfig;
use crate::error::GatewayResult;
use crate::metrics;

use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// The two externally maintained reward lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardList {
    Masternode,
    Supernode,
}

impl RewardList {
    pub fn name(&self) -> &'static str {
        match self {
            RewardList::Masternode => "masternode",
            RewardList::Supernode => "supernode",
        }
    }
}

/// Capability to read a newline-delimited reward list
pub trait AddressListSource: Send + Sync {
    fn read_list(&self, list: RewardList) -> GatewayResult<String>;
}

/// Reads reward lists from configured file paths
pub struct FileAddressLists {
    masternode: PathBuf,
    supernode: PathBuf,
}

impl FileAddressLists {
    pub fn new(config: &RewardsConfig) -> Self {
        Self {
            masternode: config.masternode_list.clone(),
            supernode: config.supernode_list.clone(),
        }
    }
}

impl AddressListSource for FileAddressLists {
    fn read_list(&self, list: RewardList) -> GatewayResult<String> {
        let path = match list {
            RewardList::Masternode => &self.masternode,
            RewardList::Supernode => &self.supernode,
        };
        Ok(std::fs::read_to_string(path)?)
    }
}

/// Counts how often each address appears across both reward lists
pub struct RewardAggregator {
    source: Box<dyn AddressListSource>,
}

impl RewardAggregator {
    pub fn new(source: Box<dyn AddressListSource>) -> Self {
        Self { source }
    }

    /// Occurrence count per address. Unreadable lists count as empty.
    pub fn rewards(&self) -> BTreeMap<String, u64> {
        metrics::record_rewards_request();

        let mut counts = BTreeMap::new();
        for list in [RewardList::Masternode, RewardList::Supernode] {
            let content = match self.source.read_list(list) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Failed to read {} reward list: {}", list.name(), e);
                    continue;
                }
            };

            for address in content.lines().map(str::trim) {
                if address.is_empty() || address.eq_ignore_ascii_case(ZERO_ADDRESS) {
                    continue;
                }
                *counts.entry(address.to_string()).or_insert(0) += 1;
            }
        }

        debug!("Aggregated rewards for {} addresses", counts.len());
        counts
    }
}
