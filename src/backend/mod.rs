//! Node backend - the collaborator the gateway queries and submits through
//!
//! This module provides:
//! - The `Backend` trait consumed by the defaulter and the coordinator
//! - A JSON-RPC implementation with multi-URL failover

mod node;

pub use node::NodeBackend;

use crate::error::GatewayResult;
use crate::tx::RoutedTransaction;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, H256, U256};

/// Node-side capabilities the gateway depends on.
///
/// Every method may be called repeatedly and independently per batch item.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    /// Current suggested gas price
    async fn suggest_price(&self) -> GatewayResult<U256>;

    /// Next nonce for `address` as tracked by the pending pool
    async fn pool_nonce(&self, address: Address) -> GatewayResult<u64>;

    /// Sign `tx` with the node-managed key of `from`, returning wire bytes
    async fn sign_transaction(&self, from: Address, tx: &TypedTransaction) -> GatewayResult<Bytes>;

    /// Hand a routed transaction to the pool
    async fn send_transaction(&self, tx: RoutedTransaction) -> GatewayResult<H256>;
}
