//! JSON-RPC node backend with multi-RPC support and automatic failover

use super::Backend;
use crate::config::NodeConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::tx::RoutedTransaction;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of `eth_signTransaction`
#[derive(Debug, Serialize, Deserialize)]
struct SignTransactionResult {
    raw: Bytes,
}

/// Multi-provider node client with automatic failover
pub struct NodeBackend {
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Routed submission method, if the node exposes one
    routing_method: Option<String>,
}

impl NodeBackend {
    /// Create a new node backend
    pub fn new(config: &NodeConfig) -> GatewayResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider.interval(Duration::from_millis(100)));
                    debug!("Added HTTP provider: {}", url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(GatewayError::NodeConnection(
                "No valid RPC providers".to_string(),
            ));
        }

        info!(
            "Node backend ready with {} provider(s), routed submission: {}",
            http_providers.len(),
            config.routing_method.as_deref().unwrap_or("disabled")
        );

        Ok(Self {
            http_providers,
            current_provider: AtomicUsize::new(0),
            routing_method: config.routing_method.clone(),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Node failover to provider {}", next);
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.http().get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Node health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Backend for NodeBackend {
    async fn suggest_price(&self) -> GatewayResult<U256> {
        let mut last_error = None;
        for _ in 0..self.http_providers.len() {
            match self.http().get_gas_price().await {
                Ok(price) => return Ok(price),
                Err(e) => {
                    warn!("Failed to get gas price: {}", e);
                    last_error = Some(e.to_string());
                    self.failover();
                }
            }
        }

        Err(GatewayError::GasPrice(
            last_error.unwrap_or_else(|| "All providers failed".to_string()),
        ))
    }

    async fn pool_nonce(&self, address: Address) -> GatewayResult<u64> {
        let mut last_error = None;
        for _ in 0..self.http_providers.len() {
            let pending = Some(BlockId::Number(BlockNumber::Pending));
            match self.http().get_transaction_count(address, pending).await {
                Ok(nonce) => return pool_nonce_u64(address, nonce),
                Err(e) => {
                    warn!("Failed to get pool nonce for {:?}: {}", address, e);
                    last_error = Some(e.to_string());
                    self.failover();
                }
            }
        }

        Err(GatewayError::PoolNonce {
            address,
            message: last_error.unwrap_or_else(|| "All providers failed".to_string()),
        })
    }

    async fn sign_transaction(&self, from: Address, tx: &TypedTransaction) -> GatewayResult<Bytes> {
        let result: SignTransactionResult = self
            .http()
            .request("eth_signTransaction", [tx])
            .await
            .map_err(|e| GatewayError::Signing(format!("{:?}: {}", from, e)))?;

        Ok(result.raw)
    }

    async fn send_transaction(&self, tx: RoutedTransaction) -> GatewayResult<H256> {
        let hash = match &self.routing_method {
            Some(method) => self
                .http()
                .request::<_, H256>(method, (tx.raw.clone(), tx.routing))
                .await
                .map_err(|e| GatewayError::Submission(e.to_string()))?,
            None => {
                debug!(
                    "Routing {:?} not forwarded for {:?}: routed submission disabled",
                    tx.routing,
                    tx.hash()
                );
                self.http()
                    .send_raw_transaction(tx.raw.clone())
                    .await
                    .map_err(|e| GatewayError::Submission(e.to_string()))?
                    .tx_hash()
            }
        };

        if hash != tx.hash() {
            warn!("Node returned hash {:?} for transaction {:?}", hash, tx.hash());
        }
        Ok(hash)
    }
}

/// Narrow a node-reported nonce without panicking on out-of-range values
fn pool_nonce_u64(address: Address, nonce: U256) -> GatewayResult<u64> {
    u64::try_from(nonce).map_err(|_| GatewayError::PoolNonce {
        address,
        message: format!("nonce {} exceeds u64", nonce),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unusable_urls() {
        let config = NodeConfig {
            rpc_urls: vec!["not a url".to_string()],
            routing_method: None,
        };
        assert!(matches!(
            NodeBackend::new(&config),
            Err(GatewayError::NodeConnection(_))
        ));
    }

    #[test]
    fn test_failover_rotates() {
        let config = NodeConfig {
            rpc_urls: vec![
                "http://127.0.0.1:8545".to_string(),
                "http://127.0.0.1:8546".to_string(),
            ],
            routing_method: Some("ppn_sendRoutedRawTransaction".to_string()),
        };
        let backend = NodeBackend::new(&config).unwrap();

        assert_eq!(backend.current_provider.load(Ordering::Relaxed), 0);
        backend.failover();
        assert_eq!(backend.current_provider.load(Ordering::Relaxed), 1);
        backend.failover();
        assert_eq!(backend.current_provider.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_pool_nonce_out_of_range() {
        let address = Address::repeat_byte(0x01);
        assert_eq!(pool_nonce_u64(address, U256::from(7)).unwrap(), 7);

        let err = pool_nonce_u64(address, U256::from(u64::MAX) + U256::one()).unwrap_err();
        assert!(matches!(err, GatewayError::PoolNonce { .. }));
        assert!(err.to_string().contains("exceeds u64"));
    }
}
