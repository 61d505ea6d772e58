//! Transaction arguments: default filling and materialization

use crate::backend::Backend;
use crate::error::{GatewayError, GatewayResult};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256, U64};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gas limit used when the caller leaves `gas` unset
pub const DEFAULT_GAS_LIMIT: u64 = 90_000;

/// Arguments for a transaction the node signs on the caller's behalf
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxArgs {
    pub from: Address,
    pub to: Option<Address>,
    pub gas: Option<U64>,
    pub gas_price: Option<U256>,
    pub value: Option<U256>,
    pub nonce: Option<U64>,
    /// Legacy alias of `input`; both are accepted and must agree.
    pub data: Option<Bytes>,
    pub input: Option<Bytes>,
}

/// A batch of argument sets routed to one supernode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTxsArgs {
    pub sn_address: Address,
    pub transactions: Vec<TxArgs>,
}

impl TxArgs {
    /// Fill in default values for unspecified fields and validate the payload.
    pub async fn set_defaults(&mut self, backend: &dyn Backend) -> GatewayResult<()> {
        if self.gas.is_none() {
            self.gas = Some(U64::from(DEFAULT_GAS_LIMIT));
        }
        if self.gas_price.is_none() {
            let price = backend.suggest_price().await?;
            debug!("Suggested gas price for {:?}: {}", self.from, price);
            self.gas_price = Some(price);
        }
        if self.value.is_none() {
            self.value = Some(U256::zero());
        }
        if self.nonce.is_none() {
            let nonce = backend.pool_nonce(self.from).await?;
            debug!("Pool nonce for {:?}: {}", self.from, nonce);
            self.nonce = Some(U64::from(nonce));
        }

        if let (Some(data), Some(input)) = (&self.data, &self.input) {
            if data != input {
                return Err(GatewayError::AmbiguousPayload { from: self.from });
            }
        }
        if self.to.is_none() && self.payload().is_empty() {
            return Err(GatewayError::MissingContractCode { from: self.from });
        }

        Ok(())
    }

    /// Resolved call data, preferring `data` over `input`
    pub fn payload(&self) -> Bytes {
        self.data
            .as_ref()
            .or(self.input.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    /// Build the transaction described by already-defaulted arguments.
    ///
    /// A missing `to` yields a contract creation. Fields left unset (only
    /// possible when `set_defaults` was skipped) fall back to the same
    /// defaults, except gas price and nonce which are simply omitted.
    pub fn to_transaction(&self) -> TypedTransaction {
        let mut tx = TransactionRequest::new()
            .from(self.from)
            .gas(self.gas.map(|g| g.as_u64()).unwrap_or(DEFAULT_GAS_LIMIT))
            .value(self.value.unwrap_or_default())
            .data(self.payload());

        if let Some(price) = self.gas_price {
            tx = tx.gas_price(price);
        }
        if let Some(nonce) = self.nonce {
            tx = tx.nonce(nonce.as_u64());
        }
        if let Some(to) = self.to {
            tx = tx.to(to);
        }

        TypedTransaction::Legacy(tx)
    }
}
