//! Wire decoding of signed transactions and routing metadata

use crate::error::{GatewayError, GatewayResult};

use ethers::types::{Address, Bytes, Transaction, H256};
use ethers::utils::keccak256;
use ethers::utils::rlp::{self, Rlp};
use std::panic::{self, AssertUnwindSafe};

/// A decoded signed transaction tagged with the node it should be dispatched to
#[derive(Debug, Clone)]
pub struct RoutedTransaction {
    /// Decoded transaction fields
    pub tx: Transaction,
    /// Canonical wire bytes, forwarded to the pool unchanged
    pub raw: Bytes,
    /// Routing address; distinct from the sender recovered from the signature
    pub routing: Address,
}

impl RoutedTransaction {
    /// Decode wire bytes and attach a routing address
    pub fn decode(raw: Bytes, routing: Address) -> GatewayResult<Self> {
        let tx = decode_transaction(&raw)?;
        Ok(Self { tx, raw, routing })
    }

    /// Transaction hash (keccak-256 of the wire bytes)
    pub fn hash(&self) -> H256 {
        self.tx.hash
    }

    /// Sender recovered from the signature, if it verifies
    pub fn sender(&self) -> Option<Address> {
        self.tx.recover_from().ok()
    }
}

/// Decode a legacy or typed (EIP-2718) signed transaction.
///
/// Malformed input, including input that makes the codec panic or carries
/// bytes past the end of the transaction, is reported as `GatewayError::Decode`.
pub fn decode_transaction(raw: &[u8]) -> GatewayResult<Transaction> {
    if raw.is_empty() {
        return Err(GatewayError::Decode("empty transaction bytes".to_string()));
    }

    let decoded = panic::catch_unwind(AssertUnwindSafe(|| {
        ensure_single_item(raw)?;
        rlp::decode::<Transaction>(raw).map_err(|e| GatewayError::Decode(e.to_string()))
    }))
    .map_err(|_| GatewayError::Decode("malformed transaction bytes".to_string()))?;
    let mut tx = decoded?;

    tx.hash = H256::from(keccak256(raw));
    Ok(tx)
}

/// The rlp decoder stops after the first item, so the envelope must span
/// the whole input. Typed transactions are checked after the type byte.
fn ensure_single_item(raw: &[u8]) -> GatewayResult<()> {
    let payload = match raw.first() {
        Some(&kind) if kind <= 0x7f => &raw[1..],
        _ => raw,
    };

    let info = Rlp::new(payload)
        .payload_info()
        .map_err(|e| GatewayError::Decode(e.to_string()))?;
    if info.total() != payload.len() {
        return Err(GatewayError::Decode(format!(
            "trailing bytes after transaction: {} of {} bytes used",
            raw.len() - payload.len() + info.total(),
            raw.len()
        )));
    }
    Ok(())
}
