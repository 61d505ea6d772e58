//! Transaction shaping: argument defaulting, wire decoding and nonce serialization

pub mod args;
pub mod codec;
mod nonce;

pub use args::{SendTxsArgs, TxArgs, DEFAULT_GAS_LIMIT};
pub use codec::{decode_transaction, RoutedTransaction};
pub use nonce::{AddrLocker, NonceTracker};
