//! Batch submission coordinator
//!
//! The gateway:
//! 1. Validates the shape of a batch request
//! 2. Decodes (or defaults, materializes and signs) each item
//! 3. Attaches the routing address and submits it through the backend
//! 4. Aggregates per-item results without letting one item abort the rest

mod batch;
mod context;

pub use batch::{BatchOutcome, FailureKey, ItemOutcome};
pub use context::CallContext;

use crate::backend::Backend;
use crate::error::{GatewayError, GatewayResult};
use crate::metrics;
use crate::tx::{AddrLocker, NonceTracker, RoutedTransaction, SendTxsArgs, TxArgs};

use ethers::types::{Address, Bytes, H256};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

const RAW_PATH: &str = "raw";
const ARGS_PATH: &str = "args";

/// Transaction submission gateway
pub struct Gateway {
    backend: Arc<dyn Backend>,
    nonce_lock: Arc<AddrLocker>,
    nonces: NonceTracker,
}

impl Gateway {
    pub fn new(backend: Arc<dyn Backend>, nonce_lock: Arc<AddrLocker>) -> Self {
        Self {
            backend,
            nonce_lock,
            nonces: NonceTracker::new(),
        }
    }

    /// Submit pre-signed wire-encoded transactions, each with its routing address.
    ///
    /// Only a length mismatch fails the whole call. Every other failure is
    /// recorded against its item in the returned outcome.
    pub async fn send_raw_transactions(
        &self,
        ctx: &CallContext,
        routing: &[Address],
        encoded: &[Bytes],
    ) -> GatewayResult<BatchOutcome> {
        if routing.len() != encoded.len() {
            metrics::record_tx_failed(RAW_PATH, "request_length");
            return Err(GatewayError::InvalidRequestLength {
                routing: routing.len(),
                transactions: encoded.len(),
            });
        }

        let span = info_span!("raw_batch", batch_id = %Uuid::new_v4(), size = encoded.len());
        async move {
            metrics::record_batch_size(RAW_PATH, encoded.len());

            let mut outcomes = Vec::with_capacity(encoded.len());
            for (index, (raw, routing)) in encoded.iter().zip(routing).enumerate() {
                let outcome = self.submit_raw(ctx, index, raw.clone(), *routing).await;
                record_metrics(RAW_PATH, &outcome);
                outcomes.push(outcome);
            }

            let batch = BatchOutcome::collect(outcomes);
            log_batch("Raw", &batch);
            Ok(batch)
        }
        .instrument(span)
        .await
    }

    async fn submit_raw(
        &self,
        ctx: &CallContext,
        index: usize,
        raw: Bytes,
        routing: Address,
    ) -> ItemOutcome {
        let tx = RoutedTransaction::decode(raw, routing).map_err(|e| {
            warn!("Item {} failed to decode: {}", index, e);
            (FailureKey::Undecodable(index), e)
        })?;

        let hash = tx.hash();
        self.submit(ctx, tx)
            .await
            .map_err(|e| (FailureKey::Hash(hash), e))
    }

    /// Submit argument sets signed by the node, all routed to `sn_address`
    pub async fn send_transactions(&self, ctx: &CallContext, args: SendTxsArgs) -> BatchOutcome {
        let span = info_span!(
            "args_batch",
            batch_id = %Uuid::new_v4(),
            size = args.transactions.len(),
            routing = ?args.sn_address
        );
        async move {
            metrics::record_batch_size(ARGS_PATH, args.transactions.len());

            let mut outcomes = Vec::with_capacity(args.transactions.len());
            for (index, tx_args) in args.transactions.into_iter().enumerate() {
                let outcome = self
                    .send_transaction_inner(ctx, index, args.sn_address, tx_args)
                    .await;
                record_metrics(ARGS_PATH, &outcome);
                outcomes.push(outcome);
            }

            let batch = BatchOutcome::collect(outcomes);
            log_batch("Argument", &batch);
            batch
        }
        .instrument(span)
        .await
    }

    /// Default, sign and submit a single argument set
    pub async fn send_transaction(
        &self,
        ctx: &CallContext,
        routing: Address,
        args: TxArgs,
    ) -> GatewayResult<H256> {
        let outcome = self
            .send_transaction_inner(ctx, 0, routing, args)
            .await
            .map_err(|(_, e)| e);
        match &outcome {
            Ok(_) => metrics::record_tx_submitted(ARGS_PATH),
            Err(e) => metrics::record_tx_failed(ARGS_PATH, e.kind()),
        }
        outcome
    }

    /// Failures are keyed by hash once the node-signed bytes decode
    async fn send_transaction_inner(
        &self,
        ctx: &CallContext,
        index: usize,
        routing: Address,
        mut args: TxArgs,
    ) -> ItemOutcome {
        let from = args.from;
        let reserved = self
            .resolve_nonce(ctx, &mut args)
            .await
            .map_err(|e| (FailureKey::Unsigned(index), e))?;

        let result = self.sign_and_submit(ctx, index, routing, &args).await;

        if let (Err(_), Some(nonce)) = (&result, reserved) {
            self.nonces.release(from, nonce);
        }
        result
    }

    /// Fill defaults under the sender lock, reserving the nonce if it was
    /// left unset. Returns the reserved nonce.
    async fn resolve_nonce(&self, ctx: &CallContext, args: &mut TxArgs) -> GatewayResult<Option<u64>> {
        let _guard = self.nonce_lock.lock(args.from).await;

        let explicit_nonce = args.nonce.is_some();
        ctx.run("set defaults", args.set_defaults(self.backend.as_ref()))
            .await?;

        if explicit_nonce {
            return Ok(None);
        }

        let pool_nonce = args.nonce.map(|n| n.as_u64()).unwrap_or_default();
        let nonce = self.nonces.reserve(args.from, pool_nonce);
        args.nonce = Some(nonce.into());
        Ok(Some(nonce))
    }

    async fn sign_and_submit(
        &self,
        ctx: &CallContext,
        index: usize,
        routing: Address,
        args: &TxArgs,
    ) -> ItemOutcome {
        let tx = args.to_transaction();
        let raw = ctx
            .run("sign transaction", async {
                self.backend.sign_transaction(args.from, &tx).await
            })
            .await
            .map_err(|e| (FailureKey::Unsigned(index), e))?;

        let routed = RoutedTransaction::decode(raw, routing).map_err(|e| {
            warn!("Node-signed item {} failed to decode: {}", index, e);
            (FailureKey::Undecodable(index), e)
        })?;
        let hash = routed.hash();
        self.submit(ctx, routed)
            .await
            .map_err(|e| (FailureKey::Hash(hash), e))
    }

    async fn submit(&self, ctx: &CallContext, tx: RoutedTransaction) -> GatewayResult<H256> {
        let hash = tx.hash();
        debug!(
            "Submitting {:?} from {:?} via {:?}",
            hash,
            tx.sender(),
            tx.routing
        );

        ctx.run("submit transaction", async move {
            self.backend.send_transaction(tx).await
        })
        .await
        .map_err(|e| {
            warn!(retryable = e.is_retryable(), "Submission of {:?} failed: {}", hash, e);
            e
        })
    }
}

fn log_batch(kind: &str, batch: &BatchOutcome) {
    if batch.is_complete() {
        info!("{} batch done: {} submitted", kind, batch.hashes.len());
    } else {
        warn!(
            "{} batch done: {} submitted, {} failed",
            kind,
            batch.hashes.len(),
            batch.failures.len()
        );
    }
}

fn record_metrics(path: &str, outcome: &ItemOutcome) {
    match outcome {
        Ok(_) => metrics::record_tx_submitted(path),
        Err((_, e)) => metrics::record_tx_failed(path, e.kind()),
    }
}

#[cfg(test)]
mod tests;
