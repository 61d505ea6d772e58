use super::*;
use crate::backend::MockBackend;
use crate::tx::decode_transaction;

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{TransactionRequest, U256};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

fn wallet() -> LocalWallet {
    TEST_KEY.parse().unwrap()
}

fn sign(tx: &TypedTransaction) -> Bytes {
    let signature = wallet().sign_transaction_sync(tx).unwrap();
    tx.rlp_signed(&signature)
}

fn signed(nonce: u64) -> Bytes {
    sign(&TypedTransaction::Legacy(
        TransactionRequest::new()
            .to(Address::repeat_byte(0x11))
            .nonce(nonce)
            .gas(21_000u64)
            .gas_price(1u64),
    ))
}

fn routing(n: usize) -> Vec<Address> {
    (0..n).map(|i| Address::from_low_u64_be(i as u64 + 1)).collect()
}

fn gateway(backend: impl Backend + 'static) -> Gateway {
    Gateway::new(Arc::new(backend), Arc::new(AddrLocker::new()))
}

fn ctx() -> CallContext {
    CallContext::detached(Duration::from_secs(5))
}

/// Backend that signs with the test key and accepts everything
fn signing_backend(pool_nonce: u64) -> MockBackend {
    let mut backend = MockBackend::new();
    backend
        .expect_suggest_price()
        .returning(|| Ok(U256::from(1000)));
    backend
        .expect_pool_nonce()
        .returning(move |_| Ok(pool_nonce));
    backend
        .expect_sign_transaction()
        .returning(|_, tx| Ok(sign(tx)));
    backend
}

#[tokio::test]
async fn test_length_mismatch_rejected_before_submission() {
    let mut backend = MockBackend::new();
    backend.expect_send_transaction().never();

    let err = gateway(backend)
        .send_raw_transactions(&ctx(), &routing(2), &[signed(0)])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GatewayError::InvalidRequestLength { routing: 2, transactions: 1 }
    ));
}

#[tokio::test]
async fn test_all_valid_items_succeed_in_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut backend = MockBackend::new();
    backend.expect_send_transaction().times(4).returning({
        let seen = seen.clone();
        move |tx| {
            seen.lock().unwrap().push(tx.routing);
            Ok(tx.hash())
        }
    });

    let encoded: Vec<Bytes> = (0..4).map(signed).collect();
    let batch = gateway(backend)
        .send_raw_transactions(&ctx(), &routing(4), &encoded)
        .await
        .unwrap();

    let expected: Vec<H256> = encoded
        .iter()
        .map(|raw| decode_transaction(raw).unwrap().hash)
        .collect();
    assert_eq!(batch.hashes, expected);
    assert!(batch.is_complete());
    assert!(batch.error().is_none());

    // Routing addresses follow their transactions
    assert_eq!(*seen.lock().unwrap(), routing(4));
}

#[tokio::test]
async fn test_one_malformed_item_among_valid() {
    let mut backend = MockBackend::new();
    backend
        .expect_send_transaction()
        .times(3)
        .returning(|tx| Ok(tx.hash()));

    let encoded = vec![
        signed(0),
        signed(1),
        Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
        signed(2),
    ];
    let batch = gateway(backend)
        .send_raw_transactions(&ctx(), &routing(4), &encoded)
        .await
        .unwrap();

    assert_eq!(batch.hashes.len(), 3);
    assert_eq!(batch.failures.len(), 1);
    assert!(batch.failures.contains_key("undecodable:2"));
    assert!(matches!(batch.error(), Some(GatewayError::BatchFailed(_))));
}

#[tokio::test]
async fn test_trailing_bytes_item_is_undecodable() {
    let mut backend = MockBackend::new();
    backend
        .expect_send_transaction()
        .times(2)
        .returning(|tx| Ok(tx.hash()));

    let mut padded = signed(1).to_vec();
    padded.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

    let encoded = vec![signed(0), Bytes::from(padded), signed(2)];
    let batch = gateway(backend)
        .send_raw_transactions(&ctx(), &routing(3), &encoded)
        .await
        .unwrap();

    let expected = vec![
        decode_transaction(&encoded[0]).unwrap().hash,
        decode_transaction(&encoded[2]).unwrap().hash,
    ];
    assert_eq!(batch.hashes, expected);
    assert_eq!(batch.failures.len(), 1);
    assert!(batch.failures["undecodable:1"].contains("trailing bytes"));
}

#[tokio::test]
async fn test_submission_failure_keyed_by_hash() {
    let rejected = signed(1);
    let rejected_hash = decode_transaction(&rejected).unwrap().hash;

    let mut backend = MockBackend::new();
    backend.expect_send_transaction().times(3).returning(move |tx| {
        if tx.hash() == rejected_hash {
            Err(GatewayError::Submission("nonce too low".into()))
        } else {
            Ok(tx.hash())
        }
    });

    let encoded = vec![signed(0), rejected, signed(2)];
    let (hashes, error) = gateway(backend)
        .send_raw_transactions(&ctx(), &routing(3), &encoded)
        .await
        .unwrap()
        .into_parts();

    assert_eq!(hashes.len(), 2);
    assert!(!hashes.contains(&rejected_hash));

    let report = match error {
        Some(GatewayError::BatchFailed(report)) => report,
        other => panic!("unexpected error: {:?}", other),
    };
    let report: std::collections::BTreeMap<String, String> =
        serde_json::from_str(&report).unwrap();
    assert_eq!(
        report[&FailureKey::Hash(rejected_hash).to_string()],
        "Submission error: nonce too low"
    );
}

#[tokio::test]
async fn test_cancelled_call_fails_every_item_without_submitting() {
    let mut backend = MockBackend::new();
    backend.expect_send_transaction().never();

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let ctx = CallContext::new(Duration::from_secs(5), rx);

    let batch = gateway(backend)
        .send_raw_transactions(&ctx, &routing(3), &[signed(0), signed(1), signed(2)])
        .await
        .unwrap();

    assert!(batch.hashes.is_empty());
    assert_eq!(batch.failures.len(), 3);
    assert!(batch.failures.values().all(|e| e == "Request cancelled"));
}

struct SlowBackend;

#[async_trait]
impl Backend for SlowBackend {
    async fn suggest_price(&self) -> GatewayResult<U256> {
        Ok(U256::one())
    }

    async fn pool_nonce(&self, _address: Address) -> GatewayResult<u64> {
        Ok(0)
    }

    async fn sign_transaction(&self, _from: Address, tx: &TypedTransaction) -> GatewayResult<Bytes> {
        Ok(sign(tx))
    }

    async fn send_transaction(&self, tx: RoutedTransaction) -> GatewayResult<H256> {
        if tx.tx.nonce == U256::zero() {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(tx.hash())
    }
}

#[tokio::test]
async fn test_timeout_fails_only_that_item() {
    let ctx = CallContext::detached(Duration::from_millis(50));
    let batch = gateway(SlowBackend)
        .send_raw_transactions(&ctx, &routing(2), &[signed(0), signed(1)])
        .await
        .unwrap();

    assert_eq!(batch.hashes, vec![decode_transaction(&signed(1)).unwrap().hash]);
    assert_eq!(batch.failures.len(), 1);
    assert!(batch
        .failures
        .values()
        .all(|e| e == "Timeout waiting for submit transaction"));
}

#[tokio::test]
async fn test_send_transaction_defaults_and_routes() {
    let routed = Arc::new(Mutex::new(Vec::new()));
    let mut backend = signing_backend(5);
    backend.expect_send_transaction().times(1).returning({
        let routed = routed.clone();
        move |tx| {
            routed.lock().unwrap().push(tx.clone());
            Ok(tx.hash())
        }
    });

    let args = TxArgs {
        from: wallet().address(),
        to: Some(Address::repeat_byte(0xbb)),
        value: Some(U256::zero()),
        ..Default::default()
    };
    let sn_address = Address::repeat_byte(0x5a);
    let hash = gateway(backend)
        .send_transaction(&ctx(), sn_address, args)
        .await
        .unwrap();

    let routed = routed.lock().unwrap();
    let tx = &routed[0];
    assert_eq!(tx.hash(), hash);
    assert_eq!(tx.routing, sn_address);
    assert_eq!(tx.sender(), Some(wallet().address()));
    assert_eq!(tx.tx.gas, U256::from(90_000));
    assert_eq!(tx.tx.gas_price, Some(U256::from(1000)));
    assert_eq!(tx.tx.nonce, U256::from(5));
    assert!(tx.tx.input.is_empty());
}

#[tokio::test]
async fn test_reserved_nonces_are_not_reused() {
    let nonces = Arc::new(Mutex::new(Vec::new()));
    let mut backend = signing_backend(5);
    backend.expect_send_transaction().returning({
        let nonces = nonces.clone();
        move |tx| {
            nonces.lock().unwrap().push(tx.tx.nonce.as_u64());
            Ok(tx.hash())
        }
    });
    let gateway = gateway(backend);

    let args = TxArgs {
        from: wallet().address(),
        to: Some(Address::repeat_byte(0xbb)),
        ..Default::default()
    };
    for _ in 0..3 {
        gateway
            .send_transaction(&ctx(), Address::zero(), args.clone())
            .await
            .unwrap();
    }

    assert_eq!(*nonces.lock().unwrap(), vec![5, 6, 7]);
}

#[tokio::test]
async fn test_failed_submission_releases_nonce() {
    let nonces = Arc::new(Mutex::new(Vec::new()));
    let mut backend = signing_backend(5);
    backend.expect_send_transaction().returning({
        let nonces = nonces.clone();
        move |tx| {
            let mut nonces = nonces.lock().unwrap();
            nonces.push(tx.tx.nonce.as_u64());
            if nonces.len() == 1 {
                Err(GatewayError::Submission("txpool is full".into()))
            } else {
                Ok(tx.hash())
            }
        }
    });
    let gateway = gateway(backend);

    let args = TxArgs {
        from: wallet().address(),
        to: Some(Address::repeat_byte(0xbb)),
        ..Default::default()
    };
    let err = gateway
        .send_transaction(&ctx(), Address::zero(), args.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Submission(_)));

    gateway
        .send_transaction(&ctx(), Address::zero(), args)
        .await
        .unwrap();

    assert_eq!(*nonces.lock().unwrap(), vec![5, 5]);
}

#[tokio::test]
async fn test_send_transactions_partial_failure() {
    let mut backend = signing_backend(0);
    backend
        .expect_send_transaction()
        .times(2)
        .returning(|tx| Ok(tx.hash()));

    let valid = TxArgs {
        from: wallet().address(),
        to: Some(Address::repeat_byte(0xbb)),
        ..Default::default()
    };
    let missing_code = TxArgs {
        from: wallet().address(),
        ..Default::default()
    };

    let batch = gateway(backend)
        .send_transactions(
            &ctx(),
            SendTxsArgs {
                sn_address: Address::repeat_byte(0x5a),
                transactions: vec![valid.clone(), missing_code, valid],
            },
        )
        .await;

    assert_eq!(batch.hashes.len(), 2);
    assert_ne!(batch.hashes[0], batch.hashes[1]);
    assert_eq!(batch.failures.len(), 1);
    assert!(batch.failures["unsigned:1"].contains("contract creation without any data"));
}

#[tokio::test]
async fn test_send_transactions_backend_query_failure() {
    let mut backend = MockBackend::new();
    backend
        .expect_suggest_price()
        .returning(|| Err(GatewayError::GasPrice("node unavailable".into())));
    backend.expect_send_transaction().never();

    let batch = gateway(backend)
        .send_transactions(
            &ctx(),
            SendTxsArgs {
                sn_address: Address::repeat_byte(0x5a),
                transactions: vec![TxArgs {
                    from: wallet().address(),
                    to: Some(Address::repeat_byte(0xbb)),
                    ..Default::default()
                }],
            },
        )
        .await;

    assert!(batch.hashes.is_empty());
    assert_eq!(
        batch.failures["unsigned:0"],
        "Gas price suggestion failed: node unavailable"
    );
}

#[tokio::test]
async fn test_undecodable_node_signature_keyed_by_index() {
    let mut backend = MockBackend::new();
    backend
        .expect_suggest_price()
        .returning(|| Ok(U256::from(1000)));
    backend.expect_pool_nonce().returning(|_| Ok(0));
    backend
        .expect_sign_transaction()
        .returning(|_, _| Ok(Bytes::from(vec![0xde, 0xad])));
    backend.expect_send_transaction().never();

    let batch = gateway(backend)
        .send_transactions(
            &ctx(),
            SendTxsArgs {
                sn_address: Address::repeat_byte(0x5a),
                transactions: vec![TxArgs {
                    from: wallet().address(),
                    to: Some(Address::repeat_byte(0xbb)),
                    ..Default::default()
                }],
            },
        )
        .await;

    assert!(batch.hashes.is_empty());
    assert!(batch.failures.contains_key("undecodable:0"));
    assert!(!batch.failures.contains_key("unsigned:0"));
}
