//! HTTP API for transaction submission, rewards and health checks

use crate::config::ApiConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{BatchOutcome, CallContext, Gateway};
use crate::rewards::RewardAggregator;
use crate::tx::{SendTxsArgs, TxArgs};

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use ethers::types::{Address, Bytes, H256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub rewards: Arc<RewardAggregator>,
    pub request_timeout: Duration,
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    fn call_context(&self) -> CallContext {
        CallContext::new(self.request_timeout, self.shutdown.clone())
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/transactions/raw", post(send_raw_transactions))
        .route("/transactions", post(send_transactions))
        .route("/transaction", post(send_transaction))
        .route("/rewards", get(get_rewards))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
///
/// Stops accepting connections once the shutdown flag is raised and waits
/// for in-flight requests to finish.
pub async fn run_server(config: ApiConfig, state: AppState) -> GatewayResult<()> {
    let mut shutdown = state.shutdown.clone();
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Submit pre-signed transactions with their routing addresses
async fn send_raw_transactions(
    State(state): State<AppState>,
    Json(request): Json<SendRawTransactionsRequest>,
) -> impl IntoResponse {
    let ctx = state.call_context();
    match state
        .gateway
        .send_raw_transactions(&ctx, &request.routing_addresses, &request.transactions)
        .await
    {
        Ok(batch) => (StatusCode::OK, Json(SubmissionResponse::from(batch))),
        Err(e) => (status_code(&e), Json(SubmissionResponse::rejected(&e))),
    }
}

/// Submit argument sets for the node to sign, routed to one supernode
async fn send_transactions(
    State(state): State<AppState>,
    Json(args): Json<SendTxsArgs>,
) -> impl IntoResponse {
    let ctx = state.call_context();
    let batch = state.gateway.send_transactions(&ctx, args).await;
    (StatusCode::OK, Json(SubmissionResponse::from(batch)))
}

/// Submit one argument set for the node to sign
async fn send_transaction(
    State(state): State<AppState>,
    Json(request): Json<SendTransactionRequest>,
) -> impl IntoResponse {
    let ctx = state.call_context();
    match state
        .gateway
        .send_transaction(&ctx, request.routing_address, request.transaction)
        .await
    {
        Ok(hash) => (
            StatusCode::OK,
            Json(TransactionResponse {
                hash: Some(hash),
                error: None,
            }),
        ),
        Err(e) => (
            status_code(&e),
            Json(TransactionResponse {
                hash: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

/// Reward occurrence counts per address
async fn get_rewards(State(state): State<AppState>) -> impl IntoResponse {
    let rewards = state.rewards.clone();
    match tokio::task::spawn_blocking(move || rewards.rewards()).await {
        Ok(counts) => (StatusCode::OK, Json(counts)).into_response(),
        Err(e) => {
            error!("Reward aggregation task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn status_code(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::InvalidRequestLength { .. }
        | GatewayError::Decode(_)
        | GatewayError::AmbiguousPayload { .. }
        | GatewayError::MissingContractCode { .. } => StatusCode::BAD_REQUEST,
        GatewayError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// Request/response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRawTransactionsRequest {
    routing_addresses: Vec<Address>,
    transactions: Vec<Bytes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendTransactionRequest {
    routing_address: Address,
    transaction: TxArgs,
}

#[derive(Debug, Serialize)]
struct TransactionResponse {
    hash: Option<H256>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmissionResponse {
    hashes: Vec<H256>,
    error: Option<String>,
}

impl SubmissionResponse {
    fn rejected(error: &GatewayError) -> Self {
        Self {
            hashes: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

impl From<BatchOutcome> for SubmissionResponse {
    fn from(batch: BatchOutcome) -> Self {
        let (hashes, error) = batch.into_parts();
        Self {
            hashes,
            error: error.map(|e| e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}
