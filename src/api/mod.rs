//! HTTP API for watch commands and status views

use crate::chain::{normalize_eth_tx_hash, normalize_tx_hash, EthereumProvider};
use crate::config::ApiConfig;
use crate::error::{WatcherError, WatcherResult};
use crate::state::{DepositRecord, WatchedTransaction};
use crate::watch::WatchEngine;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WatchEngine>,
    pub ethereum: Arc<EthereumProvider>,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/transactions", get(list_transactions))
        .route("/transactions/watch", post(watch_transaction))
        .route("/transactions/:hash", get(get_transaction))
        .route("/deposits", get(list_all_deposits))
        .route("/deposits/watch", post(watch_deposit))
        .route("/deposits/:token", get(list_deposits))
        .route(
            "/withdrawals/:hash",
            get(get_withdrawal_link).put(set_withdrawal_link),
        )
        .route("/session/abandon", post(abandon_session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> WatcherResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WatcherError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| WatcherError::Internal(format!("API server failed: {}", e)))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        session_id: state.engine.session_id(),
        active_watches: state.engine.active_watches(),
    })
}

async fn list_transactions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.store().transactions())
}

async fn get_transaction(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<WatchedTransaction>, ApiError> {
    let hash = normalize_tx_hash(&hash)?;
    state
        .engine
        .store()
        .transaction(&hash)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Transaction {} is not watched", hash)))
}

async fn watch_transaction(
    State(state): State<AppState>,
    Json(request): Json<WatchTransactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let hash = normalize_tx_hash(&request.hash)?;
    state
        .engine
        .watch_transaction(hash.clone(), request.already_submitted);

    Ok((StatusCode::ACCEPTED, Json(WatchAccepted { hash })))
}

async fn list_all_deposits(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.engine.store();
    Json(AllDepositsResponse {
        revision: store.deposit_revision(),
        deposits: store.all_deposits(),
    })
}

async fn list_deposits(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    let store = state.engine.store();
    Json(DepositsResponse {
        revision: store.deposit_revision(),
        deposits: store.deposits(&token),
        token,
    })
}

async fn watch_deposit(
    State(state): State<AppState>,
    Json(request): Json<WatchDepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.token.is_empty() {
        return Err(ApiError::bad_request("Token symbol is required"));
    }
    if request.amount.is_empty() || !request.amount.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::bad_request(format!(
            "Amount must be an integer in the token's smallest unit, got {:?}",
            request.amount
        )));
    }

    let eth_tx_hash = normalize_eth_tx_hash(&request.eth_tx_hash)?;
    let handle = state.ethereum.deposit_handle(&eth_tx_hash)?;
    state
        .engine
        .watch_deposit(Arc::new(handle), request.token, request.amount);

    Ok((
        StatusCode::ACCEPTED,
        Json(WatchAccepted { hash: eth_tx_hash }),
    ))
}

async fn get_withdrawal_link(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<WithdrawalLink>, ApiError> {
    let tx_hash = normalize_tx_hash(&hash)?;
    match state.engine.store().withdrawal_link(&tx_hash) {
        Some(eth_tx_hash) => Ok(Json(WithdrawalLink {
            tx_hash,
            eth_tx_hash,
        })),
        None => Err(ApiError::not_found(format!(
            "No L1 transaction linked to {}",
            tx_hash
        ))),
    }
}

async fn set_withdrawal_link(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Json(request): Json<LinkWithdrawalRequest>,
) -> Result<Json<WithdrawalLink>, ApiError> {
    let tx_hash = normalize_tx_hash(&hash)?;
    let eth_tx_hash = normalize_eth_tx_hash(&request.eth_tx_hash)?;

    if state.engine.link_withdrawal(&tx_hash, &eth_tx_hash) {
        Ok(Json(WithdrawalLink {
            tx_hash,
            eth_tx_hash,
        }))
    } else {
        Err(ApiError {
            status: StatusCode::CONFLICT,
            message: format!("{} is already linked", tx_hash),
        })
    }
}

async fn abandon_session(State(state): State<AppState>) -> impl IntoResponse {
    let abandoned = state.engine.abandon_all();
    Json(AbandonResponse {
        session_id: state.engine.session_id(),
        abandoned,
    })
}

// Error response

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<WatcherError> for ApiError {
    fn from(e: WatcherError) -> Self {
        let status = match e {
            WatcherError::InvalidHash(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// Request types

#[derive(Deserialize)]
struct WatchTransactionRequest {
    hash: String,
    #[serde(default)]
    already_submitted: bool,
}

#[derive(Deserialize)]
struct WatchDepositRequest {
    eth_tx_hash: String,
    token: String,
    amount: String,
}

#[derive(Deserialize)]
struct LinkWithdrawalRequest {
    eth_tx_hash: String,
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    session_id: Uuid,
    active_watches: usize,
}

#[derive(Serialize)]
struct WatchAccepted {
    hash: String,
}

#[derive(Serialize)]
struct DepositsResponse {
    token: String,
    revision: u64,
    deposits: Vec<DepositRecord>,
}

#[derive(Serialize)]
struct AllDepositsResponse {
    revision: u64,
    deposits: HashMap<String, Vec<DepositRecord>>,
}

#[derive(Serialize)]
struct WithdrawalLink {
    tx_hash: String,
    eth_tx_hash: String,
}

#[derive(Serialize)]
struct AbandonResponse {
    session_id: Uuid,
    abandoned: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}
