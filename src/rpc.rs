//! The RPC surface that marshals client requests into lock-manager jobs.
//!
//! Out of scope for the core per section 1, but specified by its
//! interface: four synchronous methods (RegisterTransaction, LockShared,
//! LockExclusive, Unlock), each returning `OK` or `Cancelled`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::LockError;
use crate::lockmgr::LockManager;

#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<LockManager>,
}

/// RPC status, matching the two-valued outcome of section 6's method
/// table: every client-visible failure collapses to `Cancelled`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RpcStatus {
    Ok,
    Cancelled,
}

#[derive(Deserialize)]
pub struct RegisterTransactionRequest {
    pub transaction_id: u32,
    pub lock_budget: u32,
}

#[derive(Deserialize)]
pub struct LockRequest {
    pub transaction_id: u32,
    pub row_id: u32,
    #[serde(default = "default_true")]
    pub wait_for_signature: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
pub struct LockResponse {
    pub status: RpcStatus,
    pub signature: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: RpcStatus,
}

#[derive(Serialize)]
pub struct PublicKeyResponse {
    pub public_key: String,
}

pub fn build_router(manager: Arc<LockManager>) -> Router {
    let state = ApiState { manager };

    Router::new()
        .route("/v1/transactions", post(register_transaction))
        .route("/v1/locks/shared", post(lock_shared))
        .route("/v1/locks/exclusive", post(lock_exclusive))
        .route("/v1/locks/unlock", post(unlock))
        .route("/v1/public-key", get(public_key))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(manager: Arc<LockManager>, addr: SocketAddr) -> std::io::Result<()> {
    let router = build_router(manager);
    info!(%addr, "lock manager RPC surface listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

async fn register_transaction(
    State(state): State<ApiState>,
    Json(req): Json<RegisterTransactionRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .register_transaction(req.transaction_id, req.lock_budget)
    {
        Ok(()) => Json(StatusResponse { status: RpcStatus::Ok }),
        Err(_) => Json(StatusResponse { status: RpcStatus::Cancelled }),
    }
}

async fn lock_shared(State(state): State<ApiState>, Json(req): Json<LockRequest>) -> impl IntoResponse {
    respond_to_lock(state.manager.lock_shared(req.transaction_id, req.row_id))
}

async fn lock_exclusive(State(state): State<ApiState>, Json(req): Json<LockRequest>) -> impl IntoResponse {
    respond_to_lock(state.manager.lock_exclusive(req.transaction_id, req.row_id))
}

fn respond_to_lock(result: Result<String, LockError>) -> Json<LockResponse> {
    match result {
        Ok(signature) => Json(LockResponse { status: RpcStatus::Ok, signature }),
        Err(_) => Json(LockResponse { status: RpcStatus::Cancelled, signature: String::new() }),
    }
}

async fn unlock(State(state): State<ApiState>, Json(req): Json<LockRequest>) -> impl IntoResponse {
    match state.manager.unlock(req.transaction_id, req.row_id) {
        Ok(()) => Json(StatusResponse { status: RpcStatus::Ok }),
        Err(_) => Json(StatusResponse { status: RpcStatus::Cancelled }),
    }
}

async fn public_key(State(state): State<ApiState>) -> impl IntoResponse {
    Json(PublicKeyResponse { public_key: state.manager.public_key().to_string() })
}
