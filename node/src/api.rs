//! # HTTP API
//!
//! The axum router in front of [`SettlementProtocol`]. Handlers are thin:
//! parse the request, run the protocol call on the blocking pool (every
//! step does curve arithmetic, some of it a lot), map the result.
//!
//! ## Endpoints
//!
//! | Method | Path                       | Protocol call        |
//! |--------|----------------------------|----------------------|
//! | GET    | `/health`                  | none                 |
//! | POST   | `/wallets`                 | `create_wallet`      |
//! | GET    | `/wallets/:address`        | `get_wallet`         |
//! | GET    | `/goods`                   | `all_goods`          |
//! | GET    | `/goods/:id`               | `get_good`           |
//! | GET    | `/goods/owner/:owner`      | `goods_by_owner`     |
//! | POST   | `/goods/:id/price`         | `list_good`          |
//! | POST   | `/orders`                  | `propose`            |
//! | GET    | `/orders/:num`             | `get_order`          |
//! | GET    | `/orders/buyer/:addr`      | `orders_by_buyer`    |
//! | GET    | `/orders/seller/:addr`     | `orders_by_seller`   |
//! | POST   | `/orders/:num/decision`    | `seller_decide`      |
//! | POST   | `/orders/:num/commit`      | `buyer_commit`       |
//! | POST   | `/orders/:num/submit`      | `buyer_submit`       |
//! | POST   | `/orders/:num/settle`      | `settle`             |
//! | POST   | `/orders/:num/cancel`      | `cancel`             |
//!
//! Wallet responses carry the ciphertext only. Nobody gets a plaintext
//! balance over HTTP.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use umbra_protocol::keystore::FileKeyStore;
use umbra_protocol::ledger::SledLedger;
use umbra_protocol::records::{Good, Order, SellerOption, Wallet};
use umbra_protocol::registry::RegistryRingSource;
use umbra_protocol::{ErrorKind, SettlementError, SettlementProtocol, SettlementResult};

use crate::metrics::SharedMetrics;

/// The protocol as the node runs it: sled ledger, file key store, ring
/// decoys from the ledger registry.
pub type NodeProtocol = SettlementProtocol<SledLedger, FileKeyStore, RegistryRingSource>;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub protocol: Arc<NodeProtocol>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/wallets", post(create_wallet_handler))
        .route("/wallets/:address", get(wallet_handler))
        .route("/goods", get(goods_handler))
        .route("/goods/:id", get(good_handler))
        .route("/goods/owner/:owner", get(goods_by_owner_handler))
        .route("/goods/:id/price", post(list_good_handler))
        .route("/orders", post(propose_handler))
        .route("/orders/:num", get(order_handler))
        .route("/orders/buyer/:addr", get(orders_by_buyer_handler))
        .route("/orders/seller/:addr", get(orders_by_seller_handler))
        .route("/orders/:num/decision", post(decision_handler))
        .route("/orders/:num/commit", post(commit_handler))
        .route("/orders/:num/submit", post(submit_handler))
        .route("/orders/:num/settle", post(settle_handler))
        .route("/orders/:num/cancel", post(cancel_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
pub struct ListGoodRequest {
    pub price: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProposeRequest {
    pub buyer: String,
    pub seller: String,
    #[serde(rename = "goodId")]
    pub good_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub accept: bool,
}

/// Error body. `kind` is absent for failures outside the protocol.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Error Mapping
// ---------------------------------------------------------------------------

pub struct ApiError {
    status: StatusCode,
    kind: Option<ErrorKind>,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: None,
            message: message.into(),
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists | ErrorKind::InvalidState | ErrorKind::ConsistencyMismatch => {
            StatusCode::CONFLICT
        }
        ErrorKind::DecodeError | ErrorKind::CurveError | ErrorKind::InvalidInput => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::SignatureInvalid
        | ErrorKind::RangeProofInvalid
        | ErrorKind::AmountOutOfRange
        | ErrorKind::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Ledger | ErrorKind::KeyStore | ErrorKind::Config => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<SettlementError> for ApiError {
    fn from(e: SettlementError) -> Self {
        let kind = e.kind();
        Self {
            status: status_for(kind),
            kind: Some(kind),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, message = %self.message, "request failed");
        }
        let body = ErrorResponse {
            kind: self.kind.map(|k| format!("{k:?}")),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Run a protocol call on the blocking pool and time it.
async fn call<T, F>(state: &AppState, operation: &'static str, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&NodeProtocol) -> SettlementResult<T> + Send + 'static,
{
    let protocol = Arc::clone(&state.protocol);
    let timer = state.metrics.call_timer(operation).start_timer();
    let joined = tokio::task::spawn_blocking(move || f(&protocol)).await;
    timer.observe_duration();
    joined
        .map_err(|e| ApiError::internal(format!("{operation} task failed: {e}")))?
        .map_err(ApiError::from)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: state.version.clone(),
    })
}

async fn create_wallet_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateWalletRequest>,
) -> ApiResult<(StatusCode, Json<Wallet>)> {
    let wallet = call(&state, "create_wallet", move |p| {
        p.create_wallet(&req.address, req.amount)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(wallet)))
}

async fn wallet_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<Wallet>> {
    Ok(Json(call(&state, "get_wallet", move |p| p.get_wallet(&address)).await?))
}

async fn goods_handler(State(state): State<AppState>) -> ApiResult<Json<Vec<Good>>> {
    Ok(Json(call(&state, "all_goods", |p| p.all_goods()).await?))
}

async fn good_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Good>> {
    Ok(Json(call(&state, "get_good", move |p| p.get_good(&id)).await?))
}

async fn goods_by_owner_handler(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> ApiResult<Json<Vec<Good>>> {
    Ok(Json(
        call(&state, "goods_by_owner", move |p| p.goods_by_owner(&owner)).await?,
    ))
}

async fn list_good_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ListGoodRequest>,
) -> ApiResult<Json<Good>> {
    Ok(Json(
        call(&state, "list_good", move |p| p.list_good(&id, req.price)).await?,
    ))
}

async fn propose_handler(
    State(state): State<AppState>,
    Json(req): Json<ProposeRequest>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let order = call(&state, "propose", move |p| {
        p.propose(&req.buyer, &req.seller, &req.good_id)
    })
    .await?;
    state.metrics.orders_proposed_total.inc();
    Ok((StatusCode::CREATED, Json(order)))
}

async fn order_handler(
    State(state): State<AppState>,
    Path(num): Path<String>,
) -> ApiResult<Json<Order>> {
    Ok(Json(call(&state, "get_order", move |p| p.get_order(&num)).await?))
}

async fn orders_by_buyer_handler(
    State(state): State<AppState>,
    Path(addr): Path<String>,
) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(
        call(&state, "orders_by_buyer", move |p| p.orders_by_buyer(&addr)).await?,
    ))
}

async fn orders_by_seller_handler(
    State(state): State<AppState>,
    Path(addr): Path<String>,
) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(
        call(&state, "orders_by_seller", move |p| p.orders_by_seller(&addr)).await?,
    ))
}

async fn decision_handler(
    State(state): State<AppState>,
    Path(num): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> ApiResult<Json<Order>> {
    let decision = if req.accept {
        SellerOption::Accept
    } else {
        SellerOption::Reject
    };
    Ok(Json(
        call(&state, "seller_decide", move |p| p.seller_decide(&num, decision)).await?,
    ))
}

async fn commit_handler(
    State(state): State<AppState>,
    Path(num): Path<String>,
) -> ApiResult<Json<Order>> {
    Ok(Json(call(&state, "buyer_commit", move |p| p.buyer_commit(&num)).await?))
}

async fn submit_handler(
    State(state): State<AppState>,
    Path(num): Path<String>,
) -> ApiResult<Json<Order>> {
    Ok(Json(call(&state, "buyer_submit", move |p| p.buyer_submit(&num)).await?))
}

async fn settle_handler(
    State(state): State<AppState>,
    Path(num): Path<String>,
) -> ApiResult<Json<Order>> {
    match call(&state, "settle", move |p| p.settle(&num)).await {
        Ok(order) => {
            state.metrics.settlements_total.inc();
            Ok(Json(order))
        }
        Err(e) => {
            state.metrics.settlement_failures_total.inc();
            Err(e)
        }
    }
}

async fn cancel_handler(
    State(state): State<AppState>,
    Path(num): Path<String>,
) -> ApiResult<Json<Order>> {
    Ok(Json(call(&state, "cancel", move |p| p.cancel(&num)).await?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
