//! # REST API
//!
//! Builds the axum router that drives the devnet over HTTP. All endpoints
//! share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path               | Description                                |
//! |--------|--------------------|--------------------------------------------|
//! | GET    | `/health`          | Liveness probe                             |
//! | GET    | `/status`          | Both ledgers, the vault and the router     |
//! | POST   | `/deposits`        | Initiate a deposit on the source           |
//! | POST   | `/withdrawals`     | Initiate a withdrawal on the source        |
//! | GET    | `/withdrawals/:id` | In-flight withdrawal by request id         |
//! | POST   | `/sync`            | Publish the vault rate from the destination|
//! | POST   | `/dispatch`        | Deliver queued messages                    |
//! | POST   | `/vault/yield`     | Accrue yield or realize a loss             |
//! | POST   | `/vault/pause`     | Pause or resume the vault                  |
//! | GET    | `/events`          | Most recent ledger events, oldest first    |
//!
//! Every mutating call drains the ledgers' events into a bounded buffer
//! and persists the devnet snapshot before responding.
//!
//! Ledger errors map to statuses by class: precondition failures are 400,
//! remote-execution failures and replays are 409, transport refusals 502
//! and decode failures 422. Unknown ids are 404.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use xvault_contracts::devnet::{Delivery, Devnet, DevnetStatus, Side};
use xvault_contracts::error::{ErrorClass, LedgerError};
use xvault_contracts::events::LedgerEvent;
use xvault_protocol::message::{MessageKind, WithdrawalAmount};
use xvault_protocol::storage::LedgerDB;
use xvault_protocol::types::{Address, ChainSelector, MessageId};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Events kept for `GET /events`; older ones are dropped.
pub const EVENT_LOG_CAPACITY: usize = 256;

/// Recent ledger events, oldest first.
pub type EventLog = Arc<Mutex<VecDeque<EventRecord>>>;

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The running devnet. Handlers never hold the lock across an await.
    pub devnet: Arc<Mutex<Devnet>>,
    /// Snapshot store. `None` runs the devnet in memory only.
    pub db: Option<Arc<LedgerDB>>,
    /// Prometheus handles.
    pub metrics: SharedMetrics,
    /// Ledger events drained after each mutation.
    pub events: EventLog,
}

impl AppState {
    /// Drains the ledgers' events, saves the devnet and refreshes the
    /// gauges.
    fn commit(&self, net: &mut Devnet) -> Result<(), ApiError> {
        self.record_events(net.drain_events());
        self.metrics.observe(&net.status());
        if let Some(db) = &self.db {
            net.save(db).map_err(|e| {
                tracing::error!(error = %e, "failed to persist devnet snapshot");
                ApiError::Storage(e.to_string())
            })?;
        }
        Ok(())
    }

    fn record_events(&self, drained: Vec<(Side, LedgerEvent)>) {
        if drained.is_empty() {
            return;
        }
        let mut log = self.events.lock();
        for (side, event) in drained {
            tracing::debug!(?side, event = event.name(), "ledger event");
            self.metrics.record_event(event.name());
            if log.len() == EVENT_LOG_CAPACITY {
                log.pop_front();
            }
            log.push_back(EventRecord {
                side,
                name: event.name().to_string(),
                event,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the axum [`Router`] with all API routes, CORS and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/deposits", post(deposit_handler))
        .route("/withdrawals", post(withdrawal_handler))
        .route("/withdrawals/:id", get(withdrawal_by_id_handler))
        .route("/sync", post(sync_handler))
        .route("/dispatch", post(dispatch_handler))
        .route("/vault/yield", post(yield_handler))
        .route("/vault/pause", post(pause_handler))
        .route("/events", get(events_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /deposits`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    /// Assets to deposit, in base units.
    pub amount: u64,
    /// Paying account. Defaults to the devnet depositor.
    #[serde(default)]
    pub depositor: Option<Address>,
}

/// Body of `POST /withdrawals`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Shares to redeem. Omitted means the whole position.
    #[serde(default)]
    pub shares: Option<u64>,
    /// Who receives the assets on the source chain.
    pub recipient: Address,
    /// Free-form reference echoed in the settlement event.
    #[serde(default)]
    pub memo: Option<String>,
}

/// Body of `POST /dispatch`. An empty body drains the queue.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Deliver this message ahead of older ones.
    #[serde(default)]
    pub id: Option<MessageId>,
    /// Stop after this many deliveries.
    #[serde(default)]
    pub max: Option<usize>,
}

/// Body of `POST /vault/yield`.
#[derive(Debug, Serialize, Deserialize)]
pub struct YieldRequest {
    /// Assets gained, or lost when `loss` is set.
    pub amount: u64,
    #[serde(default)]
    pub loss: bool,
}

/// Body of `POST /vault/pause`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PauseRequest {
    pub paused: bool,
}

/// Response to operations that send a message.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Router-assigned message id.
    pub id: MessageId,
    pub kind: MessageKind,
}

/// Response payload for `POST /dispatch`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub delivered: Vec<Delivery>,
    /// Messages still queued.
    pub remaining: usize,
}

/// Response payload for `GET /withdrawals/:id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawalResponse {
    pub id: MessageId,
    pub recipient: Address,
    pub amount: WithdrawalAmount,
    pub memo: String,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    pub source_chain: ChainSelector,
    pub destination_chain: ChainSelector,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
    #[serde(flatten)]
    pub devnet: DevnetStatus,
}

/// One drained ledger event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub side: Side,
    pub name: String,
    pub event: LedgerEvent,
}

/// Response payload for `GET /events`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<EventRecord>,
}

/// Error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Ledger error class, when the failure came from a ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced by the handlers.
#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    BadRequest(String),
    NotFound(String),
    Storage(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

/// HTTP status for a ledger error class.
fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::Precondition => StatusCode::BAD_REQUEST,
        ErrorClass::RemoteExecution | ErrorClass::Replay => StatusCode::CONFLICT,
        ErrorClass::Transport => StatusCode::BAD_GATEWAY,
        ErrorClass::Decode => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Ledger(err) => {
                let class = err.class();
                (
                    status_for(class),
                    ErrorResponse {
                        error: err.to_string(),
                        class: Some(class.to_string()),
                    },
                )
            }
            ApiError::BadRequest(error) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse { error, class: None },
            ),
            ApiError::NotFound(error) => (
                StatusCode::NOT_FOUND,
                ErrorResponse { error, class: None },
            ),
            ApiError::Storage(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse { error, class: None },
            ),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: both ledgers, the vault and the router.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let net = state.devnet.lock();
    Json(StatusResponse {
        version: state.version.clone(),
        source_chain: net.source_env.selector,
        destination_chain: net.destination_env.selector,
        timestamp: chrono::Utc::now().to_rfc3339(),
        devnet: net.status(),
    })
}

/// `POST /deposits`
async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut net = state.devnet.lock();
    let depositor = req.depositor.unwrap_or_else(|| net.depositor());
    let id = net.deposit_from(depositor, req.amount)?;
    state.metrics.record_sent(MessageKind::Deposit);
    state.commit(&mut net)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            id,
            kind: MessageKind::Deposit,
        }),
    ))
}

/// `POST /withdrawals`
async fn withdrawal_handler(
    State(state): State<AppState>,
    Json(req): Json<WithdrawalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let amount = match req.shares {
        Some(shares) => WithdrawalAmount::Exact(shares),
        None => WithdrawalAmount::All,
    };
    let memo = req.memo.map(String::into_bytes).unwrap_or_default();

    let mut net = state.devnet.lock();
    let id = net.withdraw(amount, req.recipient, memo)?;
    state.metrics.record_sent(MessageKind::WithdrawalRequest);
    state.commit(&mut net)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            id,
            kind: MessageKind::WithdrawalRequest,
        }),
    ))
}

/// `GET /withdrawals/:id`: an in-flight withdrawal. Settled or unknown
/// ids are 404.
async fn withdrawal_by_id_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let id: MessageId = id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid message id: {}", e)))?;

    let net = state.devnet.lock();
    let pending = net
        .source
        .pending_withdrawal(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Withdrawal not found: {}", id)))?;

    Ok(Json(WithdrawalResponse {
        id,
        recipient: pending.recipient,
        amount: pending.amount,
        memo: String::from_utf8_lossy(&pending.memo).into_owned(),
    }))
}

/// `POST /sync`: the destination publishes its current rate.
async fn sync_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let mut net = state.devnet.lock();
    let id = net.sync()?;
    state.metrics.record_sent(MessageKind::SyncAssetsPerShare);
    state.commit(&mut net)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            id,
            kind: MessageKind::SyncAssetsPerShare,
        }),
    ))
}

/// `POST /dispatch`: delivers queued messages in order, or one message
/// by id. Stops at the first failure; the failed message stays queued.
async fn dispatch_handler(
    State(state): State<AppState>,
    body: Option<Json<DispatchRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let mut net = state.devnet.lock();
    let mut delivered = Vec::new();

    let outcome = match req.id {
        Some(id) => match net.dispatch_id(&id) {
            Ok(Some(delivery)) => {
                delivered.push(delivery);
                Ok(())
            }
            Ok(None) => Err(ApiError::NotFound(format!("Message not queued: {}", id))),
            Err(err) => Err(ApiError::Ledger(err)),
        },
        None => {
            let max = req.max.unwrap_or(usize::MAX);
            let mut outcome = Ok(());
            while delivered.len() < max {
                match net.dispatch_next() {
                    Ok(Some(delivery)) => delivered.push(delivery),
                    Ok(None) => break,
                    Err(err) => {
                        outcome = Err(ApiError::Ledger(err));
                        break;
                    }
                }
            }
            outcome
        }
    };

    for delivery in &delivered {
        state.metrics.record_delivery(delivery);
    }
    if let Err(ApiError::Ledger(err)) = &outcome {
        state.metrics.record_failure(&err.class().to_string());
    }
    state.commit(&mut net)?;
    outcome?;

    tracing::debug!(count = delivered.len(), "dispatched");
    Ok(Json(DispatchResponse {
        delivered,
        remaining: net.router.pending(),
    }))
}

/// `POST /vault/yield`
async fn yield_handler(
    State(state): State<AppState>,
    Json(req): Json<YieldRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut net = state.devnet.lock();
    if req.loss {
        net.realize_loss(req.amount)?;
    } else {
        net.accrue_yield(req.amount)?;
    }
    state.commit(&mut net)?;

    let vault = net.destination.vault();
    Ok(Json(serde_json::json!({
        "total_assets": vault.total_assets(),
        "assets_per_share": net.destination.assets_per_share(),
    })))
}

/// `POST /vault/pause`
async fn pause_handler(
    State(state): State<AppState>,
    Json(req): Json<PauseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut net = state.devnet.lock();
    net.set_vault_paused(req.paused);
    state.commit(&mut net)?;
    tracing::info!(paused = req.paused, "vault pause toggled");
    Ok(Json(serde_json::json!({ "paused": req.paused })))
}

/// `GET /events`
async fn events_handler(State(state): State<AppState>) -> impl IntoResponse {
    let events = state.events.lock().iter().cloned().collect();
    Json(EventsResponse { events })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
