//! API Routes
//!
//! HTTP endpoint definitions. Card responses only ever carry the masked
//! number; the CVV is never returned by any endpoint.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::block_request::{BlockRequest, BlockRequestService, BlockRequestStatus};
use crate::card::{CardService, CardView, CreateCardCommand, UpdateCardCommand};
use crate::domain::Identity;
use crate::error::AppError;
use crate::jobs::{JobScheduler, SweepReport};
use crate::transfer::{
    CardStats, TransferCommand, TransferEngine, TransferHistory, TransferOutcome, TransferRecord,
    UserStats,
};

use super::AppState;

// =========================================================================
// Request types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateCardRequest {
    pub owner_id: i64,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCardRequest {
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_card_id: i64,
    pub to_card_id: i64,
    pub amount: String,
    #[serde(default)]
    pub cvv: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBlockRequestBody {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessBlockRequestBody {
    #[serde(default)]
    pub admin_comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct BlockRequestFilter {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, serde::Serialize)]
pub struct PendingCountResponse {
    pub pending_count: i64,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Cards
        .route("/cards", post(create_card))
        .route("/cards", get(list_cards))
        .route("/cards/:card_id", get(get_card))
        .route("/cards/:card_id", patch(update_card))
        .route("/cards/:card_id", delete(delete_card))
        .route("/cards/:card_id/block", post(block_card))
        .route("/cards/:card_id/activate", post(activate_card))
        // Block requests
        .route("/cards/:card_id/block-requests", post(create_block_request))
        .route("/block-requests", get(list_block_requests))
        .route("/block-requests/pending/count", get(pending_count))
        .route("/block-requests/pending/cards", get(pending_cards))
        .route("/block-requests/:request_id/approve", post(approve_block_request))
        .route("/block-requests/:request_id/reject", post(reject_block_request))
        // Transfers
        .route("/transfers", post(transfer))
        .route("/transfers", get(my_transfers))
        .route("/cards/:card_id/transfers", get(card_transfers))
        // Statistics
        .route("/cards/:card_id/stats", get(card_stats))
        .route("/users/:user_id/stats", get(user_stats))
        // Admin maintenance
        .route("/admin/sweep-expired", post(run_sweep))
}

// =========================================================================
// Card endpoints
// =========================================================================

/// Issue a new card for a user (admin)
async fn create_card(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<CreateCardRequest>,
) -> Result<(StatusCode, Json<CardView>), AppError> {
    let service = CardService::new(state.pool, state.codec);

    let command = CreateCardCommand {
        owner_id: request.owner_id,
        expiration_date: request.expiration_date,
    };

    let card = service.create_for_user(command, &identity).await?;

    Ok((StatusCode::CREATED, Json(card)))
}

/// List cards: own cards for users, all cards for admins
async fn list_cards(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<CardView>>, AppError> {
    let service = CardService::new(state.pool, state.codec);
    let cards = service
        .list(&identity, page.limit.min(1000), page.offset)
        .await?;

    Ok(Json(cards))
}

/// Get one card
async fn get_card(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(card_id): Path<i64>,
) -> Result<Json<CardView>, AppError> {
    let service = CardService::new(state.pool, state.codec);
    let card = service.get(card_id, &identity).await?;

    Ok(Json(card))
}

/// Update a card's holder / expiration (admin)
async fn update_card(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(card_id): Path<i64>,
    Json(request): Json<UpdateCardRequest>,
) -> Result<Json<CardView>, AppError> {
    let service = CardService::new(state.pool, state.codec);

    let command = UpdateCardCommand {
        expiration_date: request.expiration_date,
    };

    let card = service.update(card_id, command, &identity).await?;

    Ok(Json(card))
}

/// Delete a card and its referencing rows (admin)
async fn delete_card(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(card_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let service = CardService::new(state.pool, state.codec);
    service.delete(card_id, &identity).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Block a card (admin)
async fn block_card(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(card_id): Path<i64>,
) -> Result<Json<CardView>, AppError> {
    let service = CardService::new(state.pool, state.codec);
    let card = service.block(card_id, &identity).await?;

    Ok(Json(card))
}

/// Re-activate a blocked card (admin)
async fn activate_card(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(card_id): Path<i64>,
) -> Result<Json<CardView>, AppError> {
    let service = CardService::new(state.pool, state.codec);
    let card = service.activate(card_id, &identity).await?;

    Ok(Json(card))
}

// =========================================================================
// Block-request endpoints
// =========================================================================

/// Request a block on one of the caller's cards
async fn create_block_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(card_id): Path<i64>,
    Json(body): Json<CreateBlockRequestBody>,
) -> Result<(StatusCode, Json<BlockRequest>), AppError> {
    let service = BlockRequestService::new(state.pool, state.codec);
    let request = service.create(card_id, body.reason, &identity).await?;

    Ok((StatusCode::CREATED, Json(request)))
}

/// List block requests, optionally filtered by status (admin)
async fn list_block_requests(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(filter): Query<BlockRequestFilter>,
) -> Result<Json<Vec<BlockRequest>>, AppError> {
    let status = match filter.status.as_deref() {
        Some(s) => Some(BlockRequestStatus::from_str_opt(s).ok_or_else(|| {
            AppError::InvalidRequest(format!("Unknown block request status '{}'", s))
        })?),
        None => None,
    };

    let service = BlockRequestService::new(state.pool, state.codec);
    let requests = service
        .list(status, &identity, filter.limit.min(1000), filter.offset)
        .await?;

    Ok(Json(requests))
}

/// Count of PENDING requests (admin)
async fn pending_count(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<PendingCountResponse>, AppError> {
    let service = BlockRequestService::new(state.pool, state.codec);
    let pending_count = service.pending_count(&identity).await?;

    Ok(Json(PendingCountResponse { pending_count }))
}

/// Cards with at least one PENDING request (admin)
async fn pending_cards(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<CardView>>, AppError> {
    let service = BlockRequestService::new(state.pool, state.codec);
    let cards = service.cards_with_pending(&identity).await?;

    Ok(Json(cards))
}

/// Approve a PENDING request and block the card (admin)
async fn approve_block_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(request_id): Path<i64>,
    Json(body): Json<ProcessBlockRequestBody>,
) -> Result<Json<BlockRequest>, AppError> {
    let service = BlockRequestService::new(state.pool, state.codec);
    let request = service
        .approve(request_id, body.admin_comment, &identity)
        .await?;

    Ok(Json(request))
}

/// Reject a PENDING request (admin)
async fn reject_block_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(request_id): Path<i64>,
    Json(body): Json<ProcessBlockRequestBody>,
) -> Result<Json<BlockRequest>, AppError> {
    let service = BlockRequestService::new(state.pool, state.codec);
    let request = service
        .reject(request_id, body.admin_comment, &identity)
        .await?;

    Ok(Json(request))
}

// =========================================================================
// Transfer endpoints
// =========================================================================

/// Execute a transfer between two cards
async fn transfer(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransferOutcome>, AppError> {
    let engine = TransferEngine::new(state.pool, state.codec);

    let mut command =
        TransferCommand::new(request.from_card_id, request.to_card_id, request.amount);
    if let Some(cvv) = request.cvv {
        command = command.with_cvv(cvv);
    }
    if let Some(description) = request.description {
        command = command.with_description(description);
    }

    let outcome = engine.execute(command, &identity).await?;

    Ok(Json(outcome))
}

/// The caller's transfer history (either side)
async fn my_transfers(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<TransferRecord>>, AppError> {
    let history = TransferHistory::new(state.pool);
    let transfers = history
        .by_user(identity.user_id, page.limit.min(1000), page.offset)
        .await?;

    Ok(Json(transfers))
}

/// Transfers touching one card
async fn card_transfers(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(card_id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<TransferRecord>>, AppError> {
    let history = TransferHistory::new(state.pool);
    let transfers = history
        .by_card(card_id, &identity, page.limit.min(1000), page.offset)
        .await?;

    Ok(Json(transfers))
}

// =========================================================================
// Statistics endpoints
// =========================================================================

/// Income/expense statistics for one card
async fn card_stats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(card_id): Path<i64>,
) -> Result<Json<CardStats>, AppError> {
    let history = TransferHistory::new(state.pool);
    let stats = history.card_stats(card_id, &identity).await?;

    Ok(Json(stats))
}

/// Income/expense statistics summed across a user's cards
async fn user_stats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserStats>, AppError> {
    let history = TransferHistory::new(state.pool);
    let stats = history.user_stats(user_id, &identity).await?;

    Ok(Json(stats))
}

// =========================================================================
// Admin maintenance
// =========================================================================

/// Trigger the expiration sweep manually (admin)
async fn run_sweep(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<SweepReport>, AppError> {
    if !identity.is_admin() {
        return Err(AppError::Forbidden("admin role required".to_string()));
    }

    let scheduler = JobScheduler::new(state.pool);
    let report = scheduler.run_once().await;

    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_request_deserialize() {
        let json = r#"{
            "from_card_id": 1,
            "to_card_id": 2,
            "amount": "100.50",
            "cvv": "123",
            "description": "Test payment"
        }"#;

        let request: TransferRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.amount, "100.50");
        assert_eq!(request.cvv, Some("123".to_string()));
    }

    #[test]
    fn test_transfer_request_optional_fields_default() {
        let json = r#"{"from_card_id": 1, "to_card_id": 2, "amount": "10"}"#;

        let request: TransferRequest = serde_json::from_str(json).unwrap();
        assert!(request.cvv.is_none());
        assert!(request.description.is_none());
    }

    #[test]
    fn test_page_query_defaults() {
        let query: PageQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.limit, 50);
        assert_eq!(query.offset, 0);
    }

    #[test]
    fn test_create_card_request_deserialize() {
        let json = r#"{"owner_id": 42}"#;

        let request: CreateCardRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.owner_id, 42);
        assert!(request.expiration_date.is_none());
    }

    #[test]
    fn test_block_request_filter_status_passthrough() {
        let filter: BlockRequestFilter =
            serde_json::from_str(r#"{"status": "PENDING"}"#).unwrap();
        assert_eq!(filter.status.as_deref(), Some("PENDING"));
    }
}
