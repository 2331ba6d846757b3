// region:    --- Imports
use crate::error::CoreError;
use crate::ledger::BidLedger;
use crate::negotiation::machine::{
    AcceptBidCommand, CreateNegotiationCommand, NegotiationStateMachine, RejectBidCommand,
    SubmitBidCommand,
};
use crate::stock_lock::StockReservationLock;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

// endregion: --- Imports

// region:    --- App State
#[derive(Clone)]
pub struct AppState {
    pub machine: Arc<NegotiationStateMachine>,
    pub ledger: Arc<BidLedger>,
    pub lock: Arc<StockReservationLock>,
}

/// 코어 오류 -> HTTP 응답
fn error_response(e: CoreError) -> Response {
    (
        e.status_code(),
        Json(serde_json::json!({
            "error": e.to_string(),
            "retryable": e.is_retryable(),
        })),
    )
        .into_response()
}
// endregion: --- App State

// region:    --- Command Handlers

/// 협상 생성 요청 처리
pub async fn handle_create_negotiation(
    State(state): State<AppState>,
    Json(cmd): Json<CreateNegotiationCommand>,
) -> impl IntoResponse {
    info!("{:<12} --> 협상 생성 요청: {:?}", "Handler", cmd);
    match state.machine.create(cmd).await {
        Ok(negotiation) => (axum::http::StatusCode::CREATED, Json(negotiation)).into_response(),
        Err(e) => error_response(e),
    }
}

/// 입찰 요청 처리
pub async fn handle_submit_bid(
    State(state): State<AppState>,
    Path(negotiation_id): Path<Uuid>,
    Json(cmd): Json<SubmitBidCommand>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 입찰 요청: negotiation={} {:?}",
        "Handler", negotiation_id, cmd
    );
    match state.machine.submit_bid(negotiation_id, cmd).await {
        Ok(bid) => (axum::http::StatusCode::CREATED, Json(bid)).into_response(),
        Err(e) => error_response(e),
    }
}

/// 수락 요청 처리
pub async fn handle_accept_bid(
    State(state): State<AppState>,
    Path(negotiation_id): Path<Uuid>,
    Json(cmd): Json<AcceptBidCommand>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 수락 요청: negotiation={} {:?}",
        "Handler", negotiation_id, cmd
    );
    match state.machine.accept_bid(negotiation_id, cmd).await {
        Ok(negotiation) => Json(negotiation).into_response(),
        Err(e) => error_response(e),
    }
}

/// 거절 요청 처리
pub async fn handle_reject_bid(
    State(state): State<AppState>,
    Path(negotiation_id): Path<Uuid>,
    Json(cmd): Json<RejectBidCommand>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 거절 요청: negotiation={} {:?}",
        "Handler", negotiation_id, cmd
    );
    match state.machine.reject_bid(negotiation_id, cmd).await {
        Ok(negotiation) => Json(negotiation).into_response(),
        Err(e) => error_response(e),
    }
}

/// 결제 완료 콜백 본문
#[derive(Debug, Deserialize)]
pub struct CompleteSaleRequest {
    /// 결제 시점의 락 보유자 (수락자)
    pub holder_id: String,
}

/// 결제 완료 콜백 처리
/// 판매 완료 전이 후 보유자 일치 조건으로 재고 락을 반환한다
pub async fn handle_complete_sale(
    State(state): State<AppState>,
    Path(negotiation_id): Path<Uuid>,
    Json(req): Json<CompleteSaleRequest>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 결제 완료 콜백: negotiation={} holder={}",
        "Handler", negotiation_id, req.holder_id
    );
    match state.machine.complete_sale(negotiation_id).await {
        Ok(negotiation) => {
            match state
                .lock
                .release(&negotiation.product_id, &req.holder_id)
                .await
            {
                Ok(_) => Json(negotiation).into_response(),
                Err(e) => error_response(e),
            }
        }
        Err(e) => error_response(e),
    }
}

/// 예약 확정 콜백 처리 (ACCEPTED -> LOCKED)
pub async fn handle_mark_locked(
    State(state): State<AppState>,
    Path(negotiation_id): Path<Uuid>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 예약 확정 콜백: negotiation={}",
        "Handler", negotiation_id
    );
    match state.machine.mark_locked(negotiation_id).await {
        Ok(negotiation) => Json(negotiation).into_response(),
        Err(e) => error_response(e),
    }
}

/// 재고 락 강제 해제 (관리용)
pub async fn handle_force_release(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 락 강제 해제 요청: product={}",
        "Handler", product_id
    );
    match state.lock.force_release(&product_id).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

/// 협상 조회
pub async fn handle_get_negotiation(
    State(state): State<AppState>,
    Path(negotiation_id): Path<Uuid>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 협상 조회: id={}",
        "HandlerQuery", negotiation_id
    );
    match state.machine.get(negotiation_id).await {
        Ok(negotiation) => Json(negotiation).into_response(),
        Err(e) => error_response(e),
    }
}

/// 입찰 이력 조회
pub async fn handle_get_bids(
    State(state): State<AppState>,
    Path(negotiation_id): Path<Uuid>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 입찰 이력 조회: negotiation={}",
        "HandlerQuery", negotiation_id
    );
    match state.ledger.get_all(negotiation_id).await {
        Ok(bids) => Json(bids).into_response(),
        Err(e) => error_response(e),
    }
}

/// 최신 입찰 조회
pub async fn handle_get_latest_bid(
    State(state): State<AppState>,
    Path(negotiation_id): Path<Uuid>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 최신 입찰 조회: negotiation={}",
        "HandlerQuery", negotiation_id
    );
    match state.ledger.get_latest(negotiation_id).await {
        Ok(Some(bid)) => Json(bid).into_response(),
        Ok(None) => error_response(CoreError::NotFound("bid")),
        Err(e) => error_response(e),
    }
}

// endregion: --- Query Handlers
