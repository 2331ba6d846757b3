/// 코어 오류 분류
/// 1. 입력 검증 실패 (ValidationError)
/// 2. 대상 없음 (NotFoundError)
/// 3. 허용되지 않은 상태 전이 (InvalidStateTransition)
/// 4. 재고 락 점유 중 (ResourceBusy)
/// 5. 낙관적 버전 충돌 (ConcurrencyConflict)
/// 6. 자기 거래 (SelfDealingError)
// region:    --- Imports
use crate::negotiation::model::NegotiationStatus;
use axum::http::StatusCode;
use thiserror::Error;

// endregion: --- Imports

// region:    --- CoreError
#[derive(Debug, Error)]
pub enum CoreError {
    /// 잘못된 입력 (상태 변경 전에 거부)
    #[error("validation failed: {0}")]
    Validation(String),

    /// 협상 또는 상품을 찾을 수 없음
    #[error("{0} not found")]
    NotFound(&'static str),

    /// 상태 전이 테이블에 없는 전이 요청
    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidStateTransition {
        from: NegotiationStatus,
        to: NegotiationStatus,
    },

    /// 다른 행위자가 재고 락을 보유 중 (재시도 가능)
    #[error("stock lock is held by another actor")]
    ResourceBusy,

    /// 내부 1회 재시도 후에도 버전 충돌 (재시도 가능)
    #[error("optimistic concurrency conflict on negotiation update")]
    ConcurrencyConflict,

    /// 수락자가 최신 입찰자 본인
    #[error("accepter is the latest bidder (self-dealing)")]
    SelfDealing,

    /// 고속 저장소 접근 불가 — acquire는 fail-closed
    #[error("fast store unavailable: {0}")]
    LockStoreUnavailable(String),

    /// 영속 저장소 오류
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CoreError {
    /// HTTP 상태 코드 매핑
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) | CoreError::SelfDealing => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::InvalidStateTransition { .. }
            | CoreError::ResourceBusy
            | CoreError::ConcurrencyConflict => StatusCode::CONFLICT,
            CoreError::LockStoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 클라이언트가 재시도할 가치가 있는 오류인지
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::ResourceBusy | CoreError::ConcurrencyConflict
        )
    }
}
// endregion: --- CoreError
