// region:    --- Imports
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// endregion: --- Imports

// region:    --- Negotiation Status
/// 협상 상태
/// 전이 테이블은 `can_transition_to` 참조
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NegotiationStatus {
    Open,
    Countered,
    Accepted,
    Locked,
    Completed,
    Rejected,
    Expired,
}

impl NegotiationStatus {
    /// 허용된 상태 전이인지 검사
    /// OPEN      -> COUNTERED | ACCEPTED | REJECTED | EXPIRED
    /// COUNTERED -> COUNTERED | ACCEPTED | REJECTED | EXPIRED
    /// ACCEPTED  -> LOCKED | COMPLETED
    /// LOCKED    -> COMPLETED | EXPIRED
    /// COMPLETED / REJECTED / EXPIRED -> (종료 상태)
    pub fn can_transition_to(self, to: NegotiationStatus) -> bool {
        use NegotiationStatus::*;
        match self {
            Open | Countered => matches!(to, Countered | Accepted | Rejected | Expired),
            Accepted => matches!(to, Locked | Completed),
            Locked => matches!(to, Completed | Expired),
            Completed | Rejected | Expired => false,
        }
    }

    /// 종료 상태 여부
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NegotiationStatus::Completed | NegotiationStatus::Rejected | NegotiationStatus::Expired
        )
    }

    /// 입찰/수락이 가능한 상태 여부
    pub fn is_biddable(self) -> bool {
        matches!(self, NegotiationStatus::Open | NegotiationStatus::Countered)
    }

    /// DB TEXT 컬럼 값
    pub fn as_str(self) -> &'static str {
        match self {
            NegotiationStatus::Open => "OPEN",
            NegotiationStatus::Countered => "COUNTERED",
            NegotiationStatus::Accepted => "ACCEPTED",
            NegotiationStatus::Locked => "LOCKED",
            NegotiationStatus::Completed => "COMPLETED",
            NegotiationStatus::Rejected => "REJECTED",
            NegotiationStatus::Expired => "EXPIRED",
        }
    }

    /// DB TEXT 컬럼 값 파싱
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(NegotiationStatus::Open),
            "COUNTERED" => Some(NegotiationStatus::Countered),
            "ACCEPTED" => Some(NegotiationStatus::Accepted),
            "LOCKED" => Some(NegotiationStatus::Locked),
            "COMPLETED" => Some(NegotiationStatus::Completed),
            "REJECTED" => Some(NegotiationStatus::Rejected),
            "EXPIRED" => Some(NegotiationStatus::Expired),
            _ => None,
        }
    }
}
// endregion: --- Negotiation Status

// region:    --- Bidder Type
/// 입찰자 구분
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidderType {
    Vendor,
    Customer,
}

impl BidderType {
    pub fn as_str(self) -> &'static str {
        match self {
            BidderType::Vendor => "vendor",
            BidderType::Customer => "customer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vendor" => Some(BidderType::Vendor),
            "customer" => Some(BidderType::Customer),
            _ => None,
        }
    }
}
// endregion: --- Bidder Type

// region:    --- Negotiation Model
/// 협상 모델 (입찰 스레드당 1행)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Negotiation {
    pub id: Uuid,
    pub vendor_id: String,
    pub customer_id: String,
    pub product_id: String,
    pub status: NegotiationStatus,
    /// 낙관적 동시성 제어용 버전 (상태 변경마다 +1)
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 입찰 모델 (불변, (created_at, seq) 오름차순이 정렬 기준)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    /// 삽입 순서 (BIGSERIAL) — created_at 동률 시 타이브레이커
    pub seq: i64,
    pub id: Uuid,
    pub negotiation_id: Uuid,
    pub bidder_type: BidderType,
    pub bidder_id: String,
    pub amount: Decimal,
    pub message: Option<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
}
// endregion: --- Negotiation Model

// endregion: --- Tests
