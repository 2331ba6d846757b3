// region:    --- Imports
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// endregion: --- Imports

// region:    --- Negotiation Events
/// 전이 성공 후 발행되는 아웃바운드 이벤트
/// 번역/음성 워커와 결제 협력자가 비동기로 소비한다
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum NegotiationEvent {
    /// 입찰 이벤트 (번역 + 음성 합성 요청의 원천)
    BidPlaced {
        negotiation_id: Uuid,
        bid_id: Uuid,
        bidder_id: String,
        amount: Decimal,
        message: Option<String>,
        language: String,
        timestamp: DateTime<Utc>,
    },
    /// 수락 이벤트 (결제 협력자 입력: negotiation_id, product_id, final_price)
    BidAccepted {
        negotiation_id: Uuid,
        product_id: String,
        accepted_by: String,
        final_price: Decimal,
        timestamp: DateTime<Utc>,
    },
    /// 거절 이벤트
    NegotiationRejected {
        negotiation_id: Uuid,
        rejected_by: String,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// 판매 완료 이벤트
    SaleCompleted {
        negotiation_id: Uuid,
        product_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl NegotiationEvent {
    /// 파티셔닝 키 (협상 단위 순서 보장)
    pub fn key(&self) -> Uuid {
        match self {
            NegotiationEvent::BidPlaced { negotiation_id, .. }
            | NegotiationEvent::BidAccepted { negotiation_id, .. }
            | NegotiationEvent::NegotiationRejected { negotiation_id, .. }
            | NegotiationEvent::SaleCompleted { negotiation_id, .. } => *negotiation_id,
        }
    }
}
// endregion: --- Negotiation Events

// region:    --- Event Publisher Trait
/// 아웃바운드 이벤트 발행 트레이트
/// 발행은 항상 best-effort — 실패해도 본 연산은 성공으로 남는다
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &NegotiationEvent) -> Result<(), String>;
}
// endregion: --- Event Publisher Trait
