/// 협상 상태 머신
/// 1. 입찰 (submit_bid)
/// 2. 수락 (accept_bid) — 재고 락 선획득 후 전이
/// 3. 거절 (reject_bid)
/// 4. 만료 (expire_stale)
/// 모든 상태 쓰기는 버전 조건부 UPDATE + 1회 한정 재시도
// region:    --- Imports
use crate::error::CoreError;
use crate::events::{EventPublisher, NegotiationEvent};
use crate::ledger::BidLedger;
use crate::negotiation::model::{Bid, BidderType, Negotiation, NegotiationStatus};
use crate::negotiation::store::NegotiationStore;
use crate::stock_lock::StockReservationLock;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

// endregion: --- Imports

// region:    --- Commands
/// 협상 생성 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateNegotiationCommand {
    pub vendor_id: String,
    pub customer_id: String,
    pub product_id: String,
}

/// 입찰 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubmitBidCommand {
    pub bidder_type: BidderType,
    pub bidder_id: String,
    pub amount: Decimal,
    pub message: Option<String>,
    pub language: String,
}

/// 수락 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AcceptBidCommand {
    pub accepter_type: BidderType,
    pub accepter_id: String,
}

/// 거절 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RejectBidCommand {
    pub rejecter_type: BidderType,
    pub rejecter_id: String,
    pub reason: Option<String>,
}
// endregion: --- Commands

// region:    --- Constants
/// 버전 충돌 시 내부 재시도 횟수 (1회 한정)
const MAX_RETRIES: u32 = 1;

/// 수락 시 재고 락 TTL (초)
pub const LOCK_TTL_SECONDS: u64 = 300;

/// 협상 유휴 만료 기한
pub const STALE_TTL_HOURS: i64 = 24;

/// 이벤트 발행 대기 한도 — 초과/실패 모두 삼킨다
const EVENT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);
// endregion: --- Constants

// region:    --- State Machine
/// 협상 상태 머신
pub struct NegotiationStateMachine {
    store: Arc<dyn NegotiationStore>,
    ledger: Arc<BidLedger>,
    lock: Arc<StockReservationLock>,
    events: Arc<dyn EventPublisher>,
}

impl NegotiationStateMachine {
    pub fn new(
        store: Arc<dyn NegotiationStore>,
        ledger: Arc<BidLedger>,
        lock: Arc<StockReservationLock>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            ledger,
            lock,
            events,
        }
    }

    /// 협상 생성 (OPEN)
    pub async fn create(
        &self,
        cmd: CreateNegotiationCommand,
    ) -> Result<Negotiation, CoreError> {
        let now = Utc::now();
        let negotiation = Negotiation {
            id: Uuid::new_v4(),
            vendor_id: cmd.vendor_id,
            customer_id: cmd.customer_id,
            product_id: cmd.product_id,
            status: NegotiationStatus::Open,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&negotiation).await?;
        info!(
            "{:<12} --> 협상 생성: id={} product={}",
            "Machine", negotiation.id, negotiation.product_id
        );
        Ok(negotiation)
    }

    /// 협상 조회
    pub async fn get(&self, id: Uuid) -> Result<Negotiation, CoreError> {
        self.store
            .get(id)
            .await?
            .ok_or(CoreError::NotFound("negotiation"))
    }

    /// 입찰
    /// 원장 append + COUNTERED 전이를 한 트랜잭션으로 수행하고
    /// 성공 후 번역/음성 이벤트를 best-effort 발행한다
    pub async fn submit_bid(
        &self,
        negotiation_id: Uuid,
        cmd: SubmitBidCommand,
    ) -> Result<Bid, CoreError> {
        if cmd.amount <= Decimal::ZERO {
            return Err(CoreError::Validation(
                "bid amount must be positive".to_string(),
            ));
        }

        let mut retries = 0;
        loop {
            let negotiation = self.get(negotiation_id).await?;

            // 입찰자는 해당 협상의 당사자여야 한다
            let expected = match cmd.bidder_type {
                BidderType::Vendor => &negotiation.vendor_id,
                BidderType::Customer => &negotiation.customer_id,
            };
            if &cmd.bidder_id != expected {
                return Err(CoreError::Validation(
                    "bidder is not a party to this negotiation".to_string(),
                ));
            }

            if !negotiation.status.is_biddable() {
                return Err(CoreError::InvalidStateTransition {
                    from: negotiation.status,
                    to: NegotiationStatus::Countered,
                });
            }

            let bid = Bid {
                seq: 0, // DB가 부여
                id: Uuid::new_v4(),
                negotiation_id,
                bidder_type: cmd.bidder_type,
                bidder_id: cmd.bidder_id.clone(),
                amount: cmd.amount,
                message: cmd.message.clone(),
                language: cmd.language.clone(),
                created_at: Utc::now(),
            };

            match self
                .store
                .append_bid_and_counter(&bid, negotiation.version)
                .await?
            {
                Some(appended) => {
                    info!(
                        "{:<12} --> 입찰 기록: negotiation={} amount={}",
                        "Machine", negotiation_id, appended.amount
                    );
                    // 번역/음성 이벤트 — 실패해도 입찰은 성공
                    self.emit(NegotiationEvent::BidPlaced {
                        negotiation_id,
                        bid_id: appended.id,
                        bidder_id: appended.bidder_id.clone(),
                        amount: appended.amount,
                        message: appended.message.clone(),
                        language: appended.language.clone(),
                        timestamp: appended.created_at,
                    })
                    .await;
                    return Ok(appended);
                }
                None if retries < MAX_RETRIES => {
                    warn!(
                        "{:<12} --> 낙관적 버전 충돌: 재시도 (negotiation={})",
                        "Machine", negotiation_id
                    );
                    retries += 1;
                }
                None => return Err(CoreError::ConcurrencyConflict),
            }
        }
    }

    /// 수락
    /// 재고 락 획득이 성공한 뒤에만 ACCEPTED 전이를 시도한다
    /// 락 점유 중이면 ResourceBusy, 협상 상태는 그대로 둔다
    pub async fn accept_bid(
        &self,
        negotiation_id: Uuid,
        cmd: AcceptBidCommand,
    ) -> Result<Negotiation, CoreError> {
        let mut retries = 0;
        loop {
            let negotiation = self.get(negotiation_id).await?;

            if !negotiation.status.is_biddable() {
                return Err(CoreError::InvalidStateTransition {
                    from: negotiation.status,
                    to: NegotiationStatus::Accepted,
                });
            }

            // 수락자도 입찰자와 마찬가지로 협상 당사자여야 한다
            let expected = match cmd.accepter_type {
                BidderType::Vendor => &negotiation.vendor_id,
                BidderType::Customer => &negotiation.customer_id,
            };
            if &cmd.accepter_id != expected {
                return Err(CoreError::Validation(
                    "accepter is not a party to this negotiation".to_string(),
                ));
            }

            // 입찰 없는 협상은 수락 불가
            let latest = self
                .ledger
                .get_latest(negotiation_id)
                .await?
                .ok_or_else(|| CoreError::Validation("no bids to accept".to_string()))?;

            // 자기 거래 차단: 수락자가 최신 입찰자 본인이면 거부
            if latest.bidder_id == cmd.accepter_id {
                return Err(CoreError::SelfDealing);
            }

            // 전이보다 락이 먼저다 — 실패 시 협상은 손대지 않는다
            let acquired = self
                .lock
                .acquire(&negotiation.product_id, &cmd.accepter_id, LOCK_TTL_SECONDS)
                .await?;
            if !acquired {
                return Err(CoreError::ResourceBusy);
            }

            let now = Utc::now();
            let transitioned = match self
                .store
                .transition(
                    negotiation_id,
                    negotiation.version,
                    NegotiationStatus::Accepted,
                    now,
                )
                .await
            {
                Ok(applied) => applied,
                // 저장소 오류 — 방금 잡은 락을 되돌린 뒤 전파
                Err(e) => {
                    let _ = self
                        .lock
                        .release(&negotiation.product_id, &cmd.accepter_id)
                        .await;
                    return Err(e);
                }
            };
            if transitioned {
                info!(
                    "{:<12} --> 수락: negotiation={} holder={} price={}",
                    "Machine", negotiation_id, cmd.accepter_id, latest.amount
                );
                self.emit(NegotiationEvent::BidAccepted {
                    negotiation_id,
                    product_id: negotiation.product_id.clone(),
                    accepted_by: cmd.accepter_id.clone(),
                    final_price: latest.amount,
                    timestamp: now,
                })
                .await;
                return Ok(Negotiation {
                    status: NegotiationStatus::Accepted,
                    version: negotiation.version + 1,
                    updated_at: now,
                    ..negotiation
                });
            }

            // 버전 충돌 — 방금 잡은 락을 되돌려 예약이 떠돌지 않게 한다
            let _ = self
                .lock
                .release(&negotiation.product_id, &cmd.accepter_id)
                .await;

            if retries < MAX_RETRIES {
                warn!(
                    "{:<12} --> 수락 중 버전 충돌: 재시도 (negotiation={})",
                    "Machine", negotiation_id
                );
                retries += 1;
            } else {
                return Err(CoreError::ConcurrencyConflict);
            }
        }
    }

    /// 거절 (종료 상태)
    pub async fn reject_bid(
        &self,
        negotiation_id: Uuid,
        cmd: RejectBidCommand,
    ) -> Result<Negotiation, CoreError> {
        let rejected = self
            .transition_with_retry(negotiation_id, NegotiationStatus::Rejected)
            .await?;
        self.emit(NegotiationEvent::NegotiationRejected {
            negotiation_id,
            rejected_by: cmd.rejecter_id,
            reason: cmd.reason,
            timestamp: rejected.updated_at,
        })
        .await;
        Ok(rejected)
    }

    /// 결제 협력자 진입점: 예약 확정 (ACCEPTED -> LOCKED)
    pub async fn mark_locked(&self, negotiation_id: Uuid) -> Result<Negotiation, CoreError> {
        self.transition_with_retry(negotiation_id, NegotiationStatus::Locked)
            .await
    }

    /// 결제 협력자 진입점: 판매 완료 (ACCEPTED/LOCKED -> COMPLETED)
    pub async fn complete_sale(&self, negotiation_id: Uuid) -> Result<Negotiation, CoreError> {
        let completed = self
            .transition_with_retry(negotiation_id, NegotiationStatus::Completed)
            .await?;
        self.emit(NegotiationEvent::SaleCompleted {
            negotiation_id,
            product_id: completed.product_id.clone(),
            timestamp: completed.updated_at,
        })
        .await;
        Ok(completed)
    }

    /// 유휴 협상 일괄 만료
    /// updated_at이 ttl보다 오래된 OPEN/COUNTERED만 대상
    pub async fn expire_stale(&self, ttl: ChronoDuration) -> Result<u64, CoreError> {
        let now = Utc::now();
        let expired = self.store.expire_stale_before(now - ttl, now).await?;
        if expired > 0 {
            info!("{:<12} --> 유휴 협상 {}건 만료", "Machine", expired);
        }
        Ok(expired)
    }

    /// 전이 테이블 검증 + 버전 조건부 전이 + 1회 재시도
    async fn transition_with_retry(
        &self,
        negotiation_id: Uuid,
        to: NegotiationStatus,
    ) -> Result<Negotiation, CoreError> {
        let mut retries = 0;
        loop {
            let negotiation = self.get(negotiation_id).await?;

            if !negotiation.status.can_transition_to(to) {
                return Err(CoreError::InvalidStateTransition {
                    from: negotiation.status,
                    to,
                });
            }

            let now = Utc::now();
            if self
                .store
                .transition(negotiation_id, negotiation.version, to, now)
                .await?
            {
                info!(
                    "{:<12} --> 전이: negotiation={} {:?} -> {:?}",
                    "Machine", negotiation_id, negotiation.status, to
                );
                return Ok(Negotiation {
                    status: to,
                    version: negotiation.version + 1,
                    updated_at: now,
                    ..negotiation
                });
            }

            if retries < MAX_RETRIES {
                warn!(
                    "{:<12} --> 전이 중 버전 충돌: 재시도 (negotiation={})",
                    "Machine", negotiation_id
                );
                retries += 1;
            } else {
                return Err(CoreError::ConcurrencyConflict);
            }
        }
    }

    /// 이벤트 발행 (한도 초과/실패 모두 로그만 남긴다)
    async fn emit(&self, event: NegotiationEvent) {
        match tokio::time::timeout(EVENT_PUBLISH_TIMEOUT, self.events.publish(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{:<12} --> 이벤트 발행 실패 (무시): {}", "Machine", e),
            Err(_) => warn!("{:<12} --> 이벤트 발행 대기 한도 초과 (무시)", "Machine"),
        }
    }
}
// endregion: --- State Machine
