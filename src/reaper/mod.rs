/// 만료 리퍼
/// 주기마다 (1) 유휴 협상 만료 (2) 만료 미러 보정 (3) 보존 기간 정리
/// 모든 쓰기가 조건부라 워커 다중 실행에도 안전하다
// region:    --- Imports
use crate::ledger::BidLedger;
use crate::negotiation::machine::{NegotiationStateMachine, STALE_TTL_HOURS};
use crate::stock_lock::StockReservationLock;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error};

// endregion: --- Imports

// region:    --- Expiry Reaper
/// 스윕 주기 (초)
const SWEEP_INTERVAL_SECONDS: u64 = 60;

/// 입찰 보존 기간 (일) — 종료된 협상의 입찰만 정리 대상
const BID_RETENTION_DAYS: i64 = 90;

/// 만료 리퍼
pub struct ExpiryReaper {
    machine: Arc<NegotiationStateMachine>,
    lock: Arc<StockReservationLock>,
    ledger: Arc<BidLedger>,
}

impl ExpiryReaper {
    pub fn new(
        machine: Arc<NegotiationStateMachine>,
        lock: Arc<StockReservationLock>,
        ledger: Arc<BidLedger>,
    ) -> Self {
        Self {
            machine,
            lock,
            ledger,
        }
    }

    /// 리퍼 시작
    pub async fn start(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(SWEEP_INTERVAL_SECONDS));
            loop {
                interval.tick().await;
                self.sweep().await;
            }
        });
    }

    /// 스윕 1회 (각 단계는 독립적으로 실패할 수 있다)
    pub async fn sweep(&self) {
        if let Err(e) = self
            .machine
            .expire_stale(ChronoDuration::hours(STALE_TTL_HOURS))
            .await
        {
            error!("{:<12} --> 유휴 협상 만료 중 오류: {:?}", "Reaper", e);
        }

        if let Err(e) = self.lock.reconcile_mirror().await {
            error!("{:<12} --> 미러 보정 중 오류: {:?}", "Reaper", e);
        }

        let retention_cutoff = Utc::now() - ChronoDuration::days(BID_RETENTION_DAYS);
        if let Err(e) = self.ledger.prune_terminated_before(retention_cutoff).await {
            error!("{:<12} --> 입찰 보존 정리 중 오류: {:?}", "Reaper", e);
        }

        debug!("{:<12} --> 스윕 완료", "Reaper");
    }
}
// endregion: --- Expiry Reaper
