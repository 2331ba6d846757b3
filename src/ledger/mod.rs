/// 입찰 원장 (append-only, 정렬 기준의 단일 출처)
/// append는 협상 전이와 같은 트랜잭션에서만 일어난다 (negotiation::store 참조)
// region:    --- Imports
use crate::error::CoreError;
use crate::negotiation::model::Bid;
use crate::negotiation::store::BidRow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

// endregion: --- Imports

// region:    --- Queries
/// 최신 입찰 조회 (created_at 최대, 동률이면 seq가 큰 쪽)
const GET_LATEST_BID: &str = r#"
    SELECT seq, id, negotiation_id, bidder_type, bidder_id, amount, message, language, created_at
    FROM bids
    WHERE negotiation_id = $1
    ORDER BY created_at DESC, seq DESC
    LIMIT 1
"#;

/// 입찰 이력 조회 ((created_at, seq) 오름차순)
const GET_ALL_BIDS: &str = r#"
    SELECT seq, id, negotiation_id, bidder_type, bidder_id, amount, message, language, created_at
    FROM bids
    WHERE negotiation_id = $1
    ORDER BY created_at ASC, seq ASC
"#;

/// 보존 기간 경과 입찰 삭제 (종료 상태 협상만 대상, 정합성 범위 밖)
const PRUNE_BIDS: &str = r#"
    DELETE FROM bids
    USING negotiations n
    WHERE bids.negotiation_id = n.id
      AND n.status IN ('COMPLETED', 'REJECTED', 'EXPIRED')
      AND bids.created_at < $1
"#;
// endregion: --- Queries

// region:    --- Bid Store Trait
/// 입찰 원장 저장소 트레이트
#[async_trait]
pub trait BidStore: Send + Sync {
    async fn latest(&self, negotiation_id: Uuid) -> Result<Option<Bid>, CoreError>;
    async fn all(&self, negotiation_id: Uuid) -> Result<Vec<Bid>, CoreError>;
    async fn prune_terminated_before(&self, cutoff: DateTime<Utc>) -> Result<u64, CoreError>;
}

/// 입찰 원장 저장소 Postgres 구현체
pub struct PostgresBidStore {
    pool: Arc<PgPool>,
}

impl PostgresBidStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BidStore for PostgresBidStore {
    async fn latest(&self, negotiation_id: Uuid) -> Result<Option<Bid>, CoreError> {
        let row = sqlx::query_as::<_, BidRow>(GET_LATEST_BID)
            .bind(negotiation_id)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(Bid::try_from).transpose().map_err(CoreError::from)
    }

    async fn all(&self, negotiation_id: Uuid) -> Result<Vec<Bid>, CoreError> {
        let rows = sqlx::query_as::<_, BidRow>(GET_ALL_BIDS)
            .bind(negotiation_id)
            .fetch_all(&*self.pool)
            .await?;
        rows.into_iter()
            .map(|row| Bid::try_from(row).map_err(CoreError::from))
            .collect()
    }

    async fn prune_terminated_before(&self, cutoff: DateTime<Utc>) -> Result<u64, CoreError> {
        let result = sqlx::query(PRUNE_BIDS)
            .bind(cutoff)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
// endregion: --- Bid Store Trait

// region:    --- Bid Ledger
/// 입찰 원장
pub struct BidLedger {
    store: Arc<dyn BidStore>,
}

impl BidLedger {
    pub fn new(store: Arc<dyn BidStore>) -> Self {
        Self { store }
    }

    /// 최신 입찰 조회
    pub async fn get_latest(&self, negotiation_id: Uuid) -> Result<Option<Bid>, CoreError> {
        self.store.latest(negotiation_id).await
    }

    /// 입찰 이력 조회 (오름차순)
    pub async fn get_all(&self, negotiation_id: Uuid) -> Result<Vec<Bid>, CoreError> {
        self.store.all(negotiation_id).await
    }

    /// 보존 기간 경과 입찰 정리
    pub async fn prune_terminated_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let pruned = self.store.prune_terminated_before(cutoff).await?;
        if pruned > 0 {
            info!("{:<12} --> 보존 기간 경과 입찰 {}건 정리", "Ledger", pruned);
        }
        Ok(pruned)
    }
}
// endregion: --- Bid Ledger
