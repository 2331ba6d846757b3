/// 협상 영속 저장소
/// 상태 전이는 전부 버전 조건부 UPDATE (affected-row-count 검증)
// region:    --- Imports
use crate::error::CoreError;
use crate::negotiation::model::{Bid, BidderType, Negotiation, NegotiationStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

// endregion: --- Imports

// region:    --- Store Trait
/// 협상 저장소 트레이트
#[async_trait]
pub trait NegotiationStore: Send + Sync {
    /// OPEN 협상 삽입
    async fn insert(&self, negotiation: &Negotiation) -> Result<(), CoreError>;

    /// 협상 조회
    async fn get(&self, id: Uuid) -> Result<Option<Negotiation>, CoreError>;

    /// 조건부 상태 전이
    /// `expected_version` 일치 시에만 적용, 적용 여부 반환
    async fn transition(
        &self,
        id: Uuid,
        expected_version: i64,
        to: NegotiationStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError>;

    /// 입찰 1건 append + COUNTERED 전이를 하나의 트랜잭션으로 수행
    /// 버전 충돌 시 아무것도 기록하지 않고 None 반환
    /// 성공 시 DB가 부여한 seq가 채워진 Bid 반환
    async fn append_bid_and_counter(
        &self,
        bid: &Bid,
        expected_version: i64,
    ) -> Result<Option<Bid>, CoreError>;

    /// cutoff 이전에 마지막으로 갱신된 OPEN/COUNTERED 협상을 일괄 EXPIRED 처리
    /// 전이된 행 수 반환
    async fn expire_stale_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError>;
}
// endregion: --- Store Trait

// region:    --- Queries
const INSERT_NEGOTIATION: &str = r#"
    INSERT INTO negotiations (id, vendor_id, customer_id, product_id, status, version, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

const GET_NEGOTIATION: &str = r#"
    SELECT id, vendor_id, customer_id, product_id, status, version, created_at, updated_at
    FROM negotiations
    WHERE id = $1
"#;

const TRANSITION_NEGOTIATION: &str = r#"
    UPDATE negotiations
    SET status = $1, version = version + 1, updated_at = $2
    WHERE id = $3 AND version = $4
"#;

const APPEND_BID: &str = r#"
    INSERT INTO bids (id, negotiation_id, bidder_type, bidder_id, amount, message, language, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    RETURNING seq
"#;

const EXPIRE_STALE: &str = r#"
    UPDATE negotiations
    SET status = 'EXPIRED', version = version + 1, updated_at = $1
    WHERE status IN ('OPEN', 'COUNTERED') AND updated_at < $2
"#;
// endregion: --- Queries

// region:    --- Row Mapping
/// negotiations 행 (row -> record 매핑 전용)
#[derive(FromRow)]
pub struct NegotiationRow {
    pub id: Uuid,
    pub vendor_id: String,
    pub customer_id: String,
    pub product_id: String,
    pub status: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<NegotiationRow> for Negotiation {
    type Error = sqlx::Error;

    fn try_from(row: NegotiationRow) -> Result<Self, Self::Error> {
        let status = NegotiationStatus::parse(&row.status)
            .ok_or_else(|| sqlx::Error::Protocol(format!("unknown status: {}", row.status)))?;
        Ok(Negotiation {
            id: row.id,
            vendor_id: row.vendor_id,
            customer_id: row.customer_id,
            product_id: row.product_id,
            status,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// bids 행 (row -> record 매핑 전용)
#[derive(FromRow)]
pub struct BidRow {
    pub seq: i64,
    pub id: Uuid,
    pub negotiation_id: Uuid,
    pub bidder_type: String,
    pub bidder_id: String,
    pub amount: Decimal,
    pub message: Option<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<BidRow> for Bid {
    type Error = sqlx::Error;

    fn try_from(row: BidRow) -> Result<Self, Self::Error> {
        let bidder_type = BidderType::parse(&row.bidder_type).ok_or_else(|| {
            sqlx::Error::Protocol(format!("unknown bidder_type: {}", row.bidder_type))
        })?;
        Ok(Bid {
            seq: row.seq,
            id: row.id,
            negotiation_id: row.negotiation_id,
            bidder_type,
            bidder_id: row.bidder_id,
            amount: row.amount,
            message: row.message,
            language: row.language,
            created_at: row.created_at,
        })
    }
}
// endregion: --- Row Mapping

// region:    --- Postgres Store
/// 협상 저장소 Postgres 구현체
pub struct PostgresNegotiationStore {
    pool: Arc<PgPool>,
}

impl PostgresNegotiationStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NegotiationStore for PostgresNegotiationStore {
    async fn insert(&self, negotiation: &Negotiation) -> Result<(), CoreError> {
        sqlx::query(INSERT_NEGOTIATION)
            .bind(negotiation.id)
            .bind(&negotiation.vendor_id)
            .bind(&negotiation.customer_id)
            .bind(&negotiation.product_id)
            .bind(negotiation.status.as_str())
            .bind(negotiation.version)
            .bind(negotiation.created_at)
            .bind(negotiation.updated_at)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Negotiation>, CoreError> {
        let row = sqlx::query_as::<_, NegotiationRow>(GET_NEGOTIATION)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(Negotiation::try_from)
            .transpose()
            .map_err(CoreError::from)
    }

    async fn transition(
        &self,
        id: Uuid,
        expected_version: i64,
        to: NegotiationStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(TRANSITION_NEGOTIATION)
            .bind(to.as_str())
            .bind(now)
            .bind(id)
            .bind(expected_version)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn append_bid_and_counter(
        &self,
        bid: &Bid,
        expected_version: i64,
    ) -> Result<Option<Bid>, CoreError> {
        let mut tx = self.pool.begin().await?;

        // 버전 조건부 COUNTERED 전이
        let updated = sqlx::query(TRANSITION_NEGOTIATION)
            .bind(NegotiationStatus::Countered.as_str())
            .bind(bid.created_at)
            .bind(bid.negotiation_id)
            .bind(expected_version)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        // 원장 append (seq는 DB가 부여)
        let seq = sqlx::query_scalar::<_, i64>(APPEND_BID)
            .bind(bid.id)
            .bind(bid.negotiation_id)
            .bind(bid.bidder_type.as_str())
            .bind(&bid.bidder_id)
            .bind(bid.amount)
            .bind(&bid.message)
            .bind(&bid.language)
            .bind(bid.created_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut appended = bid.clone();
        appended.seq = seq;
        Ok(Some(appended))
    }

    async fn expire_stale_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let result = sqlx::query(EXPIRE_STALE)
            .bind(now)
            .bind(cutoff)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
// endregion: --- Postgres Store
