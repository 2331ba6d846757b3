/// 재고 락 영속 미러 (감사/복구용)
/// 모든 쓰기는 조건부 — 만료되지 않은 기존 행은 절대 덮어쓰지 않는다
// region:    --- Imports
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

// endregion: --- Imports

// region:    --- Queries
/// 미러 upsert — 기존 행이 이미 만료된 경우에만 덮어쓴다
const UPSERT_MIRROR: &str = r#"
    INSERT INTO stock_locks (product_id, locked_by, locked_at, expires_at)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (product_id) DO UPDATE
    SET locked_by = EXCLUDED.locked_by,
        locked_at = EXCLUDED.locked_at,
        expires_at = EXCLUDED.expires_at
    WHERE stock_locks.expires_at <= EXCLUDED.locked_at
"#;

const DELETE_MIRROR_FOR_HOLDER: &str =
    "DELETE FROM stock_locks WHERE product_id = $1 AND locked_by = $2";

const EXTEND_MIRROR_FOR_HOLDER: &str =
    "UPDATE stock_locks SET expires_at = $3 WHERE product_id = $1 AND locked_by = $2";

const DELETE_MIRROR: &str = "DELETE FROM stock_locks WHERE product_id = $1";

const EXPIRED_CANDIDATES: &str = "SELECT product_id FROM stock_locks WHERE expires_at <= $1";

const DELETE_MIRROR_IF_EXPIRED: &str =
    "DELETE FROM stock_locks WHERE product_id = $1 AND expires_at <= $2";
// endregion: --- Queries

// region:    --- Lock Mirror Trait
/// 재고 락 미러 트레이트
#[async_trait]
pub trait LockMirror: Send + Sync {
    /// 기존 행이 만료된 경우에만 덮어쓰는 upsert
    async fn upsert_if_expired(
        &self,
        product_id: &str,
        holder_id: &str,
        locked_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error>;

    /// 보유자 일치 행만 삭제
    async fn delete_for_holder(&self, product_id: &str, holder_id: &str)
        -> Result<(), sqlx::Error>;

    /// 보유자 일치 행의 만료 시각 연장
    async fn extend_for_holder(
        &self,
        product_id: &str,
        holder_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error>;

    /// 무조건 삭제 (관리용)
    async fn delete(&self, product_id: &str) -> Result<(), sqlx::Error>;

    /// 만료 시각이 지난 미러 행의 product_id 목록
    async fn expired_candidates(&self, now: DateTime<Utc>) -> Result<Vec<String>, sqlx::Error>;

    /// 여전히 만료 상태인 경우에만 삭제, 삭제 여부 반환
    async fn delete_if_expired(
        &self,
        product_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error>;
}
// endregion: --- Lock Mirror Trait

// region:    --- Postgres Mirror
/// 재고 락 미러 Postgres 구현체
pub struct PostgresLockMirror {
    pool: Arc<PgPool>,
}

impl PostgresLockMirror {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockMirror for PostgresLockMirror {
    async fn upsert_if_expired(
        &self,
        product_id: &str,
        holder_id: &str,
        locked_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(UPSERT_MIRROR)
            .bind(product_id)
            .bind(holder_id)
            .bind(locked_at)
            .bind(expires_at)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn delete_for_holder(
        &self,
        product_id: &str,
        holder_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(DELETE_MIRROR_FOR_HOLDER)
            .bind(product_id)
            .bind(holder_id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn extend_for_holder(
        &self,
        product_id: &str,
        holder_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(EXTEND_MIRROR_FOR_HOLDER)
            .bind(product_id)
            .bind(holder_id)
            .bind(expires_at)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, product_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(DELETE_MIRROR)
            .bind(product_id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn expired_candidates(&self, now: DateTime<Utc>) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(EXPIRED_CANDIDATES)
            .bind(now)
            .fetch_all(&*self.pool)
            .await
    }

    async fn delete_if_expired(
        &self,
        product_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(DELETE_MIRROR_IF_EXPIRED)
            .bind(product_id)
            .bind(now)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
// endregion: --- Postgres Mirror
