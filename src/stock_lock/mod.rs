/// 재고 예약 락
/// 고속 TTL 저장소의 원자적 set-if-absent가 유일한 상호배제 지점
/// 영속 미러(stock_locks)는 감사/복구용이며 리퍼가 사후 보정한다
// region:    --- Imports
use crate::error::CoreError;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

pub mod memory;
pub mod mirror;
pub mod redis;

pub use self::memory::MemoryFastStore;
pub use self::mirror::{LockMirror, PostgresLockMirror};
pub use self::redis::RedisFastStore;

// endregion: --- Imports

// region:    --- Fast Store Trait
/// 고속 저장소 오류 (락 획득 경로에서는 fail-closed로 승격)
#[derive(Debug, Error)]
#[error("fast store error: {0}")]
pub struct FastStoreError(pub String);

/// TTL 네이티브 고속 저장소 트레이트
/// `set_if_absent`가 재고 상호배제의 유일한 정합성 지점이다
#[async_trait]
pub trait FastStore: Send + Sync {
    /// 키가 없을 때에만 TTL과 함께 기록 (원자적), 기록 여부 반환
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, FastStoreError>;

    /// 현재 값 조회
    async fn get(&self, key: &str) -> Result<Option<String>, FastStoreError>;

    /// 현재 값이 `value`일 때에만 삭제 (원자적), 삭제 여부 반환
    async fn delete_if_value(&self, key: &str, value: &str) -> Result<bool, FastStoreError>;

    /// 현재 값이 `value`일 때에만 TTL 재설정 (원자적), 적용 여부 반환
    async fn extend_if_value(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, FastStoreError>;

    /// 무조건 삭제 (관리용)
    async fn delete(&self, key: &str) -> Result<(), FastStoreError>;

    /// 키 존재 여부
    async fn exists(&self, key: &str) -> Result<bool, FastStoreError>;
}
// endregion: --- Fast Store Trait

// region:    --- Stock Reservation Lock
/// 고속 저장소 호출 타임아웃 (락 TTL과는 별개의 네트워크 왕복 한도)
const FAST_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// 재고 예약 락
pub struct StockReservationLock {
    fast: Arc<dyn FastStore>,
    mirror: Arc<dyn LockMirror>,
}

impl StockReservationLock {
    pub fn new(fast: Arc<dyn FastStore>, mirror: Arc<dyn LockMirror>) -> Self {
        Self { fast, mirror }
    }

    /// 타임아웃을 건 고속 저장소 호출
    /// 저장소 오류와 타임아웃 모두 fail-closed 대상
    async fn guarded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, FastStoreError>>,
    ) -> Result<T, CoreError> {
        match timeout(FAST_STORE_TIMEOUT, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(CoreError::LockStoreUnavailable(e.to_string())),
            Err(_) => Err(CoreError::LockStoreUnavailable("timeout".to_string())),
        }
    }

    /// 락 획득
    /// 고속 저장소 set-if-absent만이 정합성을 결정한다
    /// 미러 기록 실패는 로그만 남기고 성공으로 처리 (리퍼가 보정)
    pub async fn acquire(
        &self,
        product_id: &str,
        holder_id: &str,
        ttl_seconds: u64,
    ) -> Result<bool, CoreError> {
        let ttl = Duration::from_secs(ttl_seconds);
        let acquired = self
            .guarded(self.fast.set_if_absent(product_id, holder_id, ttl))
            .await?;

        if !acquired {
            // 다른 보유자가 점유 중 — 영속 저장소는 건드리지 않는다
            return Ok(false);
        }

        let now = Utc::now();
        let expires_at = now + ChronoDuration::seconds(ttl_seconds as i64);
        if let Err(e) = self
            .mirror
            .upsert_if_expired(product_id, holder_id, now, expires_at)
            .await
        {
            warn!(
                "{:<12} --> 미러 기록 실패 (고속 저장소가 유효, 리퍼가 보정): {} / {}",
                "StockLock", product_id, e
            );
        }

        info!(
            "{:<12} --> 락 획득: product={} holder={} ttl={}s",
            "StockLock", product_id, holder_id, ttl_seconds
        );
        Ok(true)
    }

    /// 락 해제 (compare-and-delete)
    /// 보유자 불일치 시 no-op — 이후 다른 보유자가 획득한 락을 건드리지 않는다
    pub async fn release(&self, product_id: &str, holder_id: &str) -> Result<bool, CoreError> {
        let released = self
            .guarded(self.fast.delete_if_value(product_id, holder_id))
            .await?;

        if released {
            if let Err(e) = self.mirror.delete_for_holder(product_id, holder_id).await {
                warn!(
                    "{:<12} --> 미러 삭제 실패 (리퍼가 보정): {} / {}",
                    "StockLock", product_id, e
                );
            }
            info!(
                "{:<12} --> 락 해제: product={} holder={}",
                "StockLock", product_id, holder_id
            );
        }
        Ok(released)
    }

    /// TTL 연장 (보유자 일치 시에만)
    pub async fn extend(
        &self,
        product_id: &str,
        holder_id: &str,
        extra_seconds: u64,
    ) -> Result<bool, CoreError> {
        let extended = self
            .guarded(self.fast.extend_if_value(
                product_id,
                holder_id,
                Duration::from_secs(extra_seconds),
            ))
            .await?;

        if extended {
            let expires_at = Utc::now() + ChronoDuration::seconds(extra_seconds as i64);
            if let Err(e) = self
                .mirror
                .extend_for_holder(product_id, holder_id, expires_at)
                .await
            {
                warn!(
                    "{:<12} --> 미러 연장 실패 (리퍼가 보정): {} / {}",
                    "StockLock", product_id, e
                );
            }
        }
        Ok(extended)
    }

    /// 관리용 강제 해제 (양쪽 저장소 무조건 제거)
    pub async fn force_release(&self, product_id: &str) -> Result<(), CoreError> {
        self.guarded(self.fast.delete(product_id)).await?;
        self.mirror
            .delete(product_id)
            .await
            .map_err(CoreError::Database)?;
        info!("{:<12} --> 락 강제 해제: product={}", "StockLock", product_id);
        Ok(())
    }

    /// 만료된 미러 행 보정
    /// expires_at 경과 + 고속 저장소에 키 부재일 때에만 삭제한다
    /// (방금 재획득된 락의 미러를 지우지 않기 위한 이중 조건)
    pub async fn reconcile_mirror(&self) -> Result<u64, CoreError> {
        let now = Utc::now();
        let candidates = self
            .mirror
            .expired_candidates(now)
            .await
            .map_err(CoreError::Database)?;

        let mut removed = 0u64;
        for product_id in candidates {
            let live = self.guarded(self.fast.exists(&product_id)).await?;
            if live {
                // 고속 저장소가 다시 보유 중 — 미러는 곧 덮어써진다
                continue;
            }
            // 삭제 자체도 expires_at 조건부라 동시 리퍼 간에도 안전
            if self
                .mirror
                .delete_if_expired(&product_id, now)
                .await
                .map_err(CoreError::Database)?
            {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("{:<12} --> 만료 미러 {}건 보정", "StockLock", removed);
        }
        Ok(removed)
    }
}
// endregion: --- Stock Reservation Lock
