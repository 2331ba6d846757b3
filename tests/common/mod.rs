/// 테스트 공용 인메모리 구현체
/// 외부 인프라 없이 상태 머신/락 시나리오를 그대로 돌리기 위한 것
// region:    --- Imports
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use haggle_service::error::CoreError;
use haggle_service::events::{EventPublisher, NegotiationEvent};
use haggle_service::ledger::{BidLedger, BidStore};
use haggle_service::negotiation::machine::NegotiationStateMachine;
use haggle_service::negotiation::model::{Bid, Negotiation, NegotiationStatus};
use haggle_service::negotiation::store::NegotiationStore;
use haggle_service::stock_lock::{
    FastStore, FastStoreError, LockMirror, MemoryFastStore, StockReservationLock,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

// endregion: --- Imports

// region:    --- Memory Backend
#[derive(Default)]
struct Inner {
    negotiations: HashMap<Uuid, Negotiation>,
    bids: Vec<Bid>,
    next_seq: i64,
}

/// 협상/입찰 인메모리 저장소 (하나의 뮤텍스로 트랜잭션 원자성 모사)
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 만료 시나리오용: 협상의 시각을 과거로 되돌린다
    pub async fn backdate(&self, id: Uuid, at: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        if let Some(negotiation) = inner.negotiations.get_mut(&id) {
            negotiation.created_at = at;
            negotiation.updated_at = at;
        }
    }

    pub async fn status_of(&self, id: Uuid) -> Option<NegotiationStatus> {
        let inner = self.inner.lock().await;
        inner.negotiations.get(&id).map(|n| n.status)
    }
}

#[async_trait]
impl NegotiationStore for MemoryBackend {
    async fn insert(&self, negotiation: &Negotiation) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .negotiations
            .insert(negotiation.id, negotiation.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Negotiation>, CoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.negotiations.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        expected_version: i64,
        to: NegotiationStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let mut inner = self.inner.lock().await;
        match inner.negotiations.get_mut(&id) {
            Some(negotiation) if negotiation.version == expected_version => {
                negotiation.status = to;
                negotiation.version += 1;
                negotiation.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_bid_and_counter(
        &self,
        bid: &Bid,
        expected_version: i64,
    ) -> Result<Option<Bid>, CoreError> {
        let mut inner = self.inner.lock().await;
        match inner.negotiations.get_mut(&bid.negotiation_id) {
            Some(negotiation) if negotiation.version == expected_version => {
                negotiation.status = NegotiationStatus::Countered;
                negotiation.version += 1;
                negotiation.updated_at = bid.created_at;
            }
            _ => return Ok(None),
        }
        inner.next_seq += 1;
        let mut appended = bid.clone();
        appended.seq = inner.next_seq;
        inner.bids.push(appended.clone());
        Ok(Some(appended))
    }

    async fn expire_stale_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let mut inner = self.inner.lock().await;
        let mut expired = 0u64;
        for negotiation in inner.negotiations.values_mut() {
            if negotiation.status.is_biddable() && negotiation.updated_at < cutoff {
                negotiation.status = NegotiationStatus::Expired;
                negotiation.version += 1;
                negotiation.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl BidStore for MemoryBackend {
    async fn latest(&self, negotiation_id: Uuid) -> Result<Option<Bid>, CoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .bids
            .iter()
            .filter(|b| b.negotiation_id == negotiation_id)
            .max_by_key(|b| (b.created_at, b.seq))
            .cloned())
    }

    async fn all(&self, negotiation_id: Uuid) -> Result<Vec<Bid>, CoreError> {
        let inner = self.inner.lock().await;
        let mut bids: Vec<Bid> = inner
            .bids
            .iter()
            .filter(|b| b.negotiation_id == negotiation_id)
            .cloned()
            .collect();
        bids.sort_by_key(|b| (b.created_at, b.seq));
        Ok(bids)
    }

    async fn prune_terminated_before(&self, cutoff: DateTime<Utc>) -> Result<u64, CoreError> {
        let mut inner = self.inner.lock().await;
        let terminated: Vec<Uuid> = inner
            .negotiations
            .values()
            .filter(|n| n.status.is_terminal())
            .map(|n| n.id)
            .collect();
        let before = inner.bids.len();
        inner
            .bids
            .retain(|b| !(terminated.contains(&b.negotiation_id) && b.created_at < cutoff));
        Ok((before - inner.bids.len()) as u64)
    }
}
// endregion: --- Memory Backend

// region:    --- Conflicting Store
/// 조건부 쓰기에 버전 충돌/저장소 오류를 주입하는 래퍼
/// 동시 기록자가 끼어들거나 DB가 내려간 상황을 재현한다
pub struct ConflictingStore {
    inner: MemoryBackend,
    conflicts: Mutex<u32>,
    failures: Mutex<u32>,
}

impl ConflictingStore {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            conflicts: Mutex::new(0),
            failures: Mutex::new(0),
        }
    }

    /// 다음 n회의 조건부 쓰기를 버전 충돌로 처리
    pub async fn inject_conflicts(&self, n: u32) {
        *self.conflicts.lock().await = n;
    }

    /// 다음 n회의 조건부 쓰기를 저장소 오류로 처리
    pub async fn inject_failures(&self, n: u32) {
        *self.failures.lock().await = n;
    }

    async fn take(counter: &Mutex<u32>) -> bool {
        let mut remaining = counter.lock().await;
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl NegotiationStore for ConflictingStore {
    async fn insert(&self, negotiation: &Negotiation) -> Result<(), CoreError> {
        self.inner.insert(negotiation).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Negotiation>, CoreError> {
        self.inner.get(id).await
    }

    async fn transition(
        &self,
        id: Uuid,
        expected_version: i64,
        to: NegotiationStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        if Self::take(&self.failures).await {
            return Err(CoreError::Database(sqlx::Error::PoolTimedOut));
        }
        if Self::take(&self.conflicts).await {
            return Ok(false);
        }
        self.inner.transition(id, expected_version, to, now).await
    }

    async fn append_bid_and_counter(
        &self,
        bid: &Bid,
        expected_version: i64,
    ) -> Result<Option<Bid>, CoreError> {
        if Self::take(&self.failures).await {
            return Err(CoreError::Database(sqlx::Error::PoolTimedOut));
        }
        if Self::take(&self.conflicts).await {
            return Ok(None);
        }
        self.inner.append_bid_and_counter(bid, expected_version).await
    }

    async fn expire_stale_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        self.inner.expire_stale_before(cutoff, now).await
    }
}
// endregion: --- Conflicting Store

// region:    --- Memory Lock Mirror
#[derive(Clone, Debug)]
pub struct MirrorRow {
    pub locked_by: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// 재고 락 미러 인메모리 구현체
#[derive(Default)]
pub struct MemoryLockMirror {
    rows: Mutex<HashMap<String, MirrorRow>>,
}

impl MemoryLockMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn row(&self, product_id: &str) -> Option<MirrorRow> {
        self.rows.lock().await.get(product_id).cloned()
    }

    /// 보정 시나리오용: 만료된 미러 행을 직접 심는다
    pub async fn seed(&self, product_id: &str, row: MirrorRow) {
        self.rows.lock().await.insert(product_id.to_string(), row);
    }
}

#[async_trait]
impl LockMirror for MemoryLockMirror {
    async fn upsert_if_expired(
        &self,
        product_id: &str,
        holder_id: &str,
        locked_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let mut rows = self.rows.lock().await;
        match rows.get(product_id) {
            Some(existing) if existing.expires_at > locked_at => {}
            _ => {
                rows.insert(
                    product_id.to_string(),
                    MirrorRow {
                        locked_by: holder_id.to_string(),
                        locked_at,
                        expires_at,
                    },
                );
            }
        }
        Ok(())
    }

    async fn delete_for_holder(
        &self,
        product_id: &str,
        holder_id: &str,
    ) -> Result<(), sqlx::Error> {
        let mut rows = self.rows.lock().await;
        if rows
            .get(product_id)
            .map(|row| row.locked_by == holder_id)
            .unwrap_or(false)
        {
            rows.remove(product_id);
        }
        Ok(())
    }

    async fn extend_for_holder(
        &self,
        product_id: &str,
        holder_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.get_mut(product_id) {
            if row.locked_by == holder_id {
                row.expires_at = expires_at;
            }
        }
        Ok(())
    }

    async fn delete(&self, product_id: &str) -> Result<(), sqlx::Error> {
        self.rows.lock().await.remove(product_id);
        Ok(())
    }

    async fn expired_candidates(&self, now: DateTime<Utc>) -> Result<Vec<String>, sqlx::Error> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|(_, row)| row.expires_at <= now)
            .map(|(product_id, _)| product_id.clone())
            .collect())
    }

    async fn delete_if_expired(
        &self,
        product_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let mut rows = self.rows.lock().await;
        if rows
            .get(product_id)
            .map(|row| row.expires_at <= now)
            .unwrap_or(false)
        {
            rows.remove(product_id);
            return Ok(true);
        }
        Ok(false)
    }
}
// endregion: --- Memory Lock Mirror

// region:    --- Unavailable Fast Store
/// 모든 호출이 실패하는 고속 저장소 (fail-closed 검증용)
pub struct UnavailableFastStore;

impl UnavailableFastStore {
    fn refused<T>() -> Result<T, FastStoreError> {
        Err(FastStoreError("connection refused".to_string()))
    }
}

#[async_trait]
impl FastStore for UnavailableFastStore {
    async fn set_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<bool, FastStoreError> {
        Self::refused()
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, FastStoreError> {
        Self::refused()
    }

    async fn delete_if_value(&self, _key: &str, _value: &str) -> Result<bool, FastStoreError> {
        Self::refused()
    }

    async fn extend_if_value(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<bool, FastStoreError> {
        Self::refused()
    }

    async fn delete(&self, _key: &str) -> Result<(), FastStoreError> {
        Self::refused()
    }

    async fn exists(&self, _key: &str) -> Result<bool, FastStoreError> {
        Self::refused()
    }
}
// endregion: --- Unavailable Fast Store

// region:    --- Event Publishers
/// 발행된 이벤트를 수집하는 퍼블리셔
#[derive(Default)]
pub struct CapturingEventPublisher {
    events: Mutex<Vec<NegotiationEvent>>,
}

impl CapturingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<NegotiationEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for CapturingEventPublisher {
    async fn publish(&self, event: &NegotiationEvent) -> Result<(), String> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// 항상 실패하는 퍼블리셔 (사이드 채널 실패 격리 검증용)
pub struct FailingEventPublisher;

#[async_trait]
impl EventPublisher for FailingEventPublisher {
    async fn publish(&self, _event: &NegotiationEvent) -> Result<(), String> {
        Err("broker unreachable".to_string())
    }
}
// endregion: --- Event Publishers

// region:    --- Harness
/// 테스트 하네스 — 인메모리 저장소로 전체 코어를 조립한다
pub struct Harness {
    pub machine: Arc<NegotiationStateMachine>,
    pub ledger: Arc<BidLedger>,
    pub lock: Arc<StockReservationLock>,
    pub backend: MemoryBackend,
    pub fast: Arc<MemoryFastStore>,
    pub mirror: Arc<MemoryLockMirror>,
    pub published: Arc<CapturingEventPublisher>,
}

impl Harness {
    pub fn new() -> Self {
        let backend = MemoryBackend::new();
        Self::build(backend.clone(), Arc::new(backend), None)
    }

    /// 이벤트 발행이 항상 실패하는 하네스
    pub fn with_failing_events() -> Self {
        let backend = MemoryBackend::new();
        Self::build(
            backend.clone(),
            Arc::new(backend),
            Some(Arc::new(FailingEventPublisher)),
        )
    }

    /// 버전 충돌/저장소 오류를 주입할 수 있는 하네스
    pub fn with_conflicting_store() -> (Self, Arc<ConflictingStore>) {
        let backend = MemoryBackend::new();
        let store = Arc::new(ConflictingStore::new(backend.clone()));
        let handle = Arc::clone(&store);
        (Self::build(backend, store, None), handle)
    }

    fn build(
        backend: MemoryBackend,
        store: Arc<dyn NegotiationStore>,
        publisher: Option<Arc<dyn EventPublisher>>,
    ) -> Self {
        let fast = Arc::new(MemoryFastStore::new());
        let mirror = Arc::new(MemoryLockMirror::new());
        let published = Arc::new(CapturingEventPublisher::new());

        let fast_handle: Arc<MemoryFastStore> = Arc::clone(&fast);
        let mirror_handle: Arc<MemoryLockMirror> = Arc::clone(&mirror);
        let lock = Arc::new(StockReservationLock::new(fast_handle, mirror_handle));
        let ledger = Arc::new(BidLedger::new(Arc::new(backend.clone())));
        let events: Arc<dyn EventPublisher> =
            publisher.unwrap_or_else(|| Arc::clone(&published) as Arc<dyn EventPublisher>);
        let machine = Arc::new(NegotiationStateMachine::new(
            store,
            Arc::clone(&ledger),
            Arc::clone(&lock),
            events,
        ));

        Self {
            machine,
            ledger,
            lock,
            backend,
            fast,
            mirror,
            published,
        }
    }
}
// endregion: --- Harness
