/// 재고 예약 락 테스트 (인메모리 고속 저장소 + 미러)
// region:    --- Imports
mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{MemoryLockMirror, MirrorRow, UnavailableFastStore};
use haggle_service::error::CoreError;
use haggle_service::stock_lock::{FastStore, LockMirror, MemoryFastStore, StockReservationLock};
use std::sync::Arc;
use std::time::Duration;

// endregion: --- Imports

// region:    --- Helpers
fn build_lock() -> (
    Arc<StockReservationLock>,
    Arc<MemoryFastStore>,
    Arc<MemoryLockMirror>,
) {
    let fast = Arc::new(MemoryFastStore::new());
    let mirror = Arc::new(MemoryLockMirror::new());
    let lock = Arc::new(StockReservationLock::new(
        Arc::clone(&fast) as Arc<dyn FastStore>,
        Arc::clone(&mirror) as Arc<dyn LockMirror>,
    ));
    (lock, fast, mirror)
}
// endregion: --- Helpers

/// K개의 서로 다른 보유자가 동시에 acquire하면 정확히 하나만 성공
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_of_k_concurrent_acquires_wins() {
    let (lock, _, _) = build_lock();
    const K: usize = 16;

    let mut handles = Vec::with_capacity(K);
    for i in 0..K {
        let lock = Arc::clone(&lock);
        handles.push(tokio::spawn(async move {
            lock.acquire("hot-item", &format!("holder-{i}"), 60).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

/// release는 보유자 일치 시에만 동작하고, 남의 락은 절대 건드리지 않는다
#[tokio::test]
async fn release_requires_holder_identity() {
    let (lock, fast, mirror) = build_lock();

    assert!(lock.acquire("p1", "alice", 60).await.unwrap());

    // 다른 보유자의 해제 시도는 no-op
    assert!(!lock.release("p1", "bob").await.unwrap());
    assert_eq!(fast.get("p1").await.unwrap().as_deref(), Some("alice"));
    assert_eq!(mirror.row("p1").await.unwrap().locked_by, "alice");

    // 보유자 본인의 해제는 성공, 이후 다른 보유자가 획득 가능
    assert!(lock.release("p1", "alice").await.unwrap());
    assert!(fast.get("p1").await.unwrap().is_none());
    assert!(mirror.row("p1").await.is_none());
    assert!(lock.acquire("p1", "bob", 60).await.unwrap());
}

/// 뒤늦은 해제는 그 사이 다른 보유자가 획득한 락에 영향을 주지 않는다
#[tokio::test]
async fn late_release_does_not_affect_new_holder() {
    let (lock, fast, _) = build_lock();

    assert!(lock.acquire("p1", "alice", 60).await.unwrap());
    assert!(lock.release("p1", "alice").await.unwrap());
    assert!(lock.acquire("p1", "bob", 60).await.unwrap());

    // alice의 중복 해제 호출
    assert!(!lock.release("p1", "alice").await.unwrap());
    assert_eq!(fast.get("p1").await.unwrap().as_deref(), Some("bob"));
}

/// TTL 경과 후에는 extend 없이 다른 보유자가 획득할 수 있다
#[tokio::test]
async fn lock_expires_after_ttl() {
    let (lock, _, _) = build_lock();

    assert!(lock.acquire("p1", "alice", 1).await.unwrap());
    assert!(!lock.acquire("p1", "bob", 1).await.unwrap());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(lock.acquire("p1", "bob", 60).await.unwrap());
}

/// extend는 보유자 일치 시 TTL을 재설정한다
#[tokio::test]
async fn extend_rearms_ttl_for_holder_only() {
    let (lock, fast, _) = build_lock();

    assert!(lock.acquire("p1", "alice", 1).await.unwrap());

    // 타인의 연장 시도는 거부
    assert!(!lock.extend("p1", "bob", 60).await.unwrap());

    assert!(lock.extend("p1", "alice", 60).await.unwrap());
    tokio::time::sleep(Duration::from_millis(1500)).await;

    // 원래 TTL(1초)이 지났어도 연장 덕에 여전히 보유 중
    assert_eq!(fast.get("p1").await.unwrap().as_deref(), Some("alice"));
    assert!(!lock.acquire("p1", "bob", 60).await.unwrap());
}

/// 점유 중 acquire 실패는 영속 미러를 건드리지 않는다
#[tokio::test]
async fn busy_acquire_leaves_mirror_untouched() {
    let (lock, _, mirror) = build_lock();

    assert!(lock.acquire("p1", "alice", 60).await.unwrap());
    assert!(!lock.acquire("p1", "bob", 60).await.unwrap());

    let row = mirror.row("p1").await.unwrap();
    assert_eq!(row.locked_by, "alice");
}

/// 강제 해제는 양쪽 저장소를 무조건 비운다
#[tokio::test]
async fn force_release_clears_both_stores() {
    let (lock, fast, mirror) = build_lock();

    assert!(lock.acquire("p1", "alice", 60).await.unwrap());
    lock.force_release("p1").await.unwrap();

    assert!(fast.get("p1").await.unwrap().is_none());
    assert!(mirror.row("p1").await.is_none());
    assert!(lock.acquire("p1", "bob", 60).await.unwrap());
}

/// 고속 저장소 장애 시 락 연산은 fail-closed
/// 조용한 성공은 절대 없고, 미러도 건드리지 않는다
#[tokio::test]
async fn unreachable_fast_store_fails_closed() {
    let mirror = Arc::new(MemoryLockMirror::new());
    let lock = StockReservationLock::new(
        Arc::new(UnavailableFastStore),
        Arc::clone(&mirror) as Arc<dyn LockMirror>,
    );

    let err = lock.acquire("p1", "alice", 60).await.unwrap_err();
    assert!(matches!(err, CoreError::LockStoreUnavailable(_)));
    assert!(mirror.row("p1").await.is_none());

    let err = lock.release("p1", "alice").await.unwrap_err();
    assert!(matches!(err, CoreError::LockStoreUnavailable(_)));

    let err = lock.extend("p1", "alice", 60).await.unwrap_err();
    assert!(matches!(err, CoreError::LockStoreUnavailable(_)));
}

/// 미러 보정: 만료 + 고속 저장소 부재인 행만 지운다
/// 고속 저장소가 다시 보유 중인 키의 미러는 남겨 둔다
#[tokio::test]
async fn reconcile_removes_only_stale_mirror_rows() {
    let (lock, fast, mirror) = build_lock();
    let past = Utc::now() - ChronoDuration::minutes(10);

    // 만료된 고아 미러 행 (고속 저장소에는 없음)
    mirror
        .seed(
            "ghost",
            MirrorRow {
                locked_by: "alice".to_string(),
                locked_at: past,
                expires_at: past + ChronoDuration::minutes(5),
            },
        )
        .await;

    // 미러는 만료로 보이지만 고속 저장소가 재획득한 키
    mirror
        .seed(
            "reacquired",
            MirrorRow {
                locked_by: "alice".to_string(),
                locked_at: past,
                expires_at: past + ChronoDuration::minutes(5),
            },
        )
        .await;
    fast.set_if_absent("reacquired", "bob", Duration::from_secs(60))
        .await
        .unwrap();

    let removed = lock.reconcile_mirror().await.unwrap();
    assert_eq!(removed, 1);
    assert!(mirror.row("ghost").await.is_none());
    assert!(mirror.row("reacquired").await.is_some());
}
