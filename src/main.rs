// region:    --- Imports
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use haggle_service::database::DatabaseManager;
use haggle_service::handlers::{self, AppState};
use haggle_service::ledger::{BidLedger, PostgresBidStore};
use haggle_service::message_broker::{KafkaEventPublisher, KafkaManager, EVENTS_TOPIC};
use haggle_service::negotiation::machine::NegotiationStateMachine;
use haggle_service::negotiation::store::PostgresNegotiationStore;
use haggle_service::reaper::ExpiryReaper;
use haggle_service::sidecar::{SideChannelClient, SideEffectWorker};
use haggle_service::stock_lock::{PostgresLockMirror, RedisFastStore, StockReservationLock};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    // DatabaseManager 생성
    let db_manager = Arc::new(DatabaseManager::new().await);

    // 데이터베이스 초기화
    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");

    // 고속 저장소(Redis) 연결 — 재고 락의 유일한 정합성 지점
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let fast_store = match RedisFastStore::connect(&redis_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("{:<12} --> Redis 연결 실패: {:?}", "Main", e);
            return Err(e.into());
        }
    };
    info!("{:<12} --> Redis 연결 성공", "Main");

    // Kafka 매니저 생성 및 토픽 준비
    let kafka_manager = Arc::new(KafkaManager::new());
    kafka_manager.create_topic(EVENTS_TOPIC, 5, 1).await?;
    info!("{:<12} --> Kafka 초기화 성공", "Main");

    // 코어 컴포넌트 조립 (저장소 핸들은 전부 명시 주입)
    let pool = db_manager.get_pool();
    let lock = Arc::new(StockReservationLock::new(
        fast_store,
        Arc::new(PostgresLockMirror::new(Arc::clone(&pool))),
    ));
    let ledger = Arc::new(BidLedger::new(Arc::new(PostgresBidStore::new(Arc::clone(
        &pool,
    )))));
    let machine = Arc::new(NegotiationStateMachine::new(
        Arc::new(PostgresNegotiationStore::new(Arc::clone(&pool))),
        Arc::clone(&ledger),
        Arc::clone(&lock),
        Arc::new(KafkaEventPublisher::new(kafka_manager.get_producer())),
    ));

    // 번역/음성 사이드 이펙트 워커 시작
    let side_effect_worker = SideEffectWorker::new(
        kafka_manager.get_consumer(),
        SideChannelClient::from_env(),
    );
    tokio::spawn(async move {
        side_effect_worker.start().await;
    });

    // 만료 리퍼 시작
    let reaper = Arc::new(ExpiryReaper::new(
        Arc::clone(&machine),
        Arc::clone(&lock),
        Arc::clone(&ledger),
    ));
    reaper.start().await;

    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 라우터 설정
    let state = AppState {
        machine,
        ledger,
        lock,
    };
    let routes_all = Router::new()
        .route(
            "/negotiations",
            post(handlers::handle_create_negotiation),
        )
        .route(
            "/negotiations/:id",
            get(handlers::handle_get_negotiation),
        )
        .route(
            "/negotiations/:id/bids",
            post(handlers::handle_submit_bid).get(handlers::handle_get_bids),
        )
        .route(
            "/negotiations/:id/bids/latest",
            get(handlers::handle_get_latest_bid),
        )
        .route(
            "/negotiations/:id/accept",
            post(handlers::handle_accept_bid),
        )
        .route(
            "/negotiations/:id/reject",
            post(handlers::handle_reject_bid),
        )
        .route(
            "/negotiations/:id/lock",
            post(handlers::handle_mark_locked),
        )
        .route(
            "/negotiations/:id/complete",
            post(handlers::handle_complete_sale),
        )
        .route(
            "/locks/:product_id/force-release",
            post(handlers::handle_force_release),
        )
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state);

    // 리스너 생성
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
