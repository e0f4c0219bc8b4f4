// region:    --- Imports
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use code_auction_service::app::AppContext;
use code_auction_service::config::{AppConfig, LogFormat};
use code_auction_service::confirmation::ConfirmationDesk;
use code_auction_service::database::DatabaseManager;
use code_auction_service::engine::AuctionEngine;
use code_auction_service::handlers;
use code_auction_service::judge::HttpJudge;
use code_auction_service::message_broker::EventBus;
use code_auction_service::scheduler::AuctionScheduler;
use code_auction_service::store::{AuctionStore, MemoryStore, PostgresStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // logging 초기화
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .without_time()
            .with_target(false)
            .init(),
    }

    // 저장소 선택
    let store: Arc<dyn AuctionStore> = match &config.database_url {
        Some(url) => {
            let db_manager =
                Arc::new(DatabaseManager::connect(url, config.database_max_connections).await?);
            // 데이터베이스 초기화
            if let Err(e) = db_manager.initialize_database().await {
                error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
                return Err(e.into());
            }
            info!("{:<12} --> 데이터베이스 초기화 성공", "Main");
            Arc::new(PostgresStore::new(db_manager))
        }
        None => {
            warn!("{:<12} --> DATABASE_URL 없음, 메모리 저장소 사용", "Main");
            Arc::new(MemoryStore::new())
        }
    };

    // 이벤트 버스와 엔진
    let bus = EventBus::new(1024);
    let judge = Arc::new(HttpJudge::new(config.judge_url.clone()));
    let engine = AuctionEngine::with_ranking(
        store,
        judge,
        bus.clone(),
        config.engine_settings(),
        Arc::new(config.tie_break),
    );
    engine.open_live_session().await?;

    // Kafka 포워더 (선택)
    #[cfg(feature = "kafka")]
    {
        use code_auction_service::message_broker::kafka::{spawn_forwarder, KafkaProducer};
        if let Some(brokers) = &config.kafka_brokers {
            let producer = KafkaProducer::new(brokers)?;
            spawn_forwarder(&bus, producer, config.kafka_topic.clone());
            info!("{:<12} --> Kafka 초기화 성공", "Main");
        }
    }

    // 예약 경매 스케줄러
    let scheduler = AuctionScheduler::new(
        Arc::clone(&engine),
        Duration::from_millis(config.scheduler_tick_ms),
    );
    scheduler.start().await;

    let ctx = AppContext {
        engine,
        scheduler,
        desk: Arc::new(ConfirmationDesk::new(Duration::from_secs(
            config.confirm_ttl_secs,
        ))),
        admin_token: Arc::from(config.admin_token.as_str()),
        initial_wallet: config.initial_wallet,
    };

    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 라우터 설정
    let routes_all = Router::new()
        .route("/auction/wallet", get(handlers::handle_get_wallet))
        .route("/auth/register", post(handlers::handle_register))
        .route("/auction/allotted", get(handlers::handle_get_allotted))
        .route("/auction/my-questions", get(handlers::handle_get_my_questions))
        .route("/auction/team-stats", get(handlers::handle_get_team_stats))
        .route("/auction/bid", post(handlers::handle_bid))
        .route("/auction/draft/:id", post(handlers::handle_save_draft))
        .route("/auction/submit/:id", post(handlers::handle_submit))
        .route("/auction/push", post(handlers::handle_push_question))
        .route("/auction/start-coding", post(handlers::handle_start_coding))
        .route("/auction/end-coding", post(handlers::handle_end_coding))
        .route("/auction/reset", post(handlers::handle_reset))
        .route("/auction/session", get(handlers::handle_get_session))
        .route("/auction/bids", get(handlers::handle_get_bid_history))
        .route(
            "/questions",
            get(handlers::handle_list_questions).post(handlers::handle_create_question),
        )
        .route(
            "/questions/:id",
            get(handlers::handle_get_question)
                .put(handlers::handle_update_question)
                .delete(handlers::handle_delete_question),
        )
        .route(
            "/admin/users",
            get(handlers::handle_list_users).post(handlers::handle_create_user),
        )
        .route("/admin/users/count", get(handlers::handle_get_user_count))
        .route("/admin/users/:id", get(handlers::handle_get_user))
        .route(
            "/admin/users/:id/deactivate",
            post(handlers::handle_deactivate_user),
        )
        .route("/admin/leaderboard", get(handlers::handle_get_leaderboard))
        .route("/scheduled", get(handlers::handle_list_scheduled))
        .route("/scheduled/create", post(handlers::handle_create_scheduled))
        .route(
            "/scheduled/:id",
            get(handlers::handle_get_scheduled)
                .put(handlers::handle_update_scheduled)
                .delete(handlers::handle_delete_scheduled),
        )
        .route("/scheduled/:id/join", post(handlers::handle_join_scheduled))
        .route("/scheduled/:id/leave", post(handlers::handle_leave_scheduled))
        .route(
            "/scheduled/:id/cancel",
            post(handlers::handle_cancel_scheduled),
        )
        .route("/scheduled/:id/bid", post(handlers::handle_scheduled_bid))
        .route("/confirm/:token", post(handlers::handle_confirm))
        .route("/events", get(handlers::handle_events))
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 2))
        .with_state(ctx);

    // 리스너 생성
    let listener = TcpListener::bind(&config.bind_addr).await?;
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
