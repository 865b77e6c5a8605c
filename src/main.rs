// region:    --- Imports
use ev_auction_service::config::Config;
use ev_auction_service::database::DatabaseManager;
use ev_auction_service::deposit::PostgresDepositLedger;
use ev_auction_service::event_store::{EventConsumer, PostgresEventStore};
use ev_auction_service::live::{AuctionCoordinator, LiveSettings};
use ev_auction_service::message_broker::KafkaManager;
use ev_auction_service::routes;
use ev_auction_service::scheduler::AuctionScheduler;
use ev_auction_service::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    // DatabaseManager 생성
    let db_manager = Arc::new(DatabaseManager::new(&config).await?);

    // 데이터베이스 초기화 (INIT_DATABASE=true 인 경우만)
    if config.init_database {
        if let Err(e) = db_manager.initialize_database().await {
            error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
            return Err(e.into());
        }
        info!("{:<12} --> 데이터베이스 초기화 성공", "Main");
    }

    // Kafka 매니저 생성 및 초기화
    let kafka_manager = KafkaManager::new(&config)?;
    if let Err(e) = kafka_manager.initialize().await {
        error!("{:<12} --> Kafka 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> Kafka 초기화 성공", "Main");

    // 토픽 생성
    kafka_manager.create_topic(&config.kafka_topic, 5, 1).await?;

    // 읽기 모델 반영 시작 (카프카 소비 + 미반영 이벤트 보정 스캔)
    let event_consumer = EventConsumer::new(
        db_manager.get_pool(),
        kafka_manager.get_consumer(),
        &config.kafka_topic,
    );
    event_consumer.spawn_catch_up(Duration::from_secs(10));
    tokio::spawn(async move {
        event_consumer.start().await;
    });

    // 실시간 경매 코디네이터
    let event_store = Arc::new(PostgresEventStore::new(db_manager.get_pool()));
    let deposits = Arc::new(PostgresDepositLedger::new(db_manager.get_pool()));
    let publisher = Arc::new(kafka_manager.event_publisher(&config.kafka_topic));
    let coordinator = Arc::new(
        AuctionCoordinator::new(event_store, deposits, LiveSettings::from_config(&config))
            .with_publisher(publisher),
    );

    // 예약 시작 및 재시작 복원 스케줄러
    AuctionScheduler::new(Arc::clone(&db_manager), Arc::clone(&coordinator)).start();

    let port = config.port;
    let routes_all = routes::router(AppState::new(db_manager, coordinator, config));

    // 리스너 생성
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
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
