use async_trait::async_trait;
use chrono::Utc;
use ev_auction_service::auction::events::CloseReason;
use ev_auction_service::auction::model::{Auction, AuctionStatus};
use ev_auction_service::auction::session::SessionError;
use ev_auction_service::bidding::commands::{self, BuyNowCommand, PlaceBidCommand};
use ev_auction_service::deposit::{DepositLedger, InMemoryDepositLedger};
use ev_auction_service::error::AppError;
use ev_auction_service::event_store::{Event, EventPublisher, InMemoryEventStore};
use ev_auction_service::live::{AuctionCoordinator, JoinOutcome, LiveSettings};
use ev_auction_service::message_broker::BrokerError;
use ev_auction_service::realtime::protocol::ServerMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::Mutex;
use tracing::info;

const SELLER: i64 = 1;

/// 트레이싱 초기화 (여러 테스트에서 호출되어도 한 번만 설정)
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .without_time()
        .with_target(false)
        .with_test_writer()
        .try_init();
}

fn settings(tick: Duration) -> LiveSettings {
    LiveSettings {
        tick,
        bid_extension: chrono::Duration::zero(),
        checkout_base_url: "http://localhost:5173/checkout".to_string(),
    }
}

/// 검증 완료 상태의 테스트 경매
fn verified_auction(id: i64, target_price: Option<i64>, duration_secs: i64) -> Auction {
    Auction {
        id,
        product_id: 100 + id,
        seller_id: SELLER,
        winner_id: None,
        starting_price: 10_000,
        target_price,
        step: 1_000,
        deposit: 2_000,
        duration_secs: Some(duration_secs),
        status: AuctionStatus::Verified,
        winning_price: None,
        start_time: Some(Utc::now()),
        end_time: None,
        created_at: Utc::now(),
    }
}

struct Harness {
    store: Arc<InMemoryEventStore>,
    deposits: Arc<InMemoryDepositLedger>,
    coordinator: Arc<AuctionCoordinator>,
}

fn setup(tick: Duration) -> Harness {
    setup_with(settings(tick))
}

fn setup_with(settings: LiveSettings) -> Harness {
    init_tracing();
    let store = Arc::new(InMemoryEventStore::new());
    let deposits = Arc::new(InMemoryDepositLedger::new());
    let coordinator = Arc::new(AuctionCoordinator::new(
        store.clone(),
        deposits.clone(),
        settings,
    ));
    Harness {
        store,
        deposits,
        coordinator,
    }
}

/// 보증금 납부 후 참가
async fn deposit_and_join(harness: &Harness, auction_id: i64, user_id: i64) {
    harness
        .deposits
        .record_deposit(auction_id, user_id, 2_000)
        .await
        .unwrap();
    let outcome = harness.coordinator.join(auction_id, user_id).await.unwrap();
    assert!(matches!(outcome, JoinOutcome::Joined { .. }));
}

fn bid(auction_id: i64, bidder_id: i64, bid_amount: i64) -> PlaceBidCommand {
    PlaceBidCommand {
        auction_id,
        bidder_id,
        bid_amount,
    }
}

/// 보증금 게이트 테스트
#[tokio::test]
async fn test_join_requires_deposit() {
    let harness = setup(Duration::from_secs(60));
    harness
        .coordinator
        .register(verified_auction(1, None, 60))
        .await
        .unwrap();

    // 시작 전에는 관전만 가능
    let before_start = harness.coordinator.join(1, 2).await.unwrap();
    assert!(matches!(before_start, JoinOutcome::Watching { .. }));

    harness.coordinator.start(1).await.unwrap();

    match harness.coordinator.join(1, 2).await.unwrap() {
        JoinOutcome::NeedDeposit {
            deposit,
            checkout_url,
        } => {
            assert_eq!(deposit, 2_000);
            assert!(checkout_url.contains("auction_id=1"));
            assert!(checkout_url.contains("user_id=2"));
        }
        other => panic!("보증금 요청이 아님: {:?}", other),
    }

    // 참가 전 입찰 거절
    let rejected = harness.coordinator.place_bid(&bid(1, 2, 10_000)).await;
    assert!(matches!(
        rejected,
        Err(AppError::Session(SessionError::NotJoined))
    ));

    deposit_and_join(&harness, 1, 2).await;

    // 판매자는 관전
    let seller = harness.coordinator.join(1, SELLER).await.unwrap();
    assert!(matches!(seller, JoinOutcome::Watching { .. }));

    // 중복 참가는 이벤트를 남기지 않음
    let events_before = harness.store.len().await;
    let again = harness.coordinator.join(1, 2).await.unwrap();
    assert!(matches!(again, JoinOutcome::Joined { .. }));
    assert_eq!(harness.store.len().await, events_before);
}

/// 동시 입찰 테스트: 방송 순서가 가격 순서와 일치해야 함
#[tokio::test]
async fn test_concurrent_bids_are_ordered() {
    let harness = setup(Duration::from_secs(60));
    harness
        .coordinator
        .register(verified_auction(2, None, 60))
        .await
        .unwrap();
    harness.coordinator.start(2).await.unwrap();

    let bidders: Vec<i64> = (10..60).collect();
    for bidder in &bidders {
        deposit_and_join(&harness, 2, *bidder).await;
    }

    let mut receiver = harness.coordinator.subscribe(2).await.unwrap();

    let mut tasks = Vec::new();
    for (i, bidder) in bidders.iter().enumerate() {
        let coordinator = Arc::clone(&harness.coordinator);
        let cmd = bid(2, *bidder, 10_000 + i as i64 * 1_000);
        tasks.push(tokio::spawn(
            async move { coordinator.place_bid(&cmd).await },
        ));
    }

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(AppError::Session(SessionError::LowBid { .. })) => {}
            Err(e) => panic!("예상하지 못한 오류: {:?}", e),
        }
    }
    info!("{:<12} --> 수락된 입찰 {}건", "Test", accepted);

    let mut amounts = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(ServerMessage::BidUpdate { amount, .. }) => amounts.push(amount),
            Ok(_) => {}
            Err(TryRecvError::Empty) => break,
            Err(e) => panic!("수신 오류: {:?}", e),
        }
    }

    assert_eq!(amounts.len(), accepted);
    assert!(amounts.windows(2).all(|pair| pair[0] < pair[1]));

    let snapshot = harness.coordinator.snapshot(2).await.unwrap();
    assert_eq!(snapshot.current_price, 59_000);
    assert_eq!(snapshot.highest_bidder_id, Some(59));
    assert_eq!(snapshot.bid_count as usize, accepted);
    assert_eq!(snapshot.minimum_bid, 60_000);
}

/// 즉시 구매 테스트
#[tokio::test]
async fn test_buy_now_closes_auction() {
    let harness = setup(Duration::from_secs(60));
    harness
        .coordinator
        .register(verified_auction(3, Some(30_000), 60))
        .await
        .unwrap();
    harness.coordinator.start(3).await.unwrap();
    deposit_and_join(&harness, 3, 2).await;
    deposit_and_join(&harness, 3, 3).await;

    let mut receiver = harness.coordinator.subscribe(3).await.unwrap();

    harness
        .coordinator
        .place_bid(&bid(3, 2, 12_000))
        .await
        .unwrap();
    let receipt = harness
        .coordinator
        .buy_now(&BuyNowCommand {
            auction_id: 3,
            buyer_id: 3,
        })
        .await
        .unwrap();
    assert!(receipt.buy_now);
    assert_eq!(receipt.status, AuctionStatus::Ended);
    assert_eq!(receipt.current_price, 30_000);

    let mut closed = None;
    while let Ok(message) = receiver.try_recv() {
        if let ServerMessage::Closed {
            winner_id,
            winning_price,
            reason,
            ..
        } = message
        {
            closed = Some((winner_id, winning_price, reason));
        }
    }
    assert_eq!(closed, Some((Some(3), Some(30_000), CloseReason::BuyNow)));

    // 종료 후 입찰 거절
    let late = harness.coordinator.place_bid(&bid(3, 2, 40_000)).await;
    assert!(matches!(
        late,
        Err(AppError::Session(SessionError::AlreadyEnded))
    ));

    // 종료 후 참가 요청은 결과 반환
    let outcome = harness.coordinator.join(3, 2).await.unwrap();
    assert!(matches!(outcome, JoinOutcome::Closed { .. }));
}

/// 목표가 이상 입찰은 즉시 구매로 처리
#[tokio::test]
async fn test_bid_at_target_executes_buy_now() {
    let harness = setup(Duration::from_secs(60));
    harness
        .coordinator
        .register(verified_auction(4, Some(30_000), 60))
        .await
        .unwrap();
    harness.coordinator.start(4).await.unwrap();
    deposit_and_join(&harness, 4, 2).await;

    let receipt = harness
        .coordinator
        .place_bid(&bid(4, 2, 45_000))
        .await
        .unwrap();
    assert!(receipt.buy_now);
    assert_eq!(receipt.current_price, 30_000);
    assert_eq!(receipt.status, AuctionStatus::Ended);
}

/// 시간 종료 테스트
#[tokio::test]
async fn test_timeout_closes_with_highest_bidder() {
    let harness = setup(Duration::from_millis(200));
    harness
        .coordinator
        .register(verified_auction(5, None, 1))
        .await
        .unwrap();
    let mut receiver = harness.coordinator.subscribe(5).await.unwrap();

    harness.coordinator.start(5).await.unwrap();
    deposit_and_join(&harness, 5, 2).await;
    harness
        .coordinator
        .place_bid(&bid(5, 2, 10_000))
        .await
        .unwrap();

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match receiver.recv().await {
                Ok(ServerMessage::Closed {
                    winner_id,
                    winning_price,
                    reason,
                    ..
                }) => return (winner_id, winning_price, reason),
                Ok(_) => continue,
                Err(e) => panic!("수신 오류: {:?}", e),
            }
        }
    })
    .await
    .expect("시간 내에 종료되지 않음");

    assert_eq!(closed, (Some(2), Some(10_000), CloseReason::Timeout));
    let snapshot = harness.coordinator.snapshot(5).await.unwrap();
    assert_eq!(snapshot.status, AuctionStatus::Ended);
    assert_eq!(snapshot.remaining_secs, None);
}

/// 관리자 종료 테스트 (입찰 없음)
#[tokio::test]
async fn test_admin_close_without_bids() {
    let harness = setup(Duration::from_secs(60));
    harness
        .coordinator
        .register(verified_auction(6, None, 60))
        .await
        .unwrap();
    harness.coordinator.start(6).await.unwrap();

    let outcome = harness.coordinator.close(6).await.unwrap();
    assert_eq!(outcome.winner_id, None);
    assert_eq!(outcome.winning_price, None);
    assert_eq!(outcome.reason, CloseReason::Admin);

    let twice = harness.coordinator.close(6).await;
    assert!(matches!(
        twice,
        Err(AppError::Session(SessionError::AlreadyEnded))
    ));
}

/// 재시작 복원 테스트: 같은 이벤트 저장소로 새 코디네이터가 상태를 재생
#[tokio::test]
async fn test_restart_replays_events() {
    let harness = setup(Duration::from_secs(60));
    harness
        .coordinator
        .register(verified_auction(7, None, 60))
        .await
        .unwrap();
    harness.coordinator.start(7).await.unwrap();
    deposit_and_join(&harness, 7, 2).await;
    deposit_and_join(&harness, 7, 3).await;
    harness
        .coordinator
        .place_bid(&bid(7, 2, 10_000))
        .await
        .unwrap();
    harness
        .coordinator
        .place_bid(&bid(7, 3, 12_000))
        .await
        .unwrap();
    let before = harness.coordinator.snapshot(7).await.unwrap();

    let restarted = AuctionCoordinator::new(
        harness.store.clone(),
        harness.deposits.clone(),
        settings(Duration::from_secs(60)),
    );
    // 읽기 모델은 아직 verified 일 수 있음
    restarted
        .register(verified_auction(7, None, 60))
        .await
        .unwrap();
    let after = restarted.snapshot(7).await.unwrap();

    assert_eq!(after.status, AuctionStatus::Live);
    assert_eq!(after.current_price, before.current_price);
    assert_eq!(after.highest_bidder_id, Some(3));
    assert_eq!(after.bid_count, 2);
    assert_eq!(after.participants, 2);
    assert_eq!(after.ends_at, before.ends_at);

    // 복원된 세션에서 이어서 입찰
    let receipt = restarted.place_bid(&bid(7, 2, 13_000)).await.unwrap();
    assert_eq!(receipt.current_price, 13_000);

    // 이전 인스턴스는 버전 충돌 후 재동기화 필요
    let stale = harness.coordinator.place_bid(&bid(7, 3, 20_000)).await;
    assert!(stale.is_err());
    harness.coordinator.resync(7).await.unwrap();
    let resynced = harness.coordinator.snapshot(7).await.unwrap();
    assert_eq!(resynced.current_price, 13_000);
}

/// 종료된 방 정리 테스트
#[tokio::test]
async fn test_evict_idle_rooms() {
    let harness = setup(Duration::from_secs(60));
    harness
        .coordinator
        .register(verified_auction(8, None, 60))
        .await
        .unwrap();
    harness
        .coordinator
        .register(verified_auction(9, None, 60))
        .await
        .unwrap();
    harness.coordinator.start(8).await.unwrap();
    harness.coordinator.close(8).await.unwrap();

    let receiver = harness.coordinator.subscribe(8).await.unwrap();
    assert_eq!(harness.coordinator.evict_idle().await, 0);

    drop(receiver);
    assert_eq!(harness.coordinator.evict_idle().await, 1);
    assert!(harness.coordinator.room(8).await.is_none());
    assert!(harness.coordinator.room(9).await.is_some());
}

/// 다른 인스턴스가 먼저 기록한 경우 입찰 명령은 재동기화 후 자동으로 재시도
#[tokio::test]
async fn test_place_bid_resyncs_after_version_conflict() {
    let harness = setup(Duration::from_secs(60));
    harness
        .coordinator
        .register(verified_auction(16, None, 60))
        .await
        .unwrap();
    harness.coordinator.start(16).await.unwrap();
    deposit_and_join(&harness, 16, 2).await;
    deposit_and_join(&harness, 16, 3).await;
    harness
        .coordinator
        .place_bid(&bid(16, 2, 10_000))
        .await
        .unwrap();

    let other = AuctionCoordinator::new(
        harness.store.clone(),
        harness.deposits.clone(),
        settings(Duration::from_secs(60)),
    );
    other
        .register(verified_auction(16, None, 60))
        .await
        .unwrap();

    // 첫 인스턴스가 먼저 다음 버전을 기록
    harness
        .coordinator
        .place_bid(&bid(16, 3, 11_000))
        .await
        .unwrap();

    let receipt = commands::handle_place_bid(&other, bid(16, 2, 12_000))
        .await
        .unwrap();
    assert_eq!(receipt.current_price, 12_000);
    assert_eq!(receipt.minimum_bid, 13_000);
    assert_eq!(harness.store.len().await, 6);

    let synced = other.snapshot(16).await.unwrap();
    assert_eq!(synced.bid_count, 3);
    assert_eq!(synced.highest_bidder_id, Some(2));
}

/// 진행 중에는 주기마다 남은 시간 방송
#[tokio::test]
async fn test_clock_broadcasts_time_updates() {
    let harness = setup(Duration::from_millis(100));
    harness
        .coordinator
        .register(verified_auction(17, None, 60))
        .await
        .unwrap();
    let mut receiver = harness.coordinator.subscribe(17).await.unwrap();
    harness.coordinator.start(17).await.unwrap();

    let (count, ends_at) = tokio::time::timeout(Duration::from_secs(3), async {
        let mut count = 0;
        loop {
            match receiver.recv().await {
                Ok(ServerMessage::TimeUpdate {
                    remaining_secs,
                    ends_at,
                    ..
                }) => {
                    assert!((0..=60).contains(&remaining_secs));
                    count += 1;
                    if count == 3 {
                        return (count, ends_at);
                    }
                }
                Ok(_) => continue,
                Err(e) => panic!("수신 오류: {:?}", e),
            }
        }
    })
    .await
    .expect("남은 시간 방송이 오지 않음");

    assert_eq!(count, 3);
    let snapshot = harness.coordinator.snapshot(17).await.unwrap();
    assert_eq!(snapshot.ends_at, Some(ends_at));
}

/// 마감 직전 입찰은 종료 시간을 연장
#[tokio::test]
async fn test_late_bid_extends_deadline() {
    let harness = setup_with(LiveSettings {
        bid_extension: chrono::Duration::seconds(30),
        ..settings(Duration::from_secs(60))
    });
    harness
        .coordinator
        .register(verified_auction(18, None, 5))
        .await
        .unwrap();
    harness.coordinator.start(18).await.unwrap();
    let original = harness.coordinator.snapshot(18).await.unwrap().ends_at.unwrap();
    deposit_and_join(&harness, 18, 2).await;

    let mut receiver = harness.coordinator.subscribe(18).await.unwrap();
    harness
        .coordinator
        .place_bid(&bid(18, 2, 10_000))
        .await
        .unwrap();

    let extended = harness.coordinator.snapshot(18).await.unwrap().ends_at.unwrap();
    assert!(extended > original);
    assert!(extended - Utc::now() > chrono::Duration::seconds(25));

    let mut announced = None;
    while let Ok(message) = receiver.try_recv() {
        if let ServerMessage::BidUpdate { ends_at, .. } = message {
            announced = ends_at;
        }
    }
    assert_eq!(announced, Some(extended));
}

/// 느린 발행자를 기다리지 않고 저장 순서대로 발행
#[tokio::test]
async fn test_publishing_does_not_block_commands() {
    #[derive(Default)]
    struct SlowPublisher {
        published: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl EventPublisher for SlowPublisher {
        async fn publish(&self, event: &Event) -> Result<(), BrokerError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.published.lock().await.push(event.version);
            Ok(())
        }
    }

    init_tracing();
    let store = Arc::new(InMemoryEventStore::new());
    let deposits = Arc::new(InMemoryDepositLedger::new());
    let publisher = Arc::new(SlowPublisher::default());
    let coordinator = AuctionCoordinator::new(
        store.clone(),
        deposits.clone(),
        settings(Duration::from_secs(60)),
    )
    .with_publisher(publisher.clone());

    coordinator
        .register(verified_auction(19, None, 60))
        .await
        .unwrap();
    deposits.record_deposit(19, 2, 2_000).await.unwrap();

    let started = Instant::now();
    coordinator.start(19).await.unwrap();
    coordinator.join(19, 2).await.unwrap();
    for i in 0..4 {
        coordinator
            .place_bid(&bid(19, 2, 10_000 + i * 1_000))
            .await
            .unwrap();
    }
    // 발행을 기다렸다면 6 x 200ms
    assert!(started.elapsed() < Duration::from_millis(600));

    tokio::time::timeout(Duration::from_secs(5), async {
        while publisher.published.lock().await.len() < 6 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("발행이 끝나지 않음");
    assert_eq!(*publisher.published.lock().await, vec![1, 2, 3, 4, 5, 6]);
}

/// 삭제는 진행 전 경매만, 실패하면 방을 유지
#[tokio::test]
async fn test_retire_only_before_start() {
    let harness = setup(Duration::from_secs(60));
    harness
        .coordinator
        .register(verified_auction(20, None, 60))
        .await
        .unwrap();
    harness.coordinator.start(20).await.unwrap();

    let deleted_flag = AtomicBool::new(false);
    let deleted = &deleted_flag;
    let live = harness
        .coordinator
        .retire(20, || async move {
            deleted.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;
    assert!(matches!(
        live,
        Err(AppError::Session(SessionError::InvalidTransition(_)))
    ));
    assert!(!deleted.load(Ordering::SeqCst));
    assert!(harness.coordinator.room(20).await.is_some());

    harness
        .coordinator
        .register(verified_auction(21, None, 60))
        .await
        .unwrap();
    let failed = harness
        .coordinator
        .retire(21, || async {
            Err(AppError::BadRequest("삭제 실패".into()))
        })
        .await;
    assert!(failed.is_err());
    harness.coordinator.start(21).await.unwrap();

    harness
        .coordinator
        .register(verified_auction(22, None, 60))
        .await
        .unwrap();
    let room = harness.coordinator.room(22).await.unwrap();
    harness
        .coordinator
        .retire(22, || async { Ok(()) })
        .await
        .unwrap();
    assert!(room.is_retired());
    assert!(harness.coordinator.room(22).await.is_none());
    assert!(matches!(
        harness.coordinator.start(22).await,
        Err(AppError::AuctionNotFound(22))
    ));
}

/// 삭제 중에 들어온 시작 요청은 이벤트를 남기지 않는다
#[tokio::test]
async fn test_start_racing_delete_records_nothing() {
    let harness = setup(Duration::from_secs(60));
    harness
        .coordinator
        .register(verified_auction(23, None, 60))
        .await
        .unwrap();
    let events_before = harness.store.len().await;

    let coordinator = Arc::clone(&harness.coordinator);
    let deleting = tokio::spawn(async move {
        coordinator
            .retire(23, || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = harness.coordinator.start(23).await;
    assert!(matches!(started, Err(AppError::AuctionNotFound(23))));
    deleting.await.unwrap().unwrap();
    assert_eq!(harness.store.len().await, events_before);
}
