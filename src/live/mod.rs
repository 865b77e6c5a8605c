/// 실시간 경매 코디네이터
/// 경매 id 별 방(AuctionRoom)을 관리하고 참가/입찰/즉시 구매/종료를 처리한다.
// region:    --- Imports
use crate::auction::events::CloseReason;
use crate::auction::model::{Auction, AuctionStatus};
use crate::auction::session::{AuctionSession, AuctionSnapshot, CloseOutcome, SessionError};
use crate::bidding::commands::{BuyNowCommand, PlaceBidCommand};
use crate::config::Config;
use crate::deposit::{checkout_url, DepositLedger};
use crate::error::AppError;
use crate::event_store::{EventOutbox, EventPublisher, EventStore};
use crate::realtime::protocol::ServerMessage;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

mod room;

pub use room::AuctionRoom;

// endregion: --- Imports

// region:    --- Settings
#[derive(Debug, Clone)]
pub struct LiveSettings {
    /// 남은 시간 방송 주기
    pub tick: Duration,
    /// 마감 직전 입찰 시 연장 시간 (0 이면 연장 없음)
    pub bid_extension: chrono::Duration,
    pub checkout_base_url: String,
}

impl LiveSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick: config.tick,
            bid_extension: chrono::Duration::seconds(config.bid_extension_secs.max(0)),
            checkout_base_url: config.checkout_base_url.clone(),
        }
    }
}
// endregion: --- Settings

// region:    --- Outcomes
/// 참가 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JoinOutcome {
    Joined { snapshot: AuctionSnapshot },
    Watching { snapshot: AuctionSnapshot },
    NeedDeposit { deposit: i64, checkout_url: String },
    Closed { outcome: CloseOutcome },
}

impl JoinOutcome {
    /// 참가 요청자에게 보낼 메시지
    pub fn to_message(&self, auction_id: i64, user_id: i64) -> ServerMessage {
        match self {
            JoinOutcome::Joined { snapshot } => ServerMessage::Joined {
                auction_id,
                user_id,
                snapshot: snapshot.clone(),
            },
            JoinOutcome::Watching { snapshot } => ServerMessage::Info(snapshot.clone()),
            JoinOutcome::NeedDeposit {
                deposit,
                checkout_url,
            } => ServerMessage::NeedDeposit {
                auction_id,
                deposit: *deposit,
                checkout_url: checkout_url.clone(),
            },
            JoinOutcome::Closed { outcome } => ServerMessage::closed(auction_id, outcome),
        }
    }
}

/// 입찰 접수 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BidReceipt {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub current_price: i64,
    pub minimum_bid: i64,
    pub buy_now: bool,
    pub status: AuctionStatus,
}
// endregion: --- Outcomes

// region:    --- Auction Coordinator
pub struct AuctionCoordinator {
    rooms: RwLock<HashMap<i64, Arc<AuctionRoom>>>,
    event_store: Arc<dyn EventStore>,
    deposits: Arc<dyn DepositLedger>,
    outbox: Option<EventOutbox>,
    settings: LiveSettings,
}

impl AuctionCoordinator {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        deposits: Arc<dyn DepositLedger>,
        settings: LiveSettings,
    ) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            event_store,
            deposits,
            outbox: None,
            settings,
        }
    }

    /// 저장된 이벤트를 발행할 발행자 연결 (발행 작업 시작)
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.outbox = Some(EventOutbox::spawn(publisher));
        self
    }

    pub fn deposits(&self) -> &Arc<dyn DepositLedger> {
        &self.deposits
    }

    // region:    --- Registry

    pub async fn room(&self, auction_id: i64) -> Option<Arc<AuctionRoom>> {
        self.rooms.read().await.get(&auction_id).cloned()
    }

    async fn room_or_err(&self, auction_id: i64) -> Result<Arc<AuctionRoom>, AppError> {
        self.room(auction_id)
            .await
            .ok_or(AppError::AuctionNotFound(auction_id))
    }

    /// 경매 방 등록: 이벤트 재생으로 세션 복원, 진행 중이면 타이머 시작
    pub async fn register(&self, auction: Auction) -> Result<Arc<AuctionRoom>, AppError> {
        if let Some(room) = self.room(auction.id).await {
            return Ok(room);
        }

        let mut session = AuctionSession::from_auction(&auction);
        let events = self.event_store.load_events(auction.id).await?;
        for stored in &events {
            session.replay(&stored.decode()?, stored.version);
        }
        let status = session.status();

        let room = {
            let mut rooms = self.rooms.write().await;
            let room = Arc::new(AuctionRoom::new(
                session,
                Arc::clone(&self.event_store),
                self.outbox.clone(),
            ));
            Arc::clone(rooms.entry(auction.id).or_insert(room))
        };
        info!(
            "{:<12} --> 경매 방 등록 id: {}, 상태: {:?}, 이벤트 {}건 재생",
            "Live",
            auction.id,
            status,
            events.len()
        );

        if status == AuctionStatus::Live {
            room.spawn_clock(self.settings.tick);
        }
        Ok(room)
    }

    /// 진행 전 경매의 조건 변경 반영 (검증 등)
    pub async fn refresh(&self, auction: &Auction) {
        let Some(room) = self.room(auction.id).await else {
            return;
        };
        let mut session = room.lock().await;
        if matches!(
            session.status(),
            AuctionStatus::Draft | AuctionStatus::Verified
        ) {
            *session = AuctionSession::from_auction(auction);
            room.broadcast(ServerMessage::Info(session.snapshot(Utc::now())));
        }
    }

    async fn unregister(&self, auction_id: i64) {
        self.rooms.write().await.remove(&auction_id);
    }

    /// 진행 전 경매 삭제
    /// 방 잠금을 쥔 채 상태 확인과 삭제를 하므로 삭제 중에 시작될 수 없다.
    /// 삭제가 성공하면 방은 더 이상 이벤트를 기록하지 않고 등록에서 빠진다.
    pub async fn retire<F, Fut>(&self, auction_id: i64, delete: F) -> Result<(), AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), AppError>>,
    {
        let room = self.room_or_err(auction_id).await?;
        {
            let session = room.lock().await;
            match session.status() {
                AuctionStatus::Live => {
                    return Err(SessionError::InvalidTransition(
                        "진행 중인 경매는 삭제할 수 없습니다",
                    )
                    .into())
                }
                AuctionStatus::Ended => return Err(SessionError::AlreadyEnded.into()),
                AuctionStatus::Draft | AuctionStatus::Verified => {}
            }
            delete().await?;
            room.retire();
        }
        self.unregister(auction_id).await;
        info!("{:<12} --> 경매 삭제 id: {}", "Live", auction_id);
        Ok(())
    }

    /// 구독자가 없는 종료된 방 정리
    pub async fn evict_idle(&self) -> usize {
        let mut rooms = self.rooms.write().await;
        let before = rooms.len();
        rooms.retain(|_, room| {
            room.subscribers() > 0 || room.try_status() != Some(AuctionStatus::Ended)
        });
        before - rooms.len()
    }

    /// 저장소에 있는 새 이벤트를 세션에 반영 (다른 인스턴스가 기록한 경우)
    pub async fn resync(&self, auction_id: i64) -> Result<(), AppError> {
        let room = self.room_or_err(auction_id).await?;
        let mut session = room.lock().await;
        let events = self.event_store.load_events(auction_id).await?;
        for stored in events.iter().filter(|e| e.version > session.version()) {
            let event = stored.decode()?;
            session.replay(&event, stored.version);
            room.announce(&session, &event);
        }
        let live = session.status() == AuctionStatus::Live;
        drop(session);

        if live {
            room.spawn_clock(self.settings.tick);
        }
        Ok(())
    }

    // endregion: --- Registry

    // region:    --- Queries

    pub async fn snapshot(&self, auction_id: i64) -> Result<AuctionSnapshot, AppError> {
        Ok(self.room_or_err(auction_id).await?.snapshot().await)
    }

    pub async fn subscribe(
        &self,
        auction_id: i64,
    ) -> Result<broadcast::Receiver<ServerMessage>, AppError> {
        Ok(self.room_or_err(auction_id).await?.subscribe())
    }

    // endregion: --- Queries

    // region:    --- Commands

    /// 1. 경매 시작
    pub async fn start(&self, auction_id: i64) -> Result<(), AppError> {
        let room = self.room_or_err(auction_id).await?;
        {
            let mut session = room.lock().await;
            let now = Utc::now();
            let event = session.decide_start(now)?;
            room.commit(&mut session, event).await?;
        }
        info!("{:<12} --> 경매 시작 id: {}", "Live", auction_id);
        room.spawn_clock(self.settings.tick);
        Ok(())
    }

    /// 2. 참가 (보증금 게이트)
    pub async fn join(&self, auction_id: i64, user_id: i64) -> Result<JoinOutcome, AppError> {
        let room = self.room_or_err(auction_id).await?;

        let (deposit, needs_check) = {
            let session = room.lock().await;
            let now = Utc::now();
            match session.status() {
                AuctionStatus::Ended => {
                    let outcome = session.outcome().ok_or(SessionError::AlreadyEnded)?;
                    return Ok(JoinOutcome::Closed {
                        outcome: outcome.clone(),
                    });
                }
                AuctionStatus::Draft | AuctionStatus::Verified => {
                    return Ok(JoinOutcome::Watching {
                        snapshot: session.snapshot(now),
                    })
                }
                AuctionStatus::Live => {}
            }
            if user_id == session.seller_id() {
                return Ok(JoinOutcome::Watching {
                    snapshot: session.snapshot(now),
                });
            }
            if session.is_participant(user_id) {
                return Ok(JoinOutcome::Joined {
                    snapshot: session.snapshot(now),
                });
            }
            (session.deposit(), session.deposit() > 0)
        };

        if needs_check && !self.deposits.has_deposit(auction_id, user_id).await? {
            info!(
                "{:<12} --> 보증금 미납 참가 요청 id: {}, 사용자: {}",
                "Live", auction_id, user_id
            );
            return Ok(JoinOutcome::NeedDeposit {
                deposit,
                checkout_url: checkout_url(
                    &self.settings.checkout_base_url,
                    auction_id,
                    user_id,
                    deposit,
                ),
            });
        }

        let mut session = room.lock().await;
        let now = Utc::now();
        if let Some(event) = session.decide_join(user_id, now)? {
            room.commit(&mut session, event).await?;
            info!(
                "{:<12} --> 경매 참가 id: {}, 사용자: {}",
                "Live", auction_id, user_id
            );
        }
        Ok(JoinOutcome::Joined {
            snapshot: session.snapshot(now),
        })
    }

    /// 3. 입찰
    pub async fn place_bid(&self, cmd: &PlaceBidCommand) -> Result<BidReceipt, AppError> {
        let room = self.room_or_err(cmd.auction_id).await?;
        let mut session = room.lock().await;
        let now = Utc::now();
        let event = session.decide_bid(
            cmd.bidder_id,
            cmd.bid_amount,
            now,
            self.settings.bid_extension,
        )?;
        room.commit(&mut session, event).await?;
        Ok(receipt(&session, cmd.bidder_id, now))
    }

    /// 4. 즉시 구매
    pub async fn buy_now(&self, cmd: &BuyNowCommand) -> Result<BidReceipt, AppError> {
        let room = self.room_or_err(cmd.auction_id).await?;
        let mut session = room.lock().await;
        let now = Utc::now();
        let event = session.decide_buy_now(cmd.buyer_id, now)?;
        room.commit(&mut session, event).await?;
        info!(
            "{:<12} --> 즉시 구매 낙찰 id: {}, 구매자: {}",
            "Live", cmd.auction_id, cmd.buyer_id
        );
        Ok(receipt(&session, cmd.buyer_id, now))
    }

    /// 5. 관리자 종료
    pub async fn close(&self, auction_id: i64) -> Result<CloseOutcome, AppError> {
        let room = self.room_or_err(auction_id).await?;
        let mut session = room.lock().await;
        let now = Utc::now();
        let event = session.decide_close(CloseReason::Admin, now)?;
        room.commit(&mut session, event).await?;
        info!("{:<12} --> 관리자 경매 종료 id: {}", "Live", auction_id);
        session
            .outcome()
            .cloned()
            .ok_or(AppError::BadRequest("경매 종료 결과가 없습니다.".into()))
    }

    // endregion: --- Commands
}

fn receipt(session: &AuctionSession, bidder_id: i64, now: chrono::DateTime<Utc>) -> BidReceipt {
    let snapshot = session.snapshot(now);
    BidReceipt {
        auction_id: snapshot.auction_id,
        bidder_id,
        current_price: snapshot.current_price,
        minimum_bid: snapshot.minimum_bid,
        buy_now: snapshot.outcome.map(|o| o.reason == CloseReason::BuyNow).unwrap_or(false),
        status: snapshot.status,
    }
}
// endregion: --- Auction Coordinator
