/// 경매 방: 한 경매의 세션, 구독자 채널, 타이머
/// 세션 잠금 안에서 결정 -> 저장 -> 적용 -> 방송 순서로 처리하므로
/// 모든 구독자는 같은 순서로 가격 변화를 받는다.
// region:    --- Imports
use crate::auction::events::{AuctionEvent, CloseReason};
use crate::auction::model::AuctionStatus;
use crate::auction::session::{AuctionSession, AuctionSnapshot};
use crate::error::AppError;
use crate::event_store::{Event, EventOutbox, EventStore};
use crate::realtime::protocol::ServerMessage;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, error, info};

// endregion: --- Imports

const CHANNEL_CAPACITY: usize = 256;

// region:    --- Auction Room
pub struct AuctionRoom {
    auction_id: i64,
    session: Mutex<AuctionSession>,
    sender: broadcast::Sender<ServerMessage>,
    event_store: Arc<dyn EventStore>,
    outbox: Option<EventOutbox>,
    clock_running: AtomicBool,
    /// 삭제된 경매, 더 이상 이벤트를 기록하지 않는다
    retired: AtomicBool,
}

impl AuctionRoom {
    pub fn new(
        session: AuctionSession,
        event_store: Arc<dyn EventStore>,
        outbox: Option<EventOutbox>,
    ) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            auction_id: session.auction_id(),
            session: Mutex::new(session),
            sender,
            event_store,
            outbox,
            clock_running: AtomicBool::new(false),
            retired: AtomicBool::new(false),
        }
    }

    pub fn auction_id(&self) -> i64 {
        self.auction_id
    }

    /// 방송 구독
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.sender.subscribe()
    }

    pub fn subscribers(&self) -> usize {
        self.sender.receiver_count()
    }

    pub async fn snapshot(&self) -> AuctionSnapshot {
        self.session.lock().await.snapshot(Utc::now())
    }

    pub async fn status(&self) -> AuctionStatus {
        self.session.lock().await.status()
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, AuctionSession> {
        self.session.lock().await
    }

    /// 잠금 중이 아닐 때만 상태 확인 (정리 작업용)
    pub(crate) fn try_status(&self) -> Option<AuctionStatus> {
        self.session.try_lock().ok().map(|session| session.status())
    }

    pub(crate) fn broadcast(&self, message: ServerMessage) {
        // 구독자가 없으면 전송 실패, 무시
        let _ = self.sender.send(message);
    }

    /// 세션 잠금을 쥔 상태에서 호출, 이후 commit 은 AuctionNotFound
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// 이벤트 저장 후 세션에 적용하고 방송, 발행은 outbox 에 맡긴다
    /// 저장 실패 시 세션은 변경되지 않는다.
    pub(crate) async fn commit(
        &self,
        session: &mut AuctionSession,
        event: AuctionEvent,
    ) -> Result<(), AppError> {
        if self.is_retired() {
            return Err(AppError::AuctionNotFound(self.auction_id));
        }
        let record = Event::from_auction_event(&event, session.version() + 1)?;
        let stored = self.event_store.append_event(record).await?;
        session.apply(&event);
        self.announce(session, &event);
        if let Some(outbox) = &self.outbox {
            outbox.push(stored);
        }
        Ok(())
    }

    /// 이벤트에 해당하는 클라이언트 메시지 방송
    pub(crate) fn announce(&self, session: &AuctionSession, event: &AuctionEvent) {
        for message in messages_for(session, event) {
            self.broadcast(message);
        }
    }

    // region:    --- Clock

    /// 남은 시간 방송 및 종료 타이머 시작 (방마다 하나)
    pub fn spawn_clock(self: &Arc<Self>, tick: Duration) {
        if self.clock_running.swap(true, Ordering::SeqCst) {
            return;
        }

        let room = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                "{:<12} --> 경매 타이머 시작 id: {}",
                "Live", room.auction_id
            );
            while let Some(wait) = room.on_tick(Utc::now(), tick).await {
                tokio::time::sleep(wait).await;
            }
            room.clock_running.store(false, Ordering::SeqCst);
            info!(
                "{:<12} --> 경매 타이머 종료 id: {}",
                "Live", room.auction_id
            );
        });
    }

    /// 한 번의 타이머 처리, 다음 대기 시간 반환 (None 이면 타이머 종료)
    async fn on_tick(&self, now: DateTime<Utc>, tick: Duration) -> Option<Duration> {
        let mut session = self.session.lock().await;
        if session.status() != AuctionStatus::Live || self.is_retired() {
            return None;
        }
        let ends_at = session.ends_at()?;

        if now >= ends_at {
            let closed = match session.decide_close(CloseReason::Timeout, now) {
                Ok(event) => self.commit(&mut session, event).await,
                Err(e) => Err(e.into()),
            };
            return match closed {
                Ok(()) => {
                    info!(
                        "{:<12} --> 경매 시간 종료 id: {}, 결과: {:?}",
                        "Live",
                        self.auction_id,
                        session.outcome()
                    );
                    None
                }
                Err(e) => {
                    error!(
                        "{:<12} --> 경매 종료 처리 실패 id: {}: {}",
                        "Live", self.auction_id, e
                    );
                    Some(tick)
                }
            };
        }

        let remaining = ends_at - now;
        self.broadcast(ServerMessage::TimeUpdate {
            auction_id: self.auction_id,
            remaining_secs: remaining.num_seconds(),
            ends_at,
        });
        debug!(
            "{:<12} --> 남은 시간 id: {}, {}초",
            "Live",
            self.auction_id,
            remaining.num_seconds()
        );

        let until_end = remaining.to_std().unwrap_or(Duration::ZERO);
        Some(tick.min(until_end).max(Duration::from_millis(1)))
    }

    // endregion: --- Clock
}
// endregion: --- Auction Room

// region:    --- Messages
fn messages_for(session: &AuctionSession, event: &AuctionEvent) -> Vec<ServerMessage> {
    let auction_id = session.auction_id();
    match event {
        AuctionEvent::AuctionStarted {
            started_at,
            ends_at,
            ..
        } => vec![ServerMessage::Live {
            auction_id,
            started_at: *started_at,
            ends_at: *ends_at,
        }],
        AuctionEvent::ParticipantJoined { .. } => Vec::new(),
        AuctionEvent::BidPlaced {
            bidder_id,
            bid_amount,
            ..
        } => vec![bid_update(session, *bidder_id, *bid_amount, false)],
        AuctionEvent::BuyNowExecuted {
            buyer_id, price, ..
        } => {
            let mut messages = vec![bid_update(session, *buyer_id, *price, true)];
            if let Some(outcome) = session.outcome() {
                messages.push(ServerMessage::closed(auction_id, outcome));
            }
            messages
        }
        AuctionEvent::AuctionClosed { .. } => session
            .outcome()
            .map(|outcome| vec![ServerMessage::closed(auction_id, outcome)])
            .unwrap_or_default(),
    }
}

fn bid_update(session: &AuctionSession, bidder_id: i64, amount: i64, buy_now: bool) -> ServerMessage {
    let snapshot = session.snapshot(Utc::now());
    ServerMessage::BidUpdate {
        auction_id: snapshot.auction_id,
        bidder_id,
        amount,
        minimum_bid: snapshot.minimum_bid,
        bid_count: snapshot.bid_count,
        ends_at: snapshot.ends_at,
        buy_now,
    }
}
// endregion: --- Messages
