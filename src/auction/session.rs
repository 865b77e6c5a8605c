/// 실시간 경매 상태 머신
/// 1. 시작 / 참가 / 입찰 / 즉시 구매 / 종료 결정 (decide_*)
/// 2. 이벤트 적용 (apply)
/// 시간은 항상 인자로 주입한다.
// region:    --- Imports
use crate::auction::events::{AuctionEvent, CloseReason};
use crate::auction::model::{Auction, AuctionStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Session Error
/// 입찰 규칙 위반
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("경매가 아직 시작되지 않았습니다.")]
    NotStarted,

    #[error("경매가 이미 종료되었습니다.")]
    AlreadyEnded,

    #[error("보증금을 납부하고 경매에 참가해야 입찰할 수 있습니다.")]
    NotJoined,

    #[error("판매자는 자신의 경매에 참여할 수 없습니다.")]
    SellerCannotBid,

    #[error("입찰 금액이 최소 입찰가({minimum})보다 낮습니다.")]
    LowBid { minimum: i64 },

    #[error("입찰 금액이 최대 입찰가({maximum})를 넘습니다.")]
    BidTooHigh { maximum: i64 },

    #[error("즉시 구매 가격이 없는 경매입니다.")]
    NoBuyNow,

    #[error("경매 종료 시간이 아직 지나지 않았습니다.")]
    NotExpired,

    #[error("잘못된 경매 상태 전이입니다: {0}")]
    InvalidTransition(&'static str),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotStarted => "NOT_STARTED",
            SessionError::AlreadyEnded => "ALREADY_ENDED",
            SessionError::NotJoined => "NOT_JOINED",
            SessionError::SellerCannotBid => "SELLER_CANNOT_BID",
            SessionError::LowBid { .. } => "LOW_BID",
            SessionError::BidTooHigh { .. } => "BID_TOO_HIGH",
            SessionError::NoBuyNow => "NO_BUY_NOW",
            SessionError::NotExpired => "NOT_EXPIRED",
            SessionError::InvalidTransition(_) => "INVALID_TRANSITION",
        }
    }
}
// endregion: --- Session Error

// region:    --- Snapshot
/// 종료 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseOutcome {
    pub winner_id: Option<i64>,
    pub winning_price: Option<i64>,
    pub reason: CloseReason,
    pub closed_at: DateTime<Utc>,
}

/// 클라이언트에 전달되는 경매 상태 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionSnapshot {
    pub auction_id: i64,
    pub product_id: i64,
    pub seller_id: i64,
    pub status: AuctionStatus,
    pub starting_price: i64,
    pub current_price: i64,
    pub step: i64,
    pub target_price: Option<i64>,
    pub deposit: i64,
    pub minimum_bid: i64,
    pub highest_bidder_id: Option<i64>,
    pub bid_count: u32,
    pub participants: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub remaining_secs: Option<i64>,
    pub outcome: Option<CloseOutcome>,
}
// endregion: --- Snapshot

// region:    --- Auction Session
#[derive(Debug, Clone)]
pub struct AuctionSession {
    auction_id: i64,
    product_id: i64,
    seller_id: i64,
    starting_price: i64,
    target_price: Option<i64>,
    step: i64,
    deposit: i64,
    duration_secs: Option<i64>,
    status: AuctionStatus,
    current_price: i64,
    leader: Option<i64>,
    bid_count: u32,
    started_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    participants: HashSet<i64>,
    outcome: Option<CloseOutcome>,
    version: i64,
}

impl AuctionSession {
    /// 경매 레코드로부터 세션 생성
    /// 진행 중이거나 종료된 경매는 이벤트 재생으로 복원하므로 Verified 에서 시작한다.
    pub fn from_auction(auction: &Auction) -> Self {
        let status = match auction.status {
            AuctionStatus::Draft => AuctionStatus::Draft,
            _ => AuctionStatus::Verified,
        };

        Self {
            auction_id: auction.id,
            product_id: auction.product_id,
            seller_id: auction.seller_id,
            starting_price: auction.starting_price,
            target_price: auction.target_price,
            step: auction.step,
            deposit: auction.deposit,
            duration_secs: auction.duration_secs,
            status,
            current_price: auction.starting_price,
            leader: None,
            bid_count: 0,
            started_at: None,
            ends_at: None,
            participants: HashSet::new(),
            outcome: None,
            version: 0,
        }
    }

    pub fn auction_id(&self) -> i64 {
        self.auction_id
    }

    pub fn seller_id(&self) -> i64 {
        self.seller_id
    }

    pub fn status(&self) -> AuctionStatus {
        self.status
    }

    pub fn deposit(&self) -> i64 {
        self.deposit
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.ends_at
    }

    pub fn outcome(&self) -> Option<&CloseOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_participant(&self, user_id: i64) -> bool {
        self.participants.contains(&user_id)
    }

    /// 다음 입찰의 최소 금액
    /// 첫 입찰은 시작가, 이후는 현재가 + 입찰 단위 (즉시 구매가를 넘지 않음)
    pub fn minimum_bid(&self) -> i64 {
        if self.bid_count == 0 {
            return self.starting_price;
        }
        let next = self.current_price.saturating_add(self.step);
        match self.target_price {
            Some(target) => next.min(target),
            None => next,
        }
    }

    /// 받을 수 있는 최대 입찰 금액 (다음 최소 입찰가 계산이 넘치지 않는 범위)
    pub fn maximum_bid(&self) -> i64 {
        i64::MAX - self.step
    }

    /// 남은 시간(초)
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        match (self.status, self.ends_at) {
            (AuctionStatus::Live, Some(ends_at)) => Some((ends_at - now).num_seconds().max(0)),
            _ => None,
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> AuctionSnapshot {
        AuctionSnapshot {
            auction_id: self.auction_id,
            product_id: self.product_id,
            seller_id: self.seller_id,
            status: self.status,
            starting_price: self.starting_price,
            current_price: self.current_price,
            step: self.step,
            target_price: self.target_price,
            deposit: self.deposit,
            minimum_bid: self.minimum_bid(),
            highest_bidder_id: self.leader,
            bid_count: self.bid_count,
            participants: self.participants.len(),
            started_at: self.started_at,
            ends_at: self.ends_at,
            remaining_secs: self.remaining_secs(now),
            outcome: self.outcome.clone(),
        }
    }

    // region:    --- Decisions

    /// 1. 경매 시작
    pub fn decide_start(&self, now: DateTime<Utc>) -> Result<AuctionEvent, SessionError> {
        match self.status {
            AuctionStatus::Draft => {
                return Err(SessionError::InvalidTransition("검증되지 않은 경매"))
            }
            AuctionStatus::Live => return Err(SessionError::InvalidTransition("이미 진행 중인 경매")),
            AuctionStatus::Ended => return Err(SessionError::AlreadyEnded),
            AuctionStatus::Verified => {}
        }

        let duration = match self.duration_secs {
            Some(secs) if secs > 0 => Duration::seconds(secs),
            _ => return Err(SessionError::InvalidTransition("경매 기간이 설정되지 않음")),
        };

        Ok(AuctionEvent::AuctionStarted {
            auction_id: self.auction_id,
            started_at: now,
            ends_at: now + duration,
        })
    }

    /// 2. 참가 (이미 참가한 경우 이벤트 없음)
    pub fn decide_join(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<AuctionEvent>, SessionError> {
        self.ensure_open(now)?;
        if user_id == self.seller_id {
            return Err(SessionError::SellerCannotBid);
        }
        if self.participants.contains(&user_id) {
            return Ok(None);
        }

        Ok(Some(AuctionEvent::ParticipantJoined {
            auction_id: self.auction_id,
            user_id,
            timestamp: now,
        }))
    }

    /// 3. 입찰
    /// 즉시 구매가 이상의 입찰은 즉시 구매로 처리한다.
    pub fn decide_bid(
        &self,
        bidder_id: i64,
        amount: i64,
        now: DateTime<Utc>,
        extension: Duration,
    ) -> Result<AuctionEvent, SessionError> {
        self.ensure_bidder(bidder_id, now)?;

        let minimum = self.minimum_bid();
        if amount < minimum {
            return Err(SessionError::LowBid { minimum });
        }

        if let Some(target) = self.target_price {
            if amount >= target {
                return Ok(AuctionEvent::BuyNowExecuted {
                    auction_id: self.auction_id,
                    buyer_id: bidder_id,
                    price: target,
                    timestamp: now,
                });
            }
        }

        let maximum = self.maximum_bid();
        if amount > maximum {
            return Err(SessionError::BidTooHigh { maximum });
        }

        // ensure_open 에서 ends_at 존재를 확인함
        let mut ends_at = self.ends_at.unwrap_or(now);
        if extension > Duration::zero() && ends_at - now < extension {
            ends_at = now + extension;
        }

        Ok(AuctionEvent::BidPlaced {
            auction_id: self.auction_id,
            bidder_id,
            bid_amount: amount,
            ends_at,
            timestamp: now,
        })
    }

    /// 4. 즉시 구매
    pub fn decide_buy_now(
        &self,
        buyer_id: i64,
        now: DateTime<Utc>,
    ) -> Result<AuctionEvent, SessionError> {
        self.ensure_bidder(buyer_id, now)?;
        let price = self.target_price.ok_or(SessionError::NoBuyNow)?;

        Ok(AuctionEvent::BuyNowExecuted {
            auction_id: self.auction_id,
            buyer_id,
            price,
            timestamp: now,
        })
    }

    /// 5. 종료 (최고 입찰자가 낙찰자)
    pub fn decide_close(
        &self,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Result<AuctionEvent, SessionError> {
        match self.status {
            AuctionStatus::Live => {}
            AuctionStatus::Ended => return Err(SessionError::AlreadyEnded),
            _ => return Err(SessionError::NotStarted),
        }

        if reason == CloseReason::Timeout {
            if let Some(ends_at) = self.ends_at {
                if now < ends_at {
                    return Err(SessionError::NotExpired);
                }
            }
        }

        Ok(AuctionEvent::AuctionClosed {
            auction_id: self.auction_id,
            winner_id: self.leader,
            winning_price: self.leader.map(|_| self.current_price),
            reason,
            timestamp: now,
        })
    }

    fn ensure_open(&self, now: DateTime<Utc>) -> Result<(), SessionError> {
        match self.status {
            AuctionStatus::Live => {}
            AuctionStatus::Ended => return Err(SessionError::AlreadyEnded),
            _ => return Err(SessionError::NotStarted),
        }
        match self.ends_at {
            Some(ends_at) if now < ends_at => Ok(()),
            _ => Err(SessionError::AlreadyEnded),
        }
    }

    fn ensure_bidder(&self, user_id: i64, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.ensure_open(now)?;
        if user_id == self.seller_id {
            return Err(SessionError::SellerCannotBid);
        }
        if !self.participants.contains(&user_id) {
            return Err(SessionError::NotJoined);
        }
        Ok(())
    }

    // endregion: --- Decisions

    // region:    --- Apply

    /// 이벤트 적용 (상태 변경은 여기서만)
    pub fn apply(&mut self, event: &AuctionEvent) {
        match event {
            AuctionEvent::AuctionStarted {
                started_at,
                ends_at,
                ..
            } => {
                self.status = AuctionStatus::Live;
                self.started_at = Some(*started_at);
                self.ends_at = Some(*ends_at);
            }
            AuctionEvent::ParticipantJoined { user_id, .. } => {
                self.participants.insert(*user_id);
            }
            AuctionEvent::BidPlaced {
                bidder_id,
                bid_amount,
                ends_at,
                ..
            } => {
                self.current_price = *bid_amount;
                self.leader = Some(*bidder_id);
                self.bid_count += 1;
                self.ends_at = Some(*ends_at);
            }
            AuctionEvent::BuyNowExecuted {
                buyer_id,
                price,
                timestamp,
                ..
            } => {
                self.current_price = *price;
                self.leader = Some(*buyer_id);
                self.bid_count += 1;
                self.status = AuctionStatus::Ended;
                self.outcome = Some(CloseOutcome {
                    winner_id: Some(*buyer_id),
                    winning_price: Some(*price),
                    reason: CloseReason::BuyNow,
                    closed_at: *timestamp,
                });
            }
            AuctionEvent::AuctionClosed {
                winner_id,
                winning_price,
                reason,
                timestamp,
                ..
            } => {
                self.status = AuctionStatus::Ended;
                self.outcome = Some(CloseOutcome {
                    winner_id: *winner_id,
                    winning_price: *winning_price,
                    reason: *reason,
                    closed_at: *timestamp,
                });
            }
        }
        self.version += 1;
    }

    /// 저장된 이벤트 재생 (저장소 버전 유지)
    pub fn replay(&mut self, event: &AuctionEvent, version: i64) {
        self.apply(event);
        self.version = version;
    }

    // endregion: --- Apply
}
// endregion: --- Auction Session

// endregion: --- Tests
