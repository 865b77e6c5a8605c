use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// 경매 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Timeout,
    BuyNow,
    Admin,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum AuctionEvent {
    // 경매 시작 이벤트
    AuctionStarted {
        auction_id: i64,
        started_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },
    // 참가 이벤트 (보증금 납부자만)
    ParticipantJoined {
        auction_id: i64,
        user_id: i64,
        timestamp: DateTime<Utc>,
    },
    // 입찰 이벤트, 연장된 종료 시간 포함
    BidPlaced {
        auction_id: i64,
        bidder_id: i64,
        bid_amount: i64,
        ends_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    // 즉시 구매 이벤트 (경매 종료)
    BuyNowExecuted {
        auction_id: i64,
        buyer_id: i64,
        price: i64,
        timestamp: DateTime<Utc>,
    },
    // 경매 종료 이벤트
    AuctionClosed {
        auction_id: i64,
        winner_id: Option<i64>,
        winning_price: Option<i64>,
        reason: CloseReason,
        timestamp: DateTime<Utc>,
    },
}

impl AuctionEvent {
    /// 이벤트 저장소의 event_type 컬럼 값
    pub fn event_type(&self) -> &'static str {
        match self {
            AuctionEvent::AuctionStarted { .. } => "AuctionStarted",
            AuctionEvent::ParticipantJoined { .. } => "ParticipantJoined",
            AuctionEvent::BidPlaced { .. } => "BidPlaced",
            AuctionEvent::BuyNowExecuted { .. } => "BuyNowExecuted",
            AuctionEvent::AuctionClosed { .. } => "AuctionClosed",
        }
    }

    /// 이벤트 발생 시각 (시작 이벤트는 시작 시각)
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AuctionEvent::AuctionStarted { started_at, .. } => *started_at,
            AuctionEvent::ParticipantJoined { timestamp, .. }
            | AuctionEvent::BidPlaced { timestamp, .. }
            | AuctionEvent::BuyNowExecuted { timestamp, .. }
            | AuctionEvent::AuctionClosed { timestamp, .. } => *timestamp,
        }
    }

    pub fn auction_id(&self) -> i64 {
        match self {
            AuctionEvent::AuctionStarted { auction_id, .. }
            | AuctionEvent::ParticipantJoined { auction_id, .. }
            | AuctionEvent::BidPlaced { auction_id, .. }
            | AuctionEvent::BuyNowExecuted { auction_id, .. }
            | AuctionEvent::AuctionClosed { auction_id, .. } => *auction_id,
        }
    }
}
