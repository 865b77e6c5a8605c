/// 실시간 채널 메시지
/// 프레임 형식: {"event": "auction:*", "data": {...}}
use crate::auction::events::CloseReason;
use crate::auction::session::{AuctionSnapshot, CloseOutcome};
use crate::bidding::commands::{BuyNowCommand, JoinAuctionCommand, PlaceBidCommand};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// region:    --- Client Message
/// 클라이언트 -> 서버
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "auction:join")]
    Join(JoinAuctionCommand),
    #[serde(rename = "auction:bid")]
    Bid(PlaceBidCommand),
    #[serde(rename = "auction:buy_now")]
    BuyNow(BuyNowCommand),
    #[serde(rename = "auction:leave")]
    Leave { auction_id: i64 },
}

impl ClientMessage {
    pub fn auction_id(&self) -> i64 {
        match self {
            ClientMessage::Join(cmd) => cmd.auction_id,
            ClientMessage::Bid(cmd) => cmd.auction_id,
            ClientMessage::BuyNow(cmd) => cmd.auction_id,
            ClientMessage::Leave { auction_id } => *auction_id,
        }
    }
}
// endregion: --- Client Message

// region:    --- Server Message
/// 서버 -> 클라이언트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "auction:info")]
    Info(AuctionSnapshot),

    #[serde(rename = "auction:live")]
    Live {
        auction_id: i64,
        started_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },

    #[serde(rename = "auction:joined")]
    Joined {
        auction_id: i64,
        user_id: i64,
        snapshot: AuctionSnapshot,
    },

    #[serde(rename = "auction:needDeposit")]
    NeedDeposit {
        auction_id: i64,
        deposit: i64,
        checkout_url: String,
    },

    #[serde(rename = "auction:bid_update")]
    BidUpdate {
        auction_id: i64,
        bidder_id: i64,
        amount: i64,
        minimum_bid: i64,
        bid_count: u32,
        ends_at: Option<DateTime<Utc>>,
        buy_now: bool,
    },

    #[serde(rename = "auction:time_update")]
    TimeUpdate {
        auction_id: i64,
        remaining_secs: i64,
        ends_at: DateTime<Utc>,
    },

    #[serde(rename = "auction:closed")]
    Closed {
        auction_id: i64,
        winner_id: Option<i64>,
        winning_price: Option<i64>,
        reason: CloseReason,
        closed_at: DateTime<Utc>,
    },

    #[serde(rename = "auction:error")]
    Error {
        auction_id: Option<i64>,
        code: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn closed(auction_id: i64, outcome: &CloseOutcome) -> Self {
        ServerMessage::Closed {
            auction_id,
            winner_id: outcome.winner_id,
            winning_price: outcome.winning_price,
            reason: outcome.reason,
            closed_at: outcome.closed_at,
        }
    }

    pub fn error(auction_id: Option<i64>, code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            auction_id,
            code: code.to_string(),
            message: message.into(),
        }
    }
}
// endregion: --- Server Message
