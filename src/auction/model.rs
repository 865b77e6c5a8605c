use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// 경매 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "auction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Draft,
    Verified,
    Live,
    Ended,
}

// 경매 모델
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Auction {
    pub id: i64,
    pub product_id: i64,
    pub seller_id: i64,
    pub winner_id: Option<i64>,
    pub starting_price: i64,
    /// 즉시 구매 가격 (없으면 즉시 구매 불가)
    pub target_price: Option<i64>,
    pub step: i64,
    pub deposit: i64,
    pub duration_secs: Option<i64>,
    pub status: AuctionStatus,
    pub winning_price: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// 입찰 모델
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bid {
    pub id: i64,
    pub auction_id: i64,
    pub bidder_id: i64,
    pub bid_amount: i64,
    pub bid_time: DateTime<Utc>,
}

// 거래 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    DepositRefund,
    AuctionPayment,
}

// 거래 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
}

// 거래 원장 모델
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: i64,
    pub auction_id: i64,
    pub user_id: i64,
    pub amount: i64,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}
