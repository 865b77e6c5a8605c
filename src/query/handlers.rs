// region:    --- Imports
use super::queries;
use crate::auction::model::{Auction, Bid, Transaction};
use crate::database::DatabaseManager;
use chrono::{DateTime, Utc};
use sqlx::Error as SqlxError;
use sqlx::Row;
use tracing::{debug, info};

// endregion: --- Imports

// region:    --- Query Handlers

/// 모든 경매 조회
pub async fn get_all_auctions(db_manager: &DatabaseManager) -> Result<Vec<Auction>, SqlxError> {
    info!("{:<12} --> 모든 경매 조회", "Query");
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Auction>(queries::GET_ALL_AUCTIONS)
                    .fetch_all(&mut **tx)
                    .await
            })
        })
        .await
}

/// 경매 조회
pub async fn get_auction(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Option<Auction>, SqlxError> {
    info!("{:<12} --> 경매 조회 id: {}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Auction>(queries::GET_AUCTION)
                    .bind(auction_id)
                    .fetch_optional(&mut **tx)
                    .await
            })
        })
        .await
}

/// 최고 입찰가 조회
pub async fn get_highest_bid(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Option<i64>, SqlxError> {
    info!("{:<12} --> 최고 입찰가 조회 id: {}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                let result = sqlx::query(queries::GET_HIGHEST_BID)
                    .bind(auction_id)
                    .fetch_one(&mut **tx)
                    .await?;

                result.try_get("highest_bid")
            })
        })
        .await
}

/// 입찰 이력 조회
pub async fn get_bid_history(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Vec<Bid>, SqlxError> {
    info!("{:<12} --> 입찰 이력 조회 id: {}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Bid>(queries::GET_BID_HISTORY)
                    .bind(auction_id)
                    .fetch_all(&mut **tx)
                    .await
            })
        })
        .await
}

/// 경매 거래 원장 조회
pub async fn get_auction_transactions(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Vec<Transaction>, SqlxError> {
    info!("{:<12} --> 거래 원장 조회 id: {}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Transaction>(queries::GET_AUCTION_TRANSACTIONS)
                    .bind(auction_id)
                    .fetch_all(&mut **tx)
                    .await
            })
        })
        .await
}

/// 시작 시간이 지난 검증 완료 경매 조회
pub async fn get_due_auctions(
    db_manager: &DatabaseManager,
    now: DateTime<Utc>,
) -> Result<Vec<Auction>, SqlxError> {
    debug!("{:<12} --> 시작 대상 경매 조회", "Query");
    sqlx::query_as::<_, Auction>(queries::GET_DUE_AUCTIONS)
        .bind(now)
        .fetch_all(&*db_manager.get_pool())
        .await
}

/// 진행 중 경매 조회
pub async fn get_live_auctions(db_manager: &DatabaseManager) -> Result<Vec<Auction>, SqlxError> {
    debug!("{:<12} --> 진행 중 경매 조회", "Query");
    sqlx::query_as::<_, Auction>(queries::GET_LIVE_AUCTIONS)
        .fetch_all(&*db_manager.get_pool())
        .await
}

// endregion: --- Query Handlers
