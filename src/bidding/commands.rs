/// 경매 관련 커맨드 처리
/// 1. 경매 등록 / 검증 / 시작 / 삭제 (관리자)
/// 2. 참가 / 입찰 / 즉시 구매 (실시간, 버전 충돌 시 재동기화 후 재시도)
// region:    --- Imports
use crate::auction::model::Auction;
use crate::database::DatabaseManager;
use crate::error::AppError;
use crate::event_store::EventStoreError;
use crate::live::{AuctionCoordinator, BidReceipt, JoinOutcome};
use crate::query::handlers;
use crate::query::queries;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
// endregion: --- Imports

// region:    --- Commands
/// 경매 등록 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateAuctionCommand {
    pub product_id: i64,
    pub seller_id: i64,
    pub starting_price: i64,
    pub target_price: Option<i64>,
    pub step: i64,
    #[serde(default)]
    pub deposit: i64,
}

/// 경매 검증 명령 (관리자가 기간 설정)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerifyAuctionCommand {
    pub duration_secs: i64,
    pub start_time: Option<DateTime<Utc>>,
}

/// 참가 명령
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JoinAuctionCommand {
    pub auction_id: i64,
    pub user_id: i64,
}

/// 입찰 명령
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlaceBidCommand {
    pub auction_id: i64,
    #[serde(alias = "user_id")]
    pub bidder_id: i64,
    #[serde(alias = "amount")]
    pub bid_amount: i64,
}

/// 즉시 구매 명령
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BuyNowCommand {
    pub auction_id: i64,
    #[serde(alias = "user_id")]
    pub buyer_id: i64,
}

// 최대 재시도 횟수
const MAX_RETRIES: i32 = 5;
// endregion: --- Commands

// region:    --- Admin Commands

impl CreateAuctionCommand {
    fn validate(&self) -> Result<(), AppError> {
        if self.starting_price <= 0 {
            return Err(AppError::BadRequest("시작가는 0보다 커야 합니다.".into()));
        }
        if self.step <= 0 {
            return Err(AppError::BadRequest("입찰 단위는 0보다 커야 합니다.".into()));
        }
        if self.deposit < 0 {
            return Err(AppError::BadRequest("보증금은 음수일 수 없습니다.".into()));
        }
        if let Some(target) = self.target_price {
            if target <= self.starting_price {
                return Err(AppError::BadRequest(
                    "즉시 구매가는 시작가보다 커야 합니다.".into(),
                ));
            }
        }
        Ok(())
    }
}

/// 1. 경매 등록 (draft)
pub async fn handle_create_auction(
    db_manager: &DatabaseManager,
    cmd: CreateAuctionCommand,
) -> Result<Auction, AppError> {
    info!("{:<12} --> 경매 등록 요청: {:?}", "Command", cmd);
    cmd.validate()?;

    let auction = db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Auction>(queries::INSERT_AUCTION)
                    .bind(cmd.product_id)
                    .bind(cmd.seller_id)
                    .bind(cmd.starting_price)
                    .bind(cmd.target_price)
                    .bind(cmd.step)
                    .bind(cmd.deposit)
                    .fetch_one(&mut **tx)
                    .await
            })
        })
        .await?;
    Ok(auction)
}

/// 2. 경매 검증 (draft -> verified)
pub async fn handle_verify_auction(
    db_manager: &DatabaseManager,
    coordinator: &AuctionCoordinator,
    auction_id: i64,
    cmd: VerifyAuctionCommand,
) -> Result<Auction, AppError> {
    info!(
        "{:<12} --> 경매 검증 요청 id: {}, {:?}",
        "Command", auction_id, cmd
    );
    if cmd.duration_secs <= 0 {
        return Err(AppError::BadRequest("경매 기간은 0보다 커야 합니다.".into()));
    }

    let updated = db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Auction>(queries::VERIFY_AUCTION)
                    .bind(cmd.duration_secs)
                    .bind(cmd.start_time)
                    .bind(auction_id)
                    .fetch_optional(&mut **tx)
                    .await
            })
        })
        .await?;

    match updated {
        Some(auction) => {
            coordinator.refresh(&auction).await;
            Ok(auction)
        }
        None => Err(not_found_or_status(
            db_manager,
            auction_id,
            "draft 상태의 경매만 검증할 수 있습니다.",
        )
        .await),
    }
}

/// 3. 경매 시작 (verified -> live)
pub async fn handle_start_auction(
    db_manager: &DatabaseManager,
    coordinator: &AuctionCoordinator,
    auction_id: i64,
) -> Result<(), AppError> {
    info!("{:<12} --> 경매 시작 요청 id: {}", "Command", auction_id);
    if coordinator.room(auction_id).await.is_none() {
        let auction = handlers::get_auction(db_manager, auction_id)
            .await?
            .ok_or(AppError::AuctionNotFound(auction_id))?;
        coordinator.register(auction).await?;
    }
    coordinator.start(auction_id).await
}

/// 4. 경매 삭제 (draft, verified 이고 거래 내역이 없을 때만 가능)
/// 방 잠금 안에서 삭제하므로 삭제 중인 경매가 동시에 시작되지 않는다.
pub async fn handle_delete_auction(
    db_manager: &DatabaseManager,
    coordinator: &AuctionCoordinator,
    auction_id: i64,
) -> Result<(), AppError> {
    info!("{:<12} --> 경매 삭제 요청 id: {}", "Command", auction_id);
    if coordinator.room(auction_id).await.is_none() {
        let auction = handlers::get_auction(db_manager, auction_id)
            .await?
            .ok_or(AppError::AuctionNotFound(auction_id))?;
        coordinator.register(auction).await?;
    }

    coordinator
        .retire(auction_id, || async move {
            let deleted = db_manager
                .transaction(|tx| {
                    Box::pin(async move {
                        sqlx::query(queries::DELETE_AUCTION)
                            .bind(auction_id)
                            .execute(&mut **tx)
                            .await
                    })
                })
                .await?
                .rows_affected();

            if deleted == 0 {
                return Err(not_found_or_status(
                    db_manager,
                    auction_id,
                    "거래 내역이 있거나 진행 중인 경매는 삭제할 수 없습니다.",
                )
                .await);
            }
            Ok(())
        })
        .await
}

async fn not_found_or_status(
    db_manager: &DatabaseManager,
    auction_id: i64,
    message: &str,
) -> AppError {
    match handlers::get_auction(db_manager, auction_id).await {
        Ok(Some(_)) => AppError::BadRequest(message.to_string()),
        Ok(None) => AppError::AuctionNotFound(auction_id),
        Err(e) => e.into(),
    }
}

// endregion: --- Admin Commands

// region:    --- Live Commands

/// 5. 참가
pub async fn handle_join(
    coordinator: &AuctionCoordinator,
    cmd: JoinAuctionCommand,
) -> Result<JoinOutcome, AppError> {
    info!("{:<12} --> 참가 요청 처리 시작: {:?}", "Command", cmd);
    with_resync(coordinator, cmd.auction_id, || {
        coordinator.join(cmd.auction_id, cmd.user_id)
    })
    .await
}

/// 6. 입찰
pub async fn handle_place_bid(
    coordinator: &AuctionCoordinator,
    cmd: PlaceBidCommand,
) -> Result<BidReceipt, AppError> {
    info!("{:<12} --> 입찰 요청 처리 시작: {:?}", "Command", cmd);
    with_resync(coordinator, cmd.auction_id, || coordinator.place_bid(&cmd)).await
}

/// 7. 즉시 구매(낙찰)
pub async fn handle_buy_now(
    coordinator: &AuctionCoordinator,
    cmd: BuyNowCommand,
) -> Result<BidReceipt, AppError> {
    info!("{:<12} --> 즉시 구매 요청 처리 시작: {:?}", "Command", cmd);
    with_resync(coordinator, cmd.auction_id, || coordinator.buy_now(&cmd)).await
}

/// 다른 인스턴스가 먼저 이벤트를 저장한 경우 저장소와 재동기화 후 재시도
async fn with_resync<T, F, Fut>(
    coordinator: &AuctionCoordinator,
    auction_id: i64,
    mut attempt: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AppError>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Err(AppError::Store(EventStoreError::VersionConflict { version, .. }))
                if retries < MAX_RETRIES =>
            {
                warn!(
                    "{:<12} --> 버전 충돌(version={}): 재동기화 후 재시도",
                    "Command", version
                );
                retries += 1;
                coordinator.resync(auction_id).await?;
            }
            result => return result,
        }
    }
}

// endregion: --- Live Commands
