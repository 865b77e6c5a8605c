// region:    --- Imports
use crate::auction::model::AuctionStatus;
use crate::bidding::commands::{
    self, BuyNowCommand, CreateAuctionCommand, JoinAuctionCommand, PlaceBidCommand,
    VerifyAuctionCommand,
};
use crate::error::AppError;
use crate::live::JoinOutcome;
use crate::query;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

// endregion: --- Imports

// region:    --- Request Bodies
#[derive(Debug, Deserialize)]
pub struct UserBody {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct BidBody {
    #[serde(alias = "bidder_id")]
    pub user_id: i64,
    #[serde(alias = "bid_amount")]
    pub amount: i64,
}
// endregion: --- Request Bodies

// region:    --- Live Handlers

/// 보증금 납부 기록 (결제 완료 콜백)
pub async fn handle_deposit(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
    Json(body): Json<UserBody>,
) -> Result<impl IntoResponse, AppError> {
    info!(
        "{:<12} --> 보증금 납부 id: {}, 사용자: {}",
        "Handler", auction_id, body.user_id
    );
    let snapshot = state.room(auction_id).await?.snapshot().await;

    if snapshot.status == AuctionStatus::Ended {
        return Err(AppError::BadRequest("이미 종료된 경매입니다.".into()));
    }
    if snapshot.seller_id == body.user_id {
        return Err(AppError::BadRequest(
            "판매자는 보증금을 납부할 수 없습니다.".into(),
        ));
    }
    if snapshot.deposit == 0 {
        return Err(AppError::BadRequest(
            "보증금이 필요 없는 경매입니다.".into(),
        ));
    }

    state
        .coordinator
        .deposits()
        .record_deposit(auction_id, body.user_id, snapshot.deposit)
        .await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "보증금 납부가 기록되었습니다.",
            "auction_id": auction_id,
            "user_id": body.user_id,
            "amount": snapshot.deposit,
        })),
    ))
}

/// 참가 요청, 보증금 미납 시 402
pub async fn handle_join(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
    Json(body): Json<UserBody>,
) -> Result<Json<JoinOutcome>, AppError> {
    state.room(auction_id).await?;
    let cmd = JoinAuctionCommand {
        auction_id,
        user_id: body.user_id,
    };
    match commands::handle_join(&state.coordinator, cmd).await? {
        JoinOutcome::NeedDeposit {
            deposit,
            checkout_url,
        } => Err(AppError::PaymentRequired {
            deposit,
            checkout_url,
        }),
        outcome => Ok(Json(outcome)),
    }
}

/// 입찰 요청 처리
pub async fn handle_bid(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
    Json(body): Json<BidBody>,
) -> Result<impl IntoResponse, AppError> {
    state.room(auction_id).await?;
    let cmd = PlaceBidCommand {
        auction_id,
        bidder_id: body.user_id,
        bid_amount: body.amount,
    };
    let receipt = commands::handle_place_bid(&state.coordinator, cmd).await?;
    Ok((StatusCode::OK, Json(receipt)))
}

/// 즉시 구매 요청 처리
pub async fn handle_buy_now(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
    Json(body): Json<UserBody>,
) -> Result<impl IntoResponse, AppError> {
    state.room(auction_id).await?;
    let cmd = BuyNowCommand {
        auction_id,
        buyer_id: body.user_id,
    };
    let receipt = commands::handle_buy_now(&state.coordinator, cmd).await?;
    Ok((StatusCode::OK, Json(receipt)))
}

// endregion: --- Live Handlers

// region:    --- Query Handlers

/// 모든 경매 조회
pub async fn handle_get_auctions(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    info!("{:<12} --> 모든 경매 조회", "HandlerQuery");
    let auctions = query::handlers::get_all_auctions(&state.db_manager).await?;
    Ok(Json(auctions))
}

/// 경매 조회 (진행 중이면 실시간 상태 포함)
pub async fn handle_get_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    info!("{:<12} --> 경매 조회 id: {}", "HandlerQuery", auction_id);
    let auction = query::handlers::get_auction(&state.db_manager, auction_id)
        .await?
        .ok_or(AppError::AuctionNotFound(auction_id))?;
    let live = match state.coordinator.room(auction_id).await {
        Some(room) => Some(room.snapshot().await),
        None => None,
    };
    Ok(Json(json!({ "auction": auction, "live": live })))
}

/// 입찰 이력 조회
pub async fn handle_get_bid_history(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    info!("{:<12} --> 입찰 이력 조회 id: {}", "HandlerQuery", auction_id);
    let history = query::handlers::get_bid_history(&state.db_manager, auction_id).await?;
    Ok(Json(history))
}

/// 최고 입찰가 조회
pub async fn handle_get_highest_bid(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    info!(
        "{:<12} --> 최고 입찰가 조회 id: {}",
        "HandlerQuery", auction_id
    );
    let highest = query::handlers::get_highest_bid(&state.db_manager, auction_id).await?;
    Ok(Json(json!({ "auction_id": auction_id, "highest_bid": highest })))
}

// endregion: --- Query Handlers

// region:    --- Admin Handlers

/// 경매 등록
pub async fn handle_create_auction(
    State(state): State<AppState>,
    Json(cmd): Json<CreateAuctionCommand>,
) -> Result<impl IntoResponse, AppError> {
    let auction = commands::handle_create_auction(&state.db_manager, cmd).await?;
    Ok((StatusCode::CREATED, Json(auction)))
}

/// 경매 검증
pub async fn handle_verify_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
    Json(cmd): Json<VerifyAuctionCommand>,
) -> Result<impl IntoResponse, AppError> {
    let auction =
        commands::handle_verify_auction(&state.db_manager, &state.coordinator, auction_id, cmd)
            .await?;
    Ok(Json(auction))
}

/// 경매 시작
pub async fn handle_start_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    commands::handle_start_auction(&state.db_manager, &state.coordinator, auction_id).await?;
    let snapshot = state.coordinator.snapshot(auction_id).await?;
    Ok(Json(snapshot))
}

/// 경매 강제 종료
pub async fn handle_close_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.room(auction_id).await?;
    let outcome = state.coordinator.close(auction_id).await?;
    Ok(Json(outcome))
}

/// 경매 삭제
pub async fn handle_delete_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    commands::handle_delete_auction(&state.db_manager, &state.coordinator, auction_id).await?;
    Ok(StatusCode::OK)
}

/// 경매 거래 원장 조회
pub async fn handle_get_transactions(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    info!(
        "{:<12} --> 거래 원장 조회 id: {}",
        "HandlerQuery", auction_id
    );
    let transactions =
        query::handlers::get_auction_transactions(&state.db_manager, auction_id).await?;
    Ok(Json(transactions))
}

// endregion: --- Admin Handlers
