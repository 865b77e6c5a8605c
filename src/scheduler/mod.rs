/// 경매 상태 스케줄러
/// 1. 시작 시간이 지난 검증 완료 경매 시작
/// 2. 방이 없는 진행 중 경매 복원 (재시작 후 이벤트 재생, 마감이 지났으면 즉시 종료)
/// 3. 구독자 없는 종료된 방 정리
// region:    --- Imports
use crate::auction::model::AuctionStatus;
use crate::database::DatabaseManager;
use crate::live::AuctionCoordinator;
use crate::query::handlers;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Auction Scheduler
pub struct AuctionScheduler {
    db_manager: Arc<DatabaseManager>,
    coordinator: Arc<AuctionCoordinator>,
}

impl AuctionScheduler {
    pub fn new(db_manager: Arc<DatabaseManager>, coordinator: Arc<AuctionCoordinator>) -> Self {
        Self {
            db_manager,
            coordinator,
        }
    }

    /// 스케줄러 시작
    pub fn start(self) {
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1)); // 1초마다 실행
            loop {
                interval.tick().await;
                if let Err(e) = self.run_once().await {
                    error!(
                        "{:<12} --> 경매 상태 업데이트 중 오류 발생: {:?}",
                        "Scheduler", e
                    );
                }
            }
        });
    }

    async fn run_once(&self) -> Result<(), sqlx::Error> {
        // 진행 중 경매 복원
        for auction in handlers::get_live_auctions(&self.db_manager).await? {
            if self.coordinator.room(auction.id).await.is_some() {
                continue;
            }
            let auction_id = auction.id;
            match self.coordinator.register(auction).await {
                Ok(_) => info!("{:<12} --> 진행 중 경매 복원 id: {}", "Scheduler", auction_id),
                Err(e) => error!(
                    "{:<12} --> 경매 복원 실패 id: {}: {}",
                    "Scheduler", auction_id, e
                ),
            }
        }

        // verified -> live
        for auction in handlers::get_due_auctions(&self.db_manager, Utc::now()).await? {
            let auction_id = auction.id;
            // 이미 시작했고 읽기 모델 반영 대기 중
            if let Some(room) = self.coordinator.room(auction_id).await {
                if room.status().await != AuctionStatus::Verified {
                    continue;
                }
            }
            let started = match self.coordinator.register(auction).await {
                Ok(_) => self.coordinator.start(auction_id).await,
                Err(e) => Err(e),
            };
            match started {
                Ok(()) => info!("{:<12} --> 예약 경매 시작 id: {}", "Scheduler", auction_id),
                Err(e) => warn!(
                    "{:<12} --> 예약 경매 시작 건너뜀 id: {}: {}",
                    "Scheduler", auction_id, e
                ),
            }
        }

        let evicted = self.coordinator.evict_idle().await;
        if evicted > 0 {
            debug!("{:<12} --> 종료된 경매 방 {}개 정리", "Scheduler", evicted);
        }

        Ok(())
    }
}
// endregion: --- Auction Scheduler
