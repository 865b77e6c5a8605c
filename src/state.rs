use crate::config::Config;
use crate::database::DatabaseManager;
use crate::error::AppError;
use crate::live::{AuctionCoordinator, AuctionRoom};
use crate::query;
use std::sync::Arc;

/// 핸들러 공유 상태
#[derive(Clone)]
pub struct AppState {
    pub db_manager: Arc<DatabaseManager>,
    pub coordinator: Arc<AuctionCoordinator>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        db_manager: Arc<DatabaseManager>,
        coordinator: Arc<AuctionCoordinator>,
        config: Config,
    ) -> Self {
        Self {
            db_manager,
            coordinator,
            config: Arc::new(config),
        }
    }

    /// 등록된 경매 방 반환, 없으면 DB 에서 읽어 등록
    pub async fn room(&self, auction_id: i64) -> Result<Arc<AuctionRoom>, AppError> {
        if let Some(room) = self.coordinator.room(auction_id).await {
            return Ok(room);
        }
        let auction = query::handlers::get_auction(&self.db_manager, auction_id)
            .await?
            .ok_or(AppError::AuctionNotFound(auction_id))?;
        self.coordinator.register(auction).await
    }
}
