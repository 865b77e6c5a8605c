// region:    --- Imports
use crate::auction::events::AuctionEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

mod memory;
mod outbox;
mod projector;

pub use memory::InMemoryEventStore;
pub use outbox::{EventOutbox, EventPublisher};
pub use projector::EventConsumer;

// endregion: --- Imports

// region:    --- Event Model
/// 이벤트 저장소에 저장되는 이벤트 모델
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Event {
    pub id: i64,
    pub aggregate_id: i64,
    pub event_type: String,
    pub data: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: i64,
}

impl Event {
    /// 경매 이벤트를 저장용 레코드로 변환
    pub fn from_auction_event(event: &AuctionEvent, version: i64) -> Result<Self, EventStoreError> {
        Ok(Event {
            id: 0,
            aggregate_id: event.auction_id(),
            event_type: event.event_type().to_string(),
            data: serde_json::to_value(event)?,
            timestamp: event.timestamp(),
            version,
        })
    }

    pub fn decode(&self) -> Result<AuctionEvent, EventStoreError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}
// endregion: --- Event Model

// region:    --- Event Store Error
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("버전 충돌: aggregate={aggregate_id}, version={version}")]
    VersionConflict { aggregate_id: i64, version: i64 },

    #[error("이벤트 직렬화 오류: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("이벤트 저장 오류: {0}")]
    Database(#[from] sqlx::Error),
}

impl EventStoreError {
    pub fn code(&self) -> &'static str {
        match self {
            EventStoreError::VersionConflict { .. } => "VERSION_CONFLICT",
            EventStoreError::Serialization(_) => "INTERNAL",
            EventStoreError::Database(_) => "INTERNAL",
        }
    }
}
// endregion: --- Event Store Error

// region:    --- Event Store Trait
/// 이벤트 저장소 트레이트
#[async_trait]
pub trait EventStore: Send + Sync {
    /// 이벤트 저장, 같은 버전이 이미 있으면 VersionConflict
    /// 저장된 레코드(id 포함)를 돌려준다
    async fn append_event(&self, event: Event) -> Result<Event, EventStoreError>;

    /// 경매의 모든 이벤트를 버전 순으로 조회
    async fn load_events(&self, aggregate_id: i64) -> Result<Vec<Event>, EventStoreError>;
}

/// 이벤트 저장소 구현체
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

/// 이벤트 저장소 구현체 메서드 구현
#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append_event(&self, event: Event) -> Result<Event, EventStoreError> {
        let event_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO events (aggregate_id, event_type, data, timestamp, version)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id, version) DO NOTHING
            RETURNING id",
        )
        .bind(event.aggregate_id)
        .bind(&event.event_type)
        .bind(&event.data)
        .bind(event.timestamp)
        .bind(event.version)
        .fetch_optional(&*self.pool)
        .await?
        .ok_or(EventStoreError::VersionConflict {
            aggregate_id: event.aggregate_id,
            version: event.version,
        })?;

        info!(
            "{:<12} --> {} 저장 (aggregate={}, version={})",
            "EventStore", event.event_type, event.aggregate_id, event.version
        );
        Ok(Event {
            id: event_id,
            ..event
        })
    }

    async fn load_events(&self, aggregate_id: i64) -> Result<Vec<Event>, EventStoreError> {
        let events = sqlx::query_as::<_, Event>(
            "SELECT id, aggregate_id, event_type, data, timestamp, version
            FROM events WHERE aggregate_id = $1 ORDER BY version",
        )
        .bind(aggregate_id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(events)
    }
}

/// 이벤트 저장소 생성
impl PostgresEventStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

// endregion: --- Event Store Trait
