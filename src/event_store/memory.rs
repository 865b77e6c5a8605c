use super::{Event, EventStore, EventStoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// 메모리 이벤트 저장소 (테스트 및 로컬 실행용)
#[derive(Default)]
pub struct InMemoryEventStore {
    streams: Mutex<HashMap<i64, Vec<Event>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 전체 이벤트 수
    pub async fn len(&self) -> usize {
        self.streams.lock().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_event(&self, event: Event) -> Result<Event, EventStoreError> {
        let mut streams = self.streams.lock().await;
        let stream = streams.entry(event.aggregate_id).or_default();
        let expected = stream.last().map(|e| e.version).unwrap_or(0) + 1;
        if event.version != expected {
            return Err(EventStoreError::VersionConflict {
                aggregate_id: event.aggregate_id,
                version: event.version,
            });
        }

        let stored = Event {
            id: stream.len() as i64 + 1,
            ..event
        };
        stream.push(stored.clone());
        Ok(stored)
    }

    async fn load_events(&self, aggregate_id: i64) -> Result<Vec<Event>, EventStoreError> {
        let streams = self.streams.lock().await;
        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }
}
