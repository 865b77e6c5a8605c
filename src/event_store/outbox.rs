/// 이벤트 발행 대기열: 저장된 이벤트를 단일 작업이 순서대로 브로커에 넘긴다
// region:    --- Imports
use super::Event;
use crate::message_broker::BrokerError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

// endregion: --- Imports

/// 저장된 이벤트 발행 트레이트
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &Event) -> Result<(), BrokerError>;
}

// region:    --- Event Outbox
#[derive(Clone)]
pub struct EventOutbox {
    sender: mpsc::UnboundedSender<Event>,
}

impl EventOutbox {
    /// 발행 작업 시작
    pub fn spawn(publisher: Arc<dyn EventPublisher>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Event>();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match publisher.publish(&event).await {
                    Ok(()) => debug!(
                        "{:<12} --> 발행 완료 (aggregate={}, version={})",
                        "Outbox", event.aggregate_id, event.version
                    ),
                    // 미발행 이벤트는 projector 보정 스캔이 events 테이블에서 반영
                    Err(e) => error!(
                        "{:<12} --> 이벤트 발행 실패 id={}: {}",
                        "Outbox", event.id, e
                    ),
                }
            }
            debug!("{:<12} --> 발행 작업 종료", "Outbox");
        });
        Self { sender }
    }

    /// 저장된 이벤트를 발행 대기열에 넣는다, 발행을 기다리지 않음
    pub fn push(&self, event: Event) {
        if let Err(e) = self.sender.send(event) {
            warn!(
                "{:<12} --> 발행 작업 없음, 이벤트 id={} 미발행",
                "Outbox", e.0.id
            );
        }
    }
}
// endregion: --- Event Outbox
