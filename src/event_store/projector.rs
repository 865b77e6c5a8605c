/// 이벤트 소비자: 저장된 이벤트를 읽기 모델(auctions, bids, 참가자, 거래 원장)에 반영
///
/// 카프카 메시지는 반영 시점을 알리는 신호로만 쓴다. 실제 반영 대상은 `events` 테이블에서
/// `projections.version` 이후의 이벤트이므로, 중복 수신은 아무것도 하지 않고
/// 발행되지 못한 이벤트는 보정 스캔이 반영한다.
// region:    --- Imports
use super::Event;
use crate::auction::events::AuctionEvent;
use crate::message_broker::{HandlerError, KafkaConsumer};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Projection Queries
const ENSURE_PROJECTION: &str =
    "INSERT INTO projections (aggregate_id, version) VALUES ($1, 0) ON CONFLICT DO NOTHING";

const LOCK_PROJECTION: &str =
    "SELECT version FROM projections WHERE aggregate_id = $1 FOR UPDATE";

const PENDING_EVENTS: &str = "SELECT id, aggregate_id, event_type, data, timestamp, version
     FROM events WHERE aggregate_id = $1 AND version > $2 ORDER BY version";

const ADVANCE_PROJECTION: &str = "UPDATE projections SET version = $2 WHERE aggregate_id = $1";

/// 읽기 모델이 이벤트 로그보다 뒤처진 경매
const LAGGING_AGGREGATES: &str = "SELECT e.aggregate_id
     FROM events e LEFT JOIN projections p ON p.aggregate_id = e.aggregate_id
     GROUP BY e.aggregate_id, p.version
     HAVING MAX(e.version) > COALESCE(p.version, 0)";

const SETTLE_AUCTION: &str =
    "UPDATE auctions SET status = 'ended', winner_id = $1, winning_price = $2, end_time = $3
     WHERE id = $4 AND status != 'ended' RETURNING id";

const INSERT_PAYMENT: &str = "INSERT INTO transactions (auction_id, user_id, amount, kind, status)
     VALUES ($1, $2, $3, 'auction_payment', 'pending')";

/// 납부 완료된 보증금 원장 기준 환불, 낙찰자 제외
const INSERT_REFUNDS: &str = "INSERT INTO transactions (auction_id, user_id, amount, kind, status)
     SELECT auction_id, user_id, amount, 'deposit_refund'::transaction_kind, 'pending'::transaction_status
     FROM transactions
     WHERE auction_id = $1 AND kind = 'deposit' AND status = 'completed'
       AND user_id IS DISTINCT FROM $2";
// endregion: --- Projection Queries

// region:    --- Event Consumer
pub struct EventConsumer {
    pool: Arc<PgPool>,
    kafka_consumer: Arc<KafkaConsumer>,
    topic: String,
}

impl EventConsumer {
    pub fn new(pool: Arc<PgPool>, kafka_consumer: Arc<KafkaConsumer>, topic: &str) -> Self {
        EventConsumer {
            pool,
            kafka_consumer,
            topic: topic.to_string(),
        }
    }

    /// 이벤트 소비 시작, 반영 실패는 소비 루프가 재시도한다
    pub async fn start(&self) {
        let pool = Arc::clone(&self.pool);
        if let Err(e) = self
            .kafka_consumer
            .consume_events(&self.topic, move |event| {
                let pool = Arc::clone(&pool);
                Box::pin(async move {
                    Self::project(&pool, event.aggregate_id)
                        .await
                        .map(|_| ())
                        .map_err(HandlerError::from)
                })
            })
            .await
        {
            error!("{:<12} --> 이벤트 소비 오류: {:?}", "EventConsume", e);
        }
    }

    /// 주기적 보정 스캔 시작
    pub fn spawn_catch_up(&self, every: Duration) {
        let pool = Arc::clone(&self.pool);
        tokio::spawn(async move {
            let mut interval = time::interval(every);
            loop {
                interval.tick().await;
                match Self::catch_up(&pool).await {
                    Ok(0) => {}
                    Ok(count) => info!(
                        "{:<12} --> 보정 스캔으로 {}개 이벤트 반영",
                        "EventConsume", count
                    ),
                    Err(e) => error!("{:<12} --> 보정 스캔 실패: {:?}", "EventConsume", e),
                }
            }
        });
    }

    /// 뒤처진 모든 경매 반영, 반영한 이벤트 수 반환
    pub async fn catch_up(pool: &PgPool) -> Result<usize, sqlx::Error> {
        let lagging = sqlx::query_scalar::<_, i64>(LAGGING_AGGREGATES)
            .fetch_all(pool)
            .await?;

        let mut total = 0;
        for aggregate_id in lagging {
            total += Self::project(pool, aggregate_id).await?;
        }
        Ok(total)
    }

    /// 경매 하나의 미반영 이벤트를 버전 순으로 한 트랜잭션에 반영
    /// projections 행 잠금으로 소비 루프와 보정 스캔이 같은 이벤트를 두 번 반영하지 않는다.
    pub async fn project(pool: &PgPool, aggregate_id: i64) -> Result<usize, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(ENSURE_PROJECTION)
            .bind(aggregate_id)
            .execute(&mut *tx)
            .await?;
        let projected = sqlx::query_scalar::<_, i64>(LOCK_PROJECTION)
            .bind(aggregate_id)
            .fetch_one(&mut *tx)
            .await?;
        let pending = sqlx::query_as::<_, Event>(PENDING_EVENTS)
            .bind(aggregate_id)
            .bind(projected)
            .fetch_all(&mut *tx)
            .await?;

        let Some(last) = pending.last().map(|e| e.version) else {
            debug!(
                "{:<12} --> 반영할 이벤트 없음 (aggregate={}, version={})",
                "EventConsume", aggregate_id, projected
            );
            return Ok(0);
        };

        for event in &pending {
            match event.decode() {
                Ok(auction_event) => {
                    info!(
                        "{:<12} --> {} (aggregate={}, version={})",
                        "EventConsume", event.event_type, event.aggregate_id, event.version
                    );
                    Self::apply(&mut tx, auction_event).await?;
                }
                // 해석할 수 없는 이벤트는 다시 읽어도 같으므로 건너뛴다
                Err(e) => warn!(
                    "{:<12} --> 이벤트 해석 실패, 건너뜀 id={}: {}",
                    "EventConsume", event.id, e
                ),
            }
        }

        sqlx::query(ADVANCE_PROJECTION)
            .bind(aggregate_id)
            .bind(last)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(pending.len())
    }

    async fn apply(
        tx: &mut Transaction<'_, Postgres>,
        auction_event: AuctionEvent,
    ) -> Result<(), sqlx::Error> {
        match auction_event {
            AuctionEvent::AuctionStarted {
                auction_id,
                started_at,
                ends_at,
            } => {
                sqlx::query(
                    "UPDATE auctions SET status = 'live', start_time = $1, end_time = $2
                     WHERE id = $3 AND status = 'verified'",
                )
                .bind(started_at)
                .bind(ends_at)
                .bind(auction_id)
                .execute(&mut **tx)
                .await?;
            }
            AuctionEvent::ParticipantJoined {
                auction_id,
                user_id,
                timestamp,
            } => {
                sqlx::query(
                    "INSERT INTO auction_participants (auction_id, user_id, joined_at)
                     VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
                )
                .bind(auction_id)
                .bind(user_id)
                .bind(timestamp)
                .execute(&mut **tx)
                .await?;
            }
            AuctionEvent::BidPlaced {
                auction_id,
                bidder_id,
                bid_amount,
                ends_at,
                timestamp,
            } => {
                Self::record_bid(tx, auction_id, bidder_id, bid_amount, timestamp).await?;

                // 더 높은 입찰만 반영
                sqlx::query(
                    "UPDATE auctions SET winning_price = $1, winner_id = $2, end_time = $3
                     WHERE id = $4 AND COALESCE(winning_price, 0) < $1",
                )
                .bind(bid_amount)
                .bind(bidder_id)
                .bind(ends_at)
                .bind(auction_id)
                .execute(&mut **tx)
                .await?;
            }
            AuctionEvent::BuyNowExecuted {
                auction_id,
                buyer_id,
                price,
                timestamp,
            } => {
                Self::record_bid(tx, auction_id, buyer_id, price, timestamp).await?;
                Self::settle(tx, auction_id, Some(buyer_id), Some(price), timestamp).await?;
            }
            AuctionEvent::AuctionClosed {
                auction_id,
                winner_id,
                winning_price,
                timestamp,
                ..
            } => {
                Self::settle(tx, auction_id, winner_id, winning_price, timestamp).await?;
            }
        }
        Ok(())
    }

    async fn record_bid(
        tx: &mut Transaction<'_, Postgres>,
        auction_id: i64,
        bidder_id: i64,
        amount: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO bids (auction_id, bidder_id, bid_amount, bid_time) VALUES ($1, $2, $3, $4)
             ON CONFLICT (auction_id, bid_amount) DO NOTHING",
        )
        .bind(auction_id)
        .bind(bidder_id)
        .bind(amount)
        .bind(timestamp)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// 경매 종료 및 정산
    /// 낙찰자: 낙찰 대금 결제 대기, 보증금을 낸 나머지 사용자: 납부액 환불 대기
    async fn settle(
        tx: &mut Transaction<'_, Postgres>,
        auction_id: i64,
        winner_id: Option<i64>,
        winning_price: Option<i64>,
        closed_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let closed = sqlx::query_scalar::<_, i64>(SETTLE_AUCTION)
            .bind(winner_id)
            .bind(winning_price)
            .bind(closed_at)
            .bind(auction_id)
            .fetch_optional(&mut **tx)
            .await?;

        if closed.is_none() {
            info!(
                "{:<12} --> 이미 종료된 경매 id: {}",
                "EventConsume", auction_id
            );
            return Ok(());
        }

        if let (Some(winner_id), Some(price)) = (winner_id, winning_price) {
            sqlx::query(INSERT_PAYMENT)
                .bind(auction_id)
                .bind(winner_id)
                .bind(price)
                .execute(&mut **tx)
                .await?;
        }

        let refunds = sqlx::query(INSERT_REFUNDS)
            .bind(auction_id)
            .bind(winner_id)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        info!(
            "{:<12} --> 경매 종료 정산 id: {}, 낙찰자: {:?}, 낙찰가: {:?}, 환불: {}건",
            "EventConsume", auction_id, winner_id, winning_price, refunds
        );
        Ok(())
    }
}
// endregion: --- Event Consumer
