/// 보증금 게이트
/// 보증금을 납부한 사용자만 진행 중인 경매에 참가할 수 있다.
// region:    --- Imports
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

// endregion: --- Imports

// region:    --- Deposit Error
#[derive(Debug, Error)]
pub enum DepositError {
    #[error("이미 보증금을 납부했습니다.")]
    AlreadyPaid,

    #[error("보증금 원장 오류: {0}")]
    Database(#[from] sqlx::Error),
}
// endregion: --- Deposit Error

// region:    --- Deposit Ledger
#[async_trait]
pub trait DepositLedger: Send + Sync {
    async fn has_deposit(&self, auction_id: i64, user_id: i64) -> Result<bool, DepositError>;

    async fn record_deposit(
        &self,
        auction_id: i64,
        user_id: i64,
        amount: i64,
    ) -> Result<(), DepositError>;
}

/// 거래 원장(transactions) 기반 보증금 장부
pub struct PostgresDepositLedger {
    pool: Arc<PgPool>,
}

impl PostgresDepositLedger {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DepositLedger for PostgresDepositLedger {
    async fn has_deposit(&self, auction_id: i64, user_id: i64) -> Result<bool, DepositError> {
        let paid = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                SELECT 1 FROM transactions
                WHERE auction_id = $1 AND user_id = $2 AND kind = 'deposit' AND status = 'completed'
            )",
        )
        .bind(auction_id)
        .bind(user_id)
        .fetch_one(&*self.pool)
        .await?;
        Ok(paid)
    }

    async fn record_deposit(
        &self,
        auction_id: i64,
        user_id: i64,
        amount: i64,
    ) -> Result<(), DepositError> {
        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO transactions (auction_id, user_id, amount, kind, status)
             VALUES ($1, $2, $3, 'deposit', 'completed')
             ON CONFLICT (auction_id, user_id) WHERE kind = 'deposit' DO NOTHING
             RETURNING id",
        )
        .bind(auction_id)
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&*self.pool)
        .await?;

        match inserted {
            Some(id) => {
                info!(
                    "{:<12} --> 보증금 납부 기록 id: {}, 경매: {}, 사용자: {}",
                    "Deposit", id, auction_id, user_id
                );
                Ok(())
            }
            None => Err(DepositError::AlreadyPaid),
        }
    }
}

/// 메모리 보증금 장부 (테스트 및 로컬 실행용)
#[derive(Default)]
pub struct InMemoryDepositLedger {
    deposits: Mutex<HashMap<(i64, i64), i64>>,
}

impl InMemoryDepositLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DepositLedger for InMemoryDepositLedger {
    async fn has_deposit(&self, auction_id: i64, user_id: i64) -> Result<bool, DepositError> {
        Ok(self
            .deposits
            .lock()
            .await
            .contains_key(&(auction_id, user_id)))
    }

    async fn record_deposit(
        &self,
        auction_id: i64,
        user_id: i64,
        amount: i64,
    ) -> Result<(), DepositError> {
        let mut deposits = self.deposits.lock().await;
        if deposits.contains_key(&(auction_id, user_id)) {
            return Err(DepositError::AlreadyPaid);
        }
        deposits.insert((auction_id, user_id), amount);
        Ok(())
    }
}
// endregion: --- Deposit Ledger

// region:    --- Checkout
/// 결제 페이지 URL
pub fn checkout_url(base: &str, auction_id: i64, user_id: i64, amount: i64) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!(
        "{}{}type=deposit&auction_id={}&user_id={}&amount={}",
        base.trim_end_matches('/'),
        separator,
        auction_id,
        user_id,
        amount
    )
}
// endregion: --- Checkout
