use crate::config::Config;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::info;

const SCRIPTS: [(&str, &str); 2] = [
    (
        "00-recreate-db.sql",
        include_str!("../../sql/00-recreate-db.sql"),
    ),
    (
        "01-create-schema.sql",
        include_str!("../../sql/01-create-schema.sql"),
    ),
];

pub struct DatabaseManager {
    pub pool: Arc<PgPool>,
}

impl DatabaseManager {
    /// 데이터베이스 매니저 생성
    pub async fn new(config: &Config) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;
        info!(
            "{:<12} --> 커넥션 풀 생성 (max={})",
            "Database", config.database_max_connections
        );
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// 첫 쿼리 시점에 연결하는 매니저 생성
    pub fn connect_lazy(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new().connect_lazy(database_url)?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// 데이터베이스 풀 가져오기
    pub fn get_pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    /// 트랜잭션 실행
    pub async fn transaction<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: for<'c> FnOnce(
            &'c mut sqlx::Transaction<'_, sqlx::Postgres>,
        ) -> Pin<Box<dyn Future<Output = Result<R, E>> + Send + 'c>>,
        E: From<sqlx::Error>,
    {
        let mut tx = self.pool.begin().await?;
        let result = f(&mut tx).await;
        match result {
            Ok(r) => {
                tx.commit().await?;
                Ok(r)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// 스키마 재생성 (sql/ 스크립트를 한 트랜잭션에서 실행)
    pub async fn initialize_database(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for (name, script) in SCRIPTS {
            let count = execute_statements(&mut tx, script).await?;
            info!("{:<12} --> {} 실행 ({}개 구문)", "Database", name, count);
        }
        tx.commit().await
    }
}

/// 세미콜론으로 구분된 구문을 순서대로 실행, 실행한 구문 수 반환
async fn execute_statements(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    script: &str,
) -> Result<usize, sqlx::Error> {
    let mut count = 0;
    for statement in script.split(';').map(str::trim) {
        if statement.is_empty() {
            continue;
        }
        sqlx::query(statement).execute(&mut **tx).await?;
        count += 1;
    }
    Ok(count)
}
