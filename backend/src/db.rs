//! Database pool construction and storage deadlines

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};

/// Build the connection pool.
///
/// Every connection carries a server-side `statement_timeout` so a stuck
/// statement is cancelled in Postgres as well as on our side.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(&config.url)?
        .options([("statement_timeout", config.statement_timeout_ms.to_string())]);

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(options)
        .await
}

/// Run a storage operation under a deadline.
///
/// When the deadline fires the future is dropped; any open transaction inside
/// it is dropped too, which rolls it back.
pub async fn with_deadline<T, F>(limit: Duration, operation: &'static str, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "Storage deadline exceeded");
            Err(AppError::StorageTimeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_passes_result_through() {
        let result = with_deadline(Duration::from_millis(100), "noop", async { Ok::<_, AppError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_deadline_reports_timeout() {
        let result: AppResult<()> = with_deadline(Duration::from_millis(10), "sleep", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AppError::StorageTimeout)));
    }

    #[test]
    fn test_deadline_keeps_inner_error() {
        let result: AppResult<()> = tokio_test::block_on(with_deadline(Duration::from_secs(1), "fail", async {
            Err(AppError::NotFound("Product".to_string()))
        }));
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
