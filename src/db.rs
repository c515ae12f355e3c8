use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, IsolationLevel, Statement,
    TransactionTrait,
};
use tokio::fs;

use crate::error::{AppError, AppResult};

/// Create a SeaORM connection.
pub async fn create_orm_conn(database_url: &str) -> Result<DatabaseConnection> {
    let conn = Database::connect(database_url).await?;
    Ok(conn)
}

/// Minimal migration runner that executes SQL files in `migrations/` in filename order.
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    let mut entries = fs::read_dir("migrations").await?;
    let mut files: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let backend = conn.get_database_backend();
    for file in files {
        let sql = fs::read_to_string(&file).await?;
        // Postgres prepared statements cannot contain multiple commands,
        // so split the migration file and run each statement individually.
        for stmt in sql.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            let statement = format!("{stmt};");
            conn.execute(Statement::from_string(backend, statement))
                .await?;
        }
    }

    Ok(())
}

type TxFuture<'a, T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>;

const RETRY_BACKOFF_MS: [u64; 3] = [20, 100, 500];

/// Run `op` inside a serializable transaction. Serialization failures
/// (SQLSTATE 40001) roll the transaction back and retry the whole closure,
/// up to three attempts with 20/100/500 ms backoff plus jitter; exhaustion
/// surfaces as `Conflict`.
pub async fn serializable<T, F>(conn: &DatabaseConnection, mut op: F) -> AppResult<T>
where
    F: for<'c> FnMut(&'c DatabaseTransaction) -> TxFuture<'c, T>,
{
    let mut attempt: usize = 0;
    loop {
        let txn = conn
            .begin_with_config(Some(IsolationLevel::Serializable), None)
            .await?;

        let err = match op(&txn).await {
            Ok(value) => match txn.commit().await {
                Ok(()) => return Ok(value),
                Err(err) => AppError::Db(err),
            },
            Err(err) => {
                let _ = txn.rollback().await;
                err
            }
        };
        // Callers translate expected unique violations into domain errors
        // before returning, so a raw 23505 reaching this point is a
        // row-creation race (two transactions seeding the same counter row)
        // and retries like a serialization failure.
        let retryable = err.is_serialization_conflict() || err.is_unique_violation();

        if retryable && attempt < RETRY_BACKOFF_MS.len() {
            let base = RETRY_BACKOFF_MS[attempt];
            let jitter = rand::thread_rng().gen_range(0..=base / 2);
            tracing::debug!(attempt, backoff_ms = base + jitter, "transaction conflict, retrying");
            tokio::time::sleep(Duration::from_millis(base + jitter)).await;
            attempt += 1;
            continue;
        }

        if retryable {
            return Err(AppError::Conflict("transaction retry limit reached".into()));
        }
        return Err(err);
    }
}
