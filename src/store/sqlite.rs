//! SQLite registry
//!
//! One table, keyed by contract address. Counts are stored as decimal
//! TEXT because they routinely exceed SQLite's 64-bit INTEGER.
//! rusqlite is blocking, so every statement runs on the blocking pool.

use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::{registry_key, TokenRegistry};
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::TokenRecord;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tokens (
    contract_address TEXT PRIMARY KEY,
    last_count       TEXT NOT NULL,
    updated_at       INTEGER NOT NULL
);
";

#[derive(Clone)]
pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRegistry {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            AppError::with_source(
                ErrorCode::StoreUnavailable,
                format!("Cannot open {}", path.display()),
                e,
            )
        })?;
        info!("💾 SQLite registry at {}", path.display());
        Self::init(conn)
    }

    /// Private in-memory database
    pub fn in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| AppError::store_unavailable("SQLite connection mutex poisoned"))?;
            f(&guard)
        })
        .await
        .map_err(|e| AppError::store_unavailable(format!("Blocking task failed: {}", e)))?
    }
}

fn row_to_record(address: String, count: String, updated_at: i64) -> AppResult<TokenRecord> {
    let last_count = count
        .parse::<U256>()
        .map_err(|_| AppError::corrupt_record(format!("{}: bad count {:?}", address, count)))?;
    let updated_at = Utc
        .timestamp_opt(updated_at, 0)
        .single()
        .ok_or_else(|| AppError::corrupt_record(format!("{}: bad timestamp {}", address, updated_at)))?;
    Ok(TokenRecord {
        contract_address: address,
        last_count,
        updated_at,
    })
}

#[async_trait]
impl TokenRegistry for SqliteRegistry {
    async fn find(&self, address: &str) -> AppResult<Option<TokenRecord>> {
        let key = registry_key(address);
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT contract_address, last_count, updated_at FROM tokens WHERE contract_address = ?1",
                    params![key],
                    |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?)),
                )
                .optional()?;
            row.map(|(a, c, t)| row_to_record(a, c, t)).transpose()
        })
        .await
    }

    async fn upsert(&self, address: &str, count: U256) -> AppResult<()> {
        let key = registry_key(address);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tokens (contract_address, last_count, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(contract_address) DO UPDATE SET
                    last_count = excluded.last_count,
                    updated_at = excluded.updated_at",
                params![key, count.to_string(), Utc::now().timestamp()],
            )?;
            debug!("💾 UPSERT: {} = {}", key, count);
            Ok(())
        })
        .await
    }

    async fn len(&self) -> AppResult<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM tokens", [], |r| r.get(0))?;
            Ok(n as usize)
        })
        .await
    }
}
