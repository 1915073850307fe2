//! Database connection management
//!
//! Builds the r2d2 pool of SQLite connections; every connection is
//! configured the same way on checkout-creation.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::errors::{pool_error, Result};

pub type SqlitePool = Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Configure a connection: foreign keys, WAL, busy timeout
///
/// # Errors
///
/// Returns the SQLite error when a pragma is rejected.
pub fn configure(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

/// Build the connection pool described by `config`.
///
/// An in-memory database lives inside one connection, so `:memory:` gets a
/// single connection that is never recycled.
///
/// # Errors
///
/// `Timeout` when the initial connections cannot be established.
pub fn build_pool(config: &StoreConfig) -> Result<SqlitePool> {
    let busy_timeout = config.busy_timeout();
    let init = move |c: &mut Connection| configure(c, busy_timeout);

    if config.is_in_memory() {
        let manager = SqliteConnectionManager::memory().with_init(init);
        return Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_timeout(config.connection_timeout())
            .build(manager)
            .map_err(pool_error);
    }

    let manager = SqliteConnectionManager::file(&config.database).with_init(init);
    Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(config.connection_timeout())
        .build(manager)
        .map_err(pool_error)
}
