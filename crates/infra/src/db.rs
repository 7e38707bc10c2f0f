//! Postgres connection handle shared by the SQL-backed stores.
//!
//! The storage API is synchronous, so the handle owns a small multi-threaded tokio
//! runtime and drives every sqlx future to completion with `block_on`. Callers must
//! therefore use the Postgres backends from plain (non-async) threads.
//!
//! Synchronous code that runs between two `block_on` calls while sqlx values are alive
//! (a row store holding an open transaction around a projector) must do so under
//! [`PgHandle::enter`]: the projector may block on the handle again, and dropping a
//! pooled connection needs the runtime in context.

use std::future::Future;
use std::sync::Arc;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use tokio::runtime::{Builder, EnterGuard, Runtime};
use tokio::sync::{AcquireError, Semaphore, SemaphorePermit};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to start database runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("failed to connect to database: {0}")]
    Connect(#[from] sqlx::Error),
}

/// Connection pool plus the runtime that executes its queries.
#[derive(Debug, Clone)]
pub struct PgHandle {
    pool: PgPool,
    runtime: Arc<Runtime>,
    row_transactions: Arc<Semaphore>,
}

impl PgHandle {
    pub fn connect(database_url: &str, max_connections: u32) -> Result<Self, DbError> {
        let runtime = runtime()?;
        let pool = runtime.block_on(pool_options(max_connections).connect(database_url))?;

        tracing::info!(max_connections, "connected to postgres");
        Ok(Self::new(pool, runtime, max_connections))
    }

    /// Pool that connects on first use; nothing is contacted here.
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self, DbError> {
        let runtime = runtime()?;
        let pool = {
            let _context = runtime.enter();
            pool_options(max_connections).connect_lazy(database_url)?
        };
        Ok(Self::new(pool, runtime, max_connections))
    }

    fn new(pool: PgPool, runtime: Runtime, max_connections: u32) -> Self {
        Self {
            pool,
            runtime: Arc::new(runtime),
            row_transactions: Arc::new(Semaphore::new(pool_size(max_connections) as usize - 1)),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Drive `future` to completion on the handle's runtime.
    ///
    /// Must not be called from inside a future driven by this (or any) runtime.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Admission to open a row transaction; one pooled connection is always left for
    /// plain reads.
    pub(crate) async fn row_transaction_permit(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        self.row_transactions.acquire().await
    }

    /// Put the runtime in context without driving it.
    pub(crate) fn enter(&self) -> EnterGuard<'_> {
        self.runtime.enter()
    }
}

fn runtime() -> Result<Runtime, DbError> {
    Ok(Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("tania-db")
        .enable_all()
        .build()?)
}

/// A row transaction keeps one connection while its projector reads other views, so
/// the pool never has fewer than two.
fn pool_size(max_connections: u32) -> u32 {
    max_connections.max(2)
}

fn pool_options(max_connections: u32) -> PgPoolOptions {
    PgPoolOptions::new().max_connections(pool_size(max_connections))
}

/// SQLSTATE of a database error, if the error came from the server.
pub(crate) fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Check if an error is a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    sqlstate(err).as_deref() == Some("23505")
}


#[cfg(test)]
mod tests {
    use super::*;

    const LAZY_URL: &str = "postgres://tania@localhost/tania";

    #[test]
    fn pool_keeps_a_connection_free_for_reads() {
        let handle = PgHandle::connect_lazy(LAZY_URL, 1).unwrap();
        assert_eq!(handle.pool().options().get_max_connections(), 2);
        assert_eq!(handle.row_transactions.available_permits(), 1);

        let handle = PgHandle::connect_lazy(LAZY_URL, 5).unwrap();
        assert_eq!(handle.row_transactions.available_permits(), 4);
    }

    #[test]
    fn work_between_row_phases_may_block_on_the_handle_again() {
        let handle = PgHandle::connect_lazy(LAZY_URL, 5).unwrap();

        // Same shape as a row store: permit and lock, then a projector that reads
        // another view through the handle, then the write.
        let _context = handle.enter();
        let permit = handle.block_on(handle.row_transaction_permit()).unwrap();
        let read_during_mutation = || handle.block_on(async { 41 });
        let seen = read_during_mutation();
        let written = handle.block_on(async move { seen + 1 });
        drop(permit);

        assert_eq!(written, 42);
        assert_eq!(handle.row_transactions.available_permits(), 4);
    }
}
