//! Postgres-backed [`RecordStore`].
//!
//! The pool is created once per producer run. Unlike the broker connection it is
//! never retried: a failure to create it is [`HandlerError::PoolUnavailable`].

use crate::{
    HandlerError, HandlerResult, NewOrder, NewUser, PoolConfig, RecordStore, StoreTransaction,
};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use sqlx::{Connection, Postgres, Transaction};
use std::str::FromStr;
use tracing::{debug, info};

const CREATE_USERS: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL
    )
"#;

const CREATE_ORDERS: &str = r#"
    CREATE TABLE IF NOT EXISTS orders (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id),
        product_name TEXT NOT NULL,
        quantity INTEGER NOT NULL
    )
"#;

/// Connection pool to the relational store
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Create the pool after a single connection attempt.
    ///
    /// The attempt is bounded by `acquire_timeout` and its failure is returned with
    /// the driver error as source. The same bound applies to every later checkout.
    pub async fn acquire_pool(dsn: &str, config: &PoolConfig) -> HandlerResult<Self> {
        config.validate()?;

        let options = PgConnectOptions::from_str(dsn)
            .map_err(|e| HandlerError::pool_with_source("Invalid database connection string", e))?;

        let timeout = config.acquire_timeout();
        let conn = tokio::time::timeout(timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| {
                HandlerError::pool(format!(
                    "Failed to connect to the database: no answer within {:?}",
                    timeout
                ))
            })?
            .map_err(|e| HandlerError::pool_with_source("Failed to connect to the database", e))?;

        if let Err(e) = conn.close().await {
            debug!(error = %e, "Closing the initial connection failed");
        }

        let pool = PgPoolOptions::new()
            .min_connections(config.min_size)
            .max_connections(config.max_size)
            .idle_timeout(config.max_idle())
            .acquire_timeout(timeout)
            .connect_with(options)
            .await
            .map_err(|e| HandlerError::pool_with_source("Failed to connect to the database", e))?;

        info!(
            min_size = config.min_size,
            max_size = config.max_size,
            "DB successfully connected"
        );

        Ok(Self { pool })
    }

    /// Create the pool and make sure the schema exists. The pool is closed again if
    /// the schema cannot be prepared.
    pub async fn connect(dsn: &str, config: &PoolConfig) -> HandlerResult<Self> {
        let store = Self::acquire_pool(dsn, config).await?;
        if let Err(e) = store.ensure_schema().await {
            store.pool.close().await;
            return Err(e);
        }
        Ok(store)
    }

    /// Create the `users` and `orders` tables if they do not exist
    pub async fn ensure_schema(&self) -> HandlerResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| HandlerError::pool_with_source("Failed to prepare schema", e))?;

        for statement in [CREATE_USERS, CREATE_ORDERS] {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| HandlerError::pool_with_source("Failed to prepare schema", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| HandlerError::pool_with_source("Failed to prepare schema", e))
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn begin(&self) -> HandlerResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("DB connection was closed");
    }
}

/// Transaction on one pooled connection; rolled back if dropped uncommitted
struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn insert_user(&mut self, user: &NewUser) -> HandlerResult<i64> {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id")
                .bind(&user.name)
                .bind(&user.email)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(id)
    }

    async fn insert_order(&mut self, user_id: i64, order: &NewOrder) -> HandlerResult<()> {
        sqlx::query("INSERT INTO orders (user_id, product_name, quantity) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(&order.product_name)
            .bind(order.quantity)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> HandlerResult<()> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> HandlerResult<()> {
        let this = *self;
        this.tx.rollback().await?;
        Ok(())
    }
}
