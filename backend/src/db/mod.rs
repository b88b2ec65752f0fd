pub mod codec;
pub mod memory;
pub mod schema;

use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::{Any, AnyPool, Transaction};

use crate::booking::repository::BookingRepository;
use crate::booking::repository_sqlx::SqlxBookingRepository;
use crate::event::repository::EventRepository;
use crate::event::repository_sqlx::SqlxEventRepository;
use crate::user::repository::UserRepository;
use crate::user::repository_sqlx::SqlxUserRepository;

/// Transaction over the pooled `Any` driver.
pub type SqlxTx = Transaction<'static, Any>;

/// Explicit transaction scope handed to every repository call that must be
/// part of one atomic unit.
///
/// There is no `rollback`: dropping a `Tx` without committing discards its
/// writes and releases its locks. Dropping an in-flight operation therefore
/// rolls it back.
#[async_trait]
pub trait UnitOfWork: Send + Sync + 'static {
    type Tx: Send + 'static;

    async fn begin(&self) -> anyhow::Result<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> anyhow::Result<()>;
}

/// SQL flavour behind the `Any` pool. Decides how the event row lock is taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn from_url(url: &str) -> anyhow::Result<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Dialect::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Dialect::Sqlite)
        } else {
            bail!("unsupported database url scheme: {url}")
        }
    }
}

#[derive(Clone)]
pub struct Db {
    pub pool: AnyPool,
    pub dialect: Dialect,
}

impl Db {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let dialect = Dialect::from_url(database_url)?;

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("failed to connect to {dialect:?} database"))?;

        Ok(Self { pool, dialect })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        schema::migrate(&self.pool).await
    }
}

#[async_trait]
impl UnitOfWork for Db {
    type Tx = SqlxTx;

    async fn begin(&self) -> anyhow::Result<SqlxTx> {
        self.pool.begin().await.context("failed to begin transaction")
    }

    async fn commit(&self, tx: SqlxTx) -> anyhow::Result<()> {
        tx.commit().await.context("failed to commit transaction")
    }
}

/// Everything the engine reads and writes through, sharing one transaction type.
pub struct Repositories<U: UnitOfWork> {
    pub db: Arc<U>,
    pub events: Arc<dyn EventRepository<U::Tx>>,
    pub bookings: Arc<dyn BookingRepository<U::Tx>>,
    pub users: Arc<dyn UserRepository>,
}

impl<U: UnitOfWork> Clone for Repositories<U> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            events: Arc::clone(&self.events),
            bookings: Arc::clone(&self.bookings),
            users: Arc::clone(&self.users),
        }
    }
}

impl Repositories<Db> {
    pub fn sqlx(db: Db) -> Self {
        Self {
            events: Arc::new(SqlxEventRepository::new(db.pool.clone(), db.dialect)),
            bookings: Arc::new(SqlxBookingRepository::new(db.pool.clone())),
            users: Arc::new(SqlxUserRepository::new(db.pool.clone())),
            db: Arc::new(db),
        }
    }
}

impl Repositories<memory::MemoryStore> {
    pub fn memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            events: store.clone(),
            bookings: store.clone(),
            users: store.clone(),
            db: store,
        }
    }
}
