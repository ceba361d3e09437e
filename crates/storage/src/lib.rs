//! SeaORM-backed storage adapters that satisfy the domain storage traits while
//! keeping the database backend swappable (SQLite by default, PostgreSQL via
//! feature flag).
//!
//! Every multi-row write runs inside one transaction or as a single
//! conditional `UPDATE`, so balances, usage counters and withdrawal states
//! stay consistent under concurrent requests.

mod account_store;
mod builder;
mod entity;
mod errors;
mod ledger_store;
mod migration;
mod promocode_store;
mod session_store;
mod withdrawal_store;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use builder::StorageBuilder;
use errors::StorageError;
use migration::run_migrations;
use rewards_domain::storage::StorageResult;
use sea_orm::{Database, DatabaseConnection};

/// Shared storage handle used by the HTTP API and operator tools.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL and ensures the schema is present.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let db = Database::connect(database_url)
            .await
            .map_err(StorageError::from_source)?;
        prepare_connection(&db).await?;
        Ok(Self::from_connection(db))
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) fn from_connection(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}

pub(crate) async fn prepare_connection(db: &DatabaseConnection) -> StorageResult<()> {
    run_migrations(db).await
}
