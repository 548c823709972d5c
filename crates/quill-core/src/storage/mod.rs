//! Database access layer implementing the repository pattern.
//!
//! The repository layer translates between domain models and the relational
//! schema owned by the wider application. Workers never issue SQL outside
//! this module; each aggregate gets one repository, and multi-row mutations
//! that must stay consistent run inside an explicit transaction obtained
//! from [`Storage::begin`].

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};

pub mod attachments;
pub mod collections;
pub mod documents;
pub mod file_operations;
pub mod imports;
pub mod notifications;
pub mod relationships;
pub mod revisions;
pub mod teams;
pub mod users;
pub mod webhook_deliveries;
pub mod webhook_subscriptions;

use crate::error::Result;

/// Container for all repository instances providing unified database access.
#[derive(Clone)]
pub struct Storage {
    /// Repository for document operations.
    pub documents: Arc<documents::Repository>,

    /// Repository for collection operations.
    pub collections: Arc<collections::Repository>,

    /// Repository for team aggregate operations.
    pub teams: Arc<teams::Repository>,

    /// Repository for user lookups.
    pub users: Arc<users::Repository>,

    /// Repository for document revision snapshots.
    pub revisions: Arc<revisions::Repository>,

    /// Repository for document relationship (backlink) rows.
    pub relationships: Arc<relationships::Repository>,

    /// Repository for in-app notifications.
    pub notifications: Arc<notifications::Repository>,

    /// Repository for webhook subscriptions.
    pub webhook_subscriptions: Arc<webhook_subscriptions::Repository>,

    /// Repository for webhook delivery audit rows.
    pub webhook_deliveries: Arc<webhook_deliveries::Repository>,

    /// Repository for import jobs.
    pub imports: Arc<imports::Repository>,

    /// Repository for export file operations.
    pub file_operations: Arc<file_operations::Repository>,

    /// Repository for attachment blobs.
    pub attachments: Arc<attachments::Repository>,
}

impl Storage {
    /// Creates a new storage instance over a shared connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            documents: Arc::new(documents::Repository::new(pool.clone())),
            collections: Arc::new(collections::Repository::new(pool.clone())),
            teams: Arc::new(teams::Repository::new(pool.clone())),
            users: Arc::new(users::Repository::new(pool.clone())),
            revisions: Arc::new(revisions::Repository::new(pool.clone())),
            relationships: Arc::new(relationships::Repository::new(pool.clone())),
            notifications: Arc::new(notifications::Repository::new(pool.clone())),
            webhook_subscriptions: Arc::new(webhook_subscriptions::Repository::new(pool.clone())),
            webhook_deliveries: Arc::new(webhook_deliveries::Repository::new(pool.clone())),
            imports: Arc::new(imports::Repository::new(pool.clone())),
            file_operations: Arc::new(file_operations::Repository::new(pool.clone())),
            attachments: Arc::new(attachments::Repository::new(pool)),
        }
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.documents.pool()
    }

    /// Begins a transaction for multi-repository writes.
    ///
    /// # Errors
    ///
    /// Returns error if a connection cannot be acquired.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool().begin().await?)
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.pool()).await?;
        Ok(())
    }
}
