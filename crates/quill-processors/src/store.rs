//! Storage abstraction for event processors.
//!
//! Processors touch a handful of aggregates (documents, revisions,
//! relationships, notifications, team counters). This trait collects
//! exactly those operations so processor logic can be tested against an
//! in-memory double; production wraps the concrete repository layer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use quill_core::{
    error::Result,
    models::{Document, Notification, NotificationKind, Revision, User},
    storage::Storage,
    DocumentId, TeamId, UserId,
};
use quill_queue::BoxFuture;

/// Storage operations required by the stateless processors.
pub trait WorkspaceStore: Send + Sync + 'static {
    /// Fetches a document by id, including soft-deleted rows.
    fn find_document(&self, id: DocumentId) -> BoxFuture<'_, Result<Option<Document>>>;

    /// The most recent revision of a document.
    fn latest_revision(&self, document_id: DocumentId)
        -> BoxFuture<'_, Result<Option<Revision>>>;

    /// Snapshots the document's current content as a new revision.
    fn create_revision(
        &self,
        document: Document,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Revision>>;

    /// Reconciles a document's outgoing backlink rows to exactly `targets`.
    fn replace_backlinks(
        &self,
        document_id: DocumentId,
        targets: Vec<DocumentId>,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Removes all backlink rows involving a document.
    fn delete_backlinks(&self, document_id: DocumentId) -> BoxFuture<'_, Result<u64>>;

    /// Non-suspended members of a team.
    fn active_team_members(&self, team_id: TeamId) -> BoxFuture<'_, Result<Vec<User>>>;

    /// Creates a notification unless an identical one exists.
    fn notify_once(
        &self,
        user_id: UserId,
        actor_id: Option<UserId>,
        document_id: Option<DocumentId>,
        kind: NotificationKind,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Notification>>;

    /// Recalculates the team's active-seat counter under a row lock.
    fn recalculate_active_users(&self, team_id: TeamId) -> BoxFuture<'_, Result<i32>>;
}

/// Production implementation over the PostgreSQL repositories.
pub struct PostgresWorkspaceStore {
    storage: Arc<Storage>,
}

impl PostgresWorkspaceStore {
    /// Creates a new adapter over the repository layer.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl WorkspaceStore for PostgresWorkspaceStore {
    fn find_document(&self, id: DocumentId) -> BoxFuture<'_, Result<Option<Document>>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.documents.find_by_id(id).await })
    }

    fn latest_revision(
        &self,
        document_id: DocumentId,
    ) -> BoxFuture<'_, Result<Option<Revision>>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.revisions.latest_for_document(document_id).await })
    }

    fn create_revision(
        &self,
        document: Document,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Revision>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.revisions.create_from_document(&document, now).await })
    }

    fn replace_backlinks(
        &self,
        document_id: DocumentId,
        targets: Vec<DocumentId>,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<()>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage.relationships.replace_for_document(document_id, &targets, now).await
        })
    }

    fn delete_backlinks(&self, document_id: DocumentId) -> BoxFuture<'_, Result<u64>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.relationships.delete_for_document(document_id).await })
    }

    fn active_team_members(&self, team_id: TeamId) -> BoxFuture<'_, Result<Vec<User>>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.users.find_active_by_team(team_id).await })
    }

    fn notify_once(
        &self,
        user_id: UserId,
        actor_id: Option<UserId>,
        document_id: Option<DocumentId>,
        kind: NotificationKind,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Notification>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage.notifications.find_or_create(user_id, actor_id, document_id, kind, now).await
        })
    }

    fn recalculate_active_users(&self, team_id: TeamId) -> BoxFuture<'_, Result<i32>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.teams.recalculate_active_users(team_id).await })
    }
}

pub mod mock {
    //! In-memory workspace for testing processors without a database.

    use std::{collections::HashMap, sync::Arc};

    use chrono::{DateTime, Utc};
    use quill_core::models::{
        Notification, NotificationId, Relationship, RelationshipId, Revision, RevisionId,
    };
    use tokio::sync::RwLock;

    use super::{
        BoxFuture, Document, DocumentId, NotificationKind, Result, TeamId, User, UserId,
        WorkspaceStore,
    };

    /// Deterministic in-memory implementation of [`WorkspaceStore`].
    #[derive(Default)]
    pub struct InMemoryWorkspace {
        documents: Arc<RwLock<HashMap<DocumentId, Document>>>,
        revisions: Arc<RwLock<Vec<Revision>>>,
        relationships: Arc<RwLock<Vec<Relationship>>>,
        notifications: Arc<RwLock<Vec<Notification>>>,
        users: Arc<RwLock<Vec<User>>>,
    }

    impl InMemoryWorkspace {
        /// Creates an empty workspace.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds a document.
        pub async fn insert_document(&self, document: Document) {
            self.documents.write().await.insert(document.id, document);
        }

        /// Updates a document's text and bumps `updated_at`, as an editor
        /// save would.
        pub async fn edit_document(&self, id: DocumentId, text: &str, now: DateTime<Utc>) {
            if let Some(doc) = self.documents.write().await.get_mut(&id) {
                doc.text = text.to_string();
                doc.updated_at = now;
            }
        }

        /// Seeds a team member.
        pub async fn insert_user(&self, user: User) {
            self.users.write().await.push(user);
        }

        /// Snapshot of all revisions, for assertions.
        pub async fn revisions(&self) -> Vec<Revision> {
            self.revisions.read().await.clone()
        }

        /// Snapshot of all relationship rows, for assertions.
        pub async fn relationships(&self) -> Vec<Relationship> {
            self.relationships.read().await.clone()
        }

        /// Snapshot of all notifications, for assertions.
        pub async fn notifications(&self) -> Vec<Notification> {
            self.notifications.read().await.clone()
        }
    }

    impl WorkspaceStore for InMemoryWorkspace {
        fn find_document(&self, id: DocumentId) -> BoxFuture<'_, Result<Option<Document>>> {
            Box::pin(async move { Ok(self.documents.read().await.get(&id).cloned()) })
        }

        fn latest_revision(
            &self,
            document_id: DocumentId,
        ) -> BoxFuture<'_, Result<Option<Revision>>> {
            Box::pin(async move {
                Ok(self
                    .revisions
                    .read()
                    .await
                    .iter()
                    .filter(|r| r.document_id == document_id)
                    .max_by_key(|r| r.created_at)
                    .cloned())
            })
        }

        fn create_revision(
            &self,
            document: Document,
            now: DateTime<Utc>,
        ) -> BoxFuture<'_, Result<Revision>> {
            Box::pin(async move {
                let revision = Revision {
                    id: RevisionId::new(),
                    document_id: document.id,
                    title: document.title.clone(),
                    text: document.text.clone(),
                    created_by: document.created_by,
                    created_at: now,
                };
                self.revisions.write().await.push(revision.clone());
                Ok(revision)
            })
        }

        fn replace_backlinks(
            &self,
            document_id: DocumentId,
            targets: Vec<DocumentId>,
            now: DateTime<Utc>,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                let mut rows = self.relationships.write().await;
                rows.retain(|r| {
                    r.document_id != document_id || targets.contains(&r.target_document_id)
                });
                for target in targets {
                    let exists = rows
                        .iter()
                        .any(|r| r.document_id == document_id && r.target_document_id == target);
                    if !exists {
                        rows.push(Relationship {
                            id: RelationshipId::new(),
                            document_id,
                            target_document_id: target,
                            created_at: now,
                        });
                    }
                }
                Ok(())
            })
        }

        fn delete_backlinks(&self, document_id: DocumentId) -> BoxFuture<'_, Result<u64>> {
            Box::pin(async move {
                let mut rows = self.relationships.write().await;
                let before = rows.len();
                rows.retain(|r| {
                    r.document_id != document_id && r.target_document_id != document_id
                });
                Ok((before - rows.len()) as u64)
            })
        }

        fn active_team_members(&self, team_id: TeamId) -> BoxFuture<'_, Result<Vec<User>>> {
            Box::pin(async move {
                Ok(self
                    .users
                    .read()
                    .await
                    .iter()
                    .filter(|u| u.team_id == team_id && u.suspended_at.is_none())
                    .cloned()
                    .collect())
            })
        }

        fn notify_once(
            &self,
            user_id: UserId,
            actor_id: Option<UserId>,
            document_id: Option<DocumentId>,
            kind: NotificationKind,
            now: DateTime<Utc>,
        ) -> BoxFuture<'_, Result<Notification>> {
            Box::pin(async move {
                let mut rows = self.notifications.write().await;
                if let Some(existing) = rows
                    .iter()
                    .find(|n| {
                        n.user_id == user_id && n.kind == kind && n.document_id == document_id
                    })
                    .cloned()
                {
                    return Ok(existing);
                }

                let notification = Notification {
                    id: NotificationId::new(),
                    user_id,
                    actor_id,
                    document_id,
                    kind,
                    created_at: now,
                };
                rows.push(notification.clone());
                Ok(notification)
            })
        }

        fn recalculate_active_users(&self, team_id: TeamId) -> BoxFuture<'_, Result<i32>> {
            Box::pin(async move {
                let count = self
                    .users
                    .read()
                    .await
                    .iter()
                    .filter(|u| u.team_id == team_id && u.suspended_at.is_none())
                    .count();
                Ok(i32::try_from(count).unwrap_or(i32::MAX))
            })
        }
    }
}
