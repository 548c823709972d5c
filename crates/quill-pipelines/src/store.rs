//! Storage abstractions for the import/export pipelines.
//!
//! [`PipelineStore`] methods are transactional units: `persist_collection`
//! writes one batch atomically, and `finalize_import` couples the last
//! content writes with the parent state advance in the same transaction, so
//! the parent state and its children are never observably inconsistent.
//! [`FileStore`] is the narrow interface to blob storage; upload mechanics
//! live behind it.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use quill_core::{
    error::{CoreError, Result},
    models::{
        Attachment, Collection, Document, FileOperation, Import, NotificationKind,
    },
    partition::KeyRange,
    storage::Storage,
    FileOperationId, FileOperationState, ImportId, ImportState, TeamId, UserId,
};
use quill_queue::BoxFuture;

use crate::manifest::{substitute_placeholders, CollectionInput};

/// Storage operations required by the pipeline tasks.
pub trait PipelineStore: Send + Sync + 'static {
    /// Fetches an import by id.
    fn find_import(&self, id: ImportId) -> BoxFuture<'_, Result<Option<Import>>>;

    /// Advances the import state machine (compare-and-set; already-there is
    /// success).
    fn transition_import(
        &self,
        id: ImportId,
        from: ImportState,
        to: ImportState,
    ) -> BoxFuture<'_, Result<()>>;

    /// Moves an import to `Errored` with a truncated message.
    fn set_import_errored(&self, id: ImportId, message: String) -> BoxFuture<'_, Result<()>>;

    /// Persists one collection and its documents in a single transaction,
    /// find-or-create keyed by external id. Returns the import's total
    /// document count afterwards.
    fn persist_collection(
        &self,
        import: Import,
        batch: CollectionInput,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<i32>>;

    /// All documents created by an import.
    fn imported_documents(&self, import_id: ImportId) -> BoxFuture<'_, Result<Vec<Document>>>;

    /// Substitutes link placeholders across the import's documents and
    /// advances `InProgress -> Completed` in the same transaction.
    fn finalize_import(
        &self,
        import_id: ImportId,
        resolved: HashMap<String, String>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Attachment blobs created by an import (for failure cleanup).
    fn import_attachments(&self, import_id: ImportId)
        -> BoxFuture<'_, Result<Vec<Attachment>>>;

    /// Deletes the attachment rows of an import. Returns rows removed.
    fn delete_import_attachments(&self, import_id: ImportId) -> BoxFuture<'_, Result<u64>>;

    /// Fetches a file operation by id.
    fn find_file_operation(
        &self,
        id: FileOperationId,
    ) -> BoxFuture<'_, Result<Option<FileOperation>>>;

    /// Advances the file operation state machine.
    fn transition_file_operation(
        &self,
        id: FileOperationId,
        from: FileOperationState,
        to: FileOperationState,
    ) -> BoxFuture<'_, Result<()>>;

    /// Records the uploaded size and completes the operation.
    fn complete_file_operation(
        &self,
        id: FileOperationId,
        size: i64,
    ) -> BoxFuture<'_, Result<()>>;

    /// Moves a file operation to `Error` with a truncated message.
    fn set_file_operation_errored(
        &self,
        id: FileOperationId,
        message: String,
    ) -> BoxFuture<'_, Result<()>>;

    /// Everything a team export should contain.
    fn export_content(
        &self,
        team_id: TeamId,
    ) -> BoxFuture<'_, Result<(Vec<Collection>, Vec<Document>)>>;

    /// Creates a pipeline outcome notification unless one exists.
    fn notify_user(
        &self,
        user_id: UserId,
        kind: NotificationKind,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Purges soft-deleted documents older than `cutoff`, optionally within
    /// a key-range partition. Returns rows removed.
    fn purge_deleted_documents(
        &self,
        range: Option<KeyRange>,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64>>;
}

/// Narrow interface to blob storage for staged uploads and archives.
pub trait FileStore: Send + Sync + 'static {
    /// Reads a blob.
    fn read(&self, key: &str) -> BoxFuture<'_, Result<Vec<u8>>>;

    /// Writes a blob, replacing any existing content. Returns bytes written.
    fn write(&self, key: &str, bytes: Vec<u8>) -> BoxFuture<'_, Result<u64>>;

    /// Deletes a blob. Missing blobs are not an error.
    fn delete(&self, key: &str) -> BoxFuture<'_, Result<()>>;
}

/// Production implementation over the PostgreSQL repositories.
pub struct PostgresPipelineStore {
    storage: Arc<Storage>,
}

impl PostgresPipelineStore {
    /// Creates a new adapter over the repository layer.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl PipelineStore for PostgresPipelineStore {
    fn find_import(&self, id: ImportId) -> BoxFuture<'_, Result<Option<Import>>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.imports.find_by_id(id).await })
    }

    fn transition_import(
        &self,
        id: ImportId,
        from: ImportState,
        to: ImportState,
    ) -> BoxFuture<'_, Result<()>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.imports.transition(id, from, to).await })
    }

    fn set_import_errored(&self, id: ImportId, message: String) -> BoxFuture<'_, Result<()>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.imports.set_errored(id, &message).await })
    }

    fn persist_collection(
        &self,
        import: Import,
        batch: CollectionInput,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<i32>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            let mut tx = storage.begin().await?;

            let collection = storage
                .collections
                .find_or_create_in_tx(
                    &mut tx,
                    import.team_id,
                    import.id,
                    &batch.external_id,
                    &batch.name,
                    import.created_by,
                    now,
                )
                .await?;

            for document in &batch.documents {
                storage
                    .documents
                    .find_or_create_in_tx(
                        &mut tx,
                        import.team_id,
                        collection.id,
                        import.id,
                        &document.external_id,
                        &document.title,
                        &document.text,
                        import.created_by,
                        now,
                    )
                    .await?;
            }

            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM documents WHERE import_id = $1")
                    .bind(import.id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(CoreError::from)?;
            let count = i32::try_from(count).unwrap_or(i32::MAX);
            storage.imports.set_document_count_in_tx(&mut tx, import.id, count).await?;

            tx.commit().await.map_err(CoreError::from)?;

            Ok(count)
        })
    }

    fn imported_documents(&self, import_id: ImportId) -> BoxFuture<'_, Result<Vec<Document>>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.documents.find_by_import(import_id).await })
    }

    fn finalize_import(
        &self,
        import_id: ImportId,
        resolved: HashMap<String, String>,
    ) -> BoxFuture<'_, Result<()>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            let documents = storage.documents.find_by_import(import_id).await?;
            let mut tx = storage.begin().await?;

            for document in &documents {
                let substituted = substitute_placeholders(&document.text, &resolved);
                if substituted != document.text {
                    storage.documents.update_text_in_tx(&mut tx, document.id, &substituted).await?;
                }
            }

            // Same transaction as the final writes: a reader never sees a
            // Completed import with unresolved content.
            storage
                .imports
                .transition_in_tx(&mut tx, import_id, ImportState::InProgress, ImportState::Completed)
                .await?;

            tx.commit().await.map_err(CoreError::from)?;
            Ok(())
        })
    }

    fn import_attachments(
        &self,
        import_id: ImportId,
    ) -> BoxFuture<'_, Result<Vec<Attachment>>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.attachments.find_by_import(import_id).await })
    }

    fn delete_import_attachments(&self, import_id: ImportId) -> BoxFuture<'_, Result<u64>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.attachments.delete_by_import(import_id).await })
    }

    fn find_file_operation(
        &self,
        id: FileOperationId,
    ) -> BoxFuture<'_, Result<Option<FileOperation>>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.file_operations.find_by_id(id).await })
    }

    fn transition_file_operation(
        &self,
        id: FileOperationId,
        from: FileOperationState,
        to: FileOperationState,
    ) -> BoxFuture<'_, Result<()>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.file_operations.transition(id, from, to).await })
    }

    fn complete_file_operation(
        &self,
        id: FileOperationId,
        size: i64,
    ) -> BoxFuture<'_, Result<()>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.file_operations.complete(id, size).await })
    }

    fn set_file_operation_errored(
        &self,
        id: FileOperationId,
        message: String,
    ) -> BoxFuture<'_, Result<()>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.file_operations.set_errored(id, &message).await })
    }

    fn export_content(
        &self,
        team_id: TeamId,
    ) -> BoxFuture<'_, Result<(Vec<Collection>, Vec<Document>)>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            let collections = storage.collections.find_for_export(team_id).await?;
            let documents = storage.documents.find_for_export(team_id).await?;
            Ok((collections, documents))
        })
    }

    fn notify_user(
        &self,
        user_id: UserId,
        kind: NotificationKind,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<()>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage.notifications.find_or_create(user_id, None, None, kind, now).await.map(|_| ())
        })
    }

    fn purge_deleted_documents(
        &self,
        range: Option<KeyRange>,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.documents.purge_deleted(range, cutoff).await })
    }
}

/// Blob storage on the local filesystem.
///
/// Deployments with object storage put an equivalent adapter behind
/// [`FileStore`]; the pipelines only ever see keys and bytes.
pub struct LocalFileStore {
    root: std::path::PathBuf,
}

impl LocalFileStore {
    /// Creates a store rooted at the given directory.
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> std::path::PathBuf {
        // Keys are internal (import/export job keys), never user input, but
        // normalize anyway so a stray separator cannot escape the root.
        let sanitized: String =
            key.chars().map(|c| if c == '/' || c == '\\' { '_' } else { c }).collect();
        self.root.join(sanitized)
    }
}

impl FileStore for LocalFileStore {
    fn read(&self, key: &str) -> BoxFuture<'_, Result<Vec<u8>>> {
        let path = self.path_for(key);
        Box::pin(async move {
            tokio::fs::read(&path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CoreError::NotFound(format!("file {} not found", path.display()))
                } else {
                    CoreError::Database(format!("file read failed: {e}"))
                }
            })
        })
    }

    fn write(&self, key: &str, bytes: Vec<u8>) -> BoxFuture<'_, Result<u64>> {
        let path = self.path_for(key);
        Box::pin(async move {
            let size = bytes.len() as u64;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CoreError::Database(format!("file write failed: {e}")))?;
            }
            tokio::fs::write(&path, bytes)
                .await
                .map_err(|e| CoreError::Database(format!("file write failed: {e}")))?;
            Ok(size)
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<()>> {
        let path = self.path_for(key);
        Box::pin(async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(CoreError::Database(format!("file delete failed: {e}"))),
            }
        })
    }
}

pub mod mock {
    //! In-memory pipeline and file stores for tests.

    use std::{collections::HashMap, sync::Arc};

    use chrono::{DateTime, Utc};
    use quill_core::models::{CollectionId, DocumentId, Notification, NotificationId};
    use tokio::sync::RwLock;

    use super::{
        Attachment, Collection, CollectionInput, CoreError, Document, FileOperation,
        FileOperationId, FileOperationState, FileStore, Import, ImportId, ImportState, KeyRange,
        NotificationKind, PipelineStore, Result, TeamId, UserId,
    };
    use crate::manifest::substitute_placeholders;
    use quill_queue::BoxFuture;

    /// Deterministic in-memory implementation of [`PipelineStore`].
    #[derive(Default)]
    pub struct InMemoryPipelineStore {
        imports: Arc<RwLock<HashMap<ImportId, Import>>>,
        file_operations: Arc<RwLock<HashMap<FileOperationId, FileOperation>>>,
        collections: Arc<RwLock<Vec<Collection>>>,
        documents: Arc<RwLock<Vec<Document>>>,
        attachments: Arc<RwLock<Vec<Attachment>>>,
        notifications: Arc<RwLock<Vec<Notification>>>,
        fail_persist_for: Arc<RwLock<Option<String>>>,
    }

    impl InMemoryPipelineStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds an import row.
        pub async fn insert_import(&self, import: Import) {
            self.imports.write().await.insert(import.id, import);
        }

        /// Seeds a file operation row.
        pub async fn insert_file_operation(&self, operation: FileOperation) {
            self.file_operations.write().await.insert(operation.id, operation);
        }

        /// Seeds exportable content.
        pub async fn insert_collection(&self, collection: Collection) {
            self.collections.write().await.push(collection);
        }

        /// Seeds an exportable/purgeable document.
        pub async fn insert_document(&self, document: Document) {
            self.documents.write().await.push(document);
        }

        /// Seeds an attachment row.
        pub async fn insert_attachment(&self, attachment: Attachment) {
            self.attachments.write().await.push(attachment);
        }

        /// Makes `persist_collection` fail for the named external id, to
        /// exercise the abort path.
        pub async fn fail_persist_for(&self, external_id: &str) {
            *self.fail_persist_for.write().await = Some(external_id.to_string());
        }

        /// Current state of an import.
        pub async fn import_state(&self, id: ImportId) -> Option<ImportState> {
            self.imports.read().await.get(&id).map(|i| i.state)
        }

        /// Current state of a file operation.
        pub async fn file_operation(&self, id: FileOperationId) -> Option<FileOperation> {
            self.file_operations.read().await.get(&id).cloned()
        }

        /// Snapshot of all documents.
        pub async fn documents(&self) -> Vec<Document> {
            self.documents.read().await.clone()
        }

        /// Snapshot of all collections.
        pub async fn collections(&self) -> Vec<Collection> {
            self.collections.read().await.clone()
        }

        /// Snapshot of notifications.
        pub async fn notifications(&self) -> Vec<Notification> {
            self.notifications.read().await.clone()
        }

        /// Snapshot of attachments.
        pub async fn attachments(&self) -> Vec<Attachment> {
            self.attachments.read().await.clone()
        }
    }

    impl PipelineStore for InMemoryPipelineStore {
        fn find_import(&self, id: ImportId) -> BoxFuture<'_, Result<Option<Import>>> {
            Box::pin(async move { Ok(self.imports.read().await.get(&id).cloned()) })
        }

        fn transition_import(
            &self,
            id: ImportId,
            from: ImportState,
            to: ImportState,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                let mut imports = self.imports.write().await;
                let Some(import) = imports.get_mut(&id) else {
                    return Err(CoreError::NotFound(format!("import {id} not found")));
                };
                if import.state == to {
                    return Ok(());
                }
                if import.state != from {
                    return Err(CoreError::InvalidTransition {
                        entity: "import",
                        from: import.state.to_string(),
                        to: to.to_string(),
                    });
                }
                import.state = to;
                Ok(())
            })
        }

        fn set_import_errored(&self, id: ImportId, message: String) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                if let Some(import) = self.imports.write().await.get_mut(&id) {
                    if import.state != ImportState::Errored {
                        import.state = ImportState::Errored;
                        import.error = Some(quill_core::models::truncate_error(&message));
                    }
                }
                Ok(())
            })
        }

        fn persist_collection(
            &self,
            import: Import,
            batch: CollectionInput,
            now: DateTime<Utc>,
        ) -> BoxFuture<'_, Result<i32>> {
            Box::pin(async move {
                if self.fail_persist_for.read().await.as_deref() == Some(&*batch.external_id) {
                    // Simulated mid-batch persistence failure: the whole
                    // "transaction" aborts, nothing from this batch lands.
                    return Err(CoreError::Database(format!(
                        "simulated failure persisting {}",
                        batch.external_id
                    )));
                }

                let mut collections = self.collections.write().await;
                let collection = match collections.iter().find(|c| {
                    c.import_id == Some(import.id)
                        && c.source_id.as_deref() == Some(&*batch.external_id)
                }) {
                    Some(existing) => existing.clone(),
                    None => {
                        let collection = Collection {
                            id: CollectionId::new(),
                            team_id: import.team_id,
                            name: batch.name.clone(),
                            source_id: Some(batch.external_id.clone()),
                            import_id: Some(import.id),
                            created_by: import.created_by,
                            created_at: now,
                            deleted_at: None,
                        };
                        collections.push(collection.clone());
                        collection
                    },
                };
                drop(collections);

                let mut documents = self.documents.write().await;
                for input in &batch.documents {
                    let exists = documents.iter().any(|d| {
                        d.import_id == Some(import.id)
                            && d.source_id.as_deref() == Some(&*input.external_id)
                    });
                    if !exists {
                        documents.push(Document {
                            id: DocumentId::new(),
                            team_id: import.team_id,
                            collection_id: collection.id,
                            title: input.title.clone(),
                            text: input.text.clone(),
                            source_id: Some(input.external_id.clone()),
                            import_id: Some(import.id),
                            created_by: import.created_by,
                            published_at: None,
                            deleted_at: None,
                            created_at: now,
                            updated_at: now,
                        });
                    }
                }
                let count = documents.iter().filter(|d| d.import_id == Some(import.id)).count();
                drop(documents);

                if let Some(row) = self.imports.write().await.get_mut(&import.id) {
                    row.document_count = i32::try_from(count).unwrap_or(i32::MAX);
                }

                Ok(i32::try_from(count).unwrap_or(i32::MAX))
            })
        }

        fn imported_documents(
            &self,
            import_id: ImportId,
        ) -> BoxFuture<'_, Result<Vec<Document>>> {
            Box::pin(async move {
                Ok(self
                    .documents
                    .read()
                    .await
                    .iter()
                    .filter(|d| d.import_id == Some(import_id))
                    .cloned()
                    .collect())
            })
        }

        fn finalize_import(
            &self,
            import_id: ImportId,
            resolved: HashMap<String, String>,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                {
                    let mut documents = self.documents.write().await;
                    for document in
                        documents.iter_mut().filter(|d| d.import_id == Some(import_id))
                    {
                        document.text = substitute_placeholders(&document.text, &resolved);
                    }
                }
                self.transition_import(import_id, ImportState::InProgress, ImportState::Completed)
                    .await
            })
        }

        fn import_attachments(
            &self,
            import_id: ImportId,
        ) -> BoxFuture<'_, Result<Vec<Attachment>>> {
            Box::pin(async move {
                Ok(self
                    .attachments
                    .read()
                    .await
                    .iter()
                    .filter(|a| a.import_id == Some(import_id))
                    .cloned()
                    .collect())
            })
        }

        fn delete_import_attachments(&self, import_id: ImportId) -> BoxFuture<'_, Result<u64>> {
            Box::pin(async move {
                let mut attachments = self.attachments.write().await;
                let before = attachments.len();
                attachments.retain(|a| a.import_id != Some(import_id));
                Ok((before - attachments.len()) as u64)
            })
        }

        fn find_file_operation(
            &self,
            id: FileOperationId,
        ) -> BoxFuture<'_, Result<Option<FileOperation>>> {
            Box::pin(async move { Ok(self.file_operations.read().await.get(&id).cloned()) })
        }

        fn transition_file_operation(
            &self,
            id: FileOperationId,
            from: FileOperationState,
            to: FileOperationState,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                let mut operations = self.file_operations.write().await;
                let Some(operation) = operations.get_mut(&id) else {
                    return Err(CoreError::NotFound(format!("file operation {id} not found")));
                };
                if operation.state == to {
                    return Ok(());
                }
                if operation.state != from {
                    return Err(CoreError::InvalidTransition {
                        entity: "file_operation",
                        from: operation.state.to_string(),
                        to: to.to_string(),
                    });
                }
                operation.state = to;
                Ok(())
            })
        }

        fn complete_file_operation(
            &self,
            id: FileOperationId,
            size: i64,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                if let Some(operation) = self.file_operations.write().await.get_mut(&id) {
                    if operation.state == FileOperationState::Uploading {
                        operation.state = FileOperationState::Complete;
                        operation.size = size;
                    }
                }
                Ok(())
            })
        }

        fn set_file_operation_errored(
            &self,
            id: FileOperationId,
            message: String,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                if let Some(operation) = self.file_operations.write().await.get_mut(&id) {
                    if operation.state != FileOperationState::Error {
                        operation.state = FileOperationState::Error;
                        operation.error = Some(quill_core::models::truncate_error(&message));
                    }
                }
                Ok(())
            })
        }

        fn export_content(
            &self,
            team_id: TeamId,
        ) -> BoxFuture<'_, Result<(Vec<Collection>, Vec<Document>)>> {
            Box::pin(async move {
                let collections = self
                    .collections
                    .read()
                    .await
                    .iter()
                    .filter(|c| c.team_id == team_id && c.deleted_at.is_none())
                    .cloned()
                    .collect();
                let documents = self
                    .documents
                    .read()
                    .await
                    .iter()
                    .filter(|d| d.team_id == team_id && d.deleted_at.is_none())
                    .cloned()
                    .collect();
                Ok((collections, documents))
            })
        }

        fn notify_user(
            &self,
            user_id: UserId,
            kind: NotificationKind,
            now: DateTime<Utc>,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                let mut notifications = self.notifications.write().await;
                let exists =
                    notifications.iter().any(|n| n.user_id == user_id && n.kind == kind);
                if !exists {
                    notifications.push(Notification {
                        id: NotificationId::new(),
                        user_id,
                        actor_id: None,
                        document_id: None,
                        kind,
                        created_at: now,
                    });
                }
                Ok(())
            })
        }

        fn purge_deleted_documents(
            &self,
            range: Option<KeyRange>,
            cutoff: DateTime<Utc>,
        ) -> BoxFuture<'_, Result<u64>> {
            Box::pin(async move {
                let mut documents = self.documents.write().await;
                let before = documents.len();
                documents.retain(|d| {
                    let purgeable = d.deleted_at.is_some_and(|deleted| deleted < cutoff)
                        && range.is_none_or(|r| r.contains(d.id.0));
                    !purgeable
                });
                Ok((before - documents.len()) as u64)
            })
        }
    }

    /// In-memory blob store.
    #[derive(Default)]
    pub struct InMemoryFileStore {
        blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    }

    impl InMemoryFileStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds a blob.
        pub async fn insert(&self, key: &str, bytes: Vec<u8>) {
            self.blobs.write().await.insert(key.to_string(), bytes);
        }

        /// Whether a blob exists.
        pub async fn contains(&self, key: &str) -> bool {
            self.blobs.read().await.contains_key(key)
        }

        /// Reads a blob back, for assertions.
        pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
            self.blobs.read().await.get(key).cloned()
        }
    }

    impl FileStore for InMemoryFileStore {
        fn read(&self, key: &str) -> BoxFuture<'_, Result<Vec<u8>>> {
            let key = key.to_string();
            Box::pin(async move {
                self.blobs
                    .read()
                    .await
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| CoreError::NotFound(format!("file {key} not found")))
            })
        }

        fn write(&self, key: &str, bytes: Vec<u8>) -> BoxFuture<'_, Result<u64>> {
            let key = key.to_string();
            Box::pin(async move {
                let size = bytes.len() as u64;
                self.blobs.write().await.insert(key, bytes);
                Ok(size)
            })
        }

        fn delete(&self, key: &str) -> BoxFuture<'_, Result<()>> {
            let key = key.to_string();
            Box::pin(async move {
                self.blobs.write().await.remove(&key);
                Ok(())
            })
        }
    }
}
