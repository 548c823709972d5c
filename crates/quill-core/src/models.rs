//! Domain models and strongly-typed identifiers.
//!
//! Defines the entities the worker subsystem reads and writes: documents,
//! collections, revisions, webhook subscriptions and their delivery audit
//! rows, and the import/export state machines. ID newtypes prevent mixing
//! identifier types at compile time; database mapping follows the string
//! encode/decode convention used across the storage layer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::EventName;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Defines a UUID newtype identifier with database and display plumbing.
///
/// Each ID gets `new()` (random v4), `Display`, `From<Uuid>`, and the sqlx
/// `Type`/`Decode`/`Encode` impls so it can be bound and fetched directly.
#[macro_export]
macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <uuid::Uuid as sqlx::Type<sqlx::Postgres>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let uuid = <uuid::Uuid as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                Ok(Self(uuid))
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<
                sqlx::encode::IsNull,
                Box<dyn std::error::Error + Send + Sync + 'static>,
            > {
                <uuid::Uuid as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

define_id! {
    /// Identifies a team. Every operation in the subsystem is team-scoped.
    TeamId
}
define_id! {
    /// Identifies a user.
    UserId
}
define_id! {
    /// Identifies a document.
    DocumentId
}
define_id! {
    /// Identifies a collection.
    CollectionId
}
define_id! {
    /// Identifies a document revision snapshot.
    RevisionId
}
define_id! {
    /// Identifies a webhook subscription.
    SubscriptionId
}
define_id! {
    /// Identifies a single webhook delivery attempt.
    DeliveryId
}
define_id! {
    /// Identifies an import job.
    ImportId
}
define_id! {
    /// Identifies an export or other long-running file operation.
    FileOperationId
}
define_id! {
    /// Identifies an attachment blob.
    AttachmentId
}
define_id! {
    /// Identifies an in-app notification.
    NotificationId
}
define_id! {
    /// Identifies a document-to-document relationship row.
    RelationshipId
}

/// A team, the tenancy boundary for everything else.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    /// Unique identifier.
    pub id: TeamId,

    /// Display name.
    pub name: String,

    /// Count of non-suspended users, maintained by the worker subsystem.
    ///
    /// Recalculated (not incremented) under a row lock so duplicate event
    /// delivery cannot skew it.
    pub active_user_count: i32,

    /// When the team was created.
    pub created_at: DateTime<Utc>,

    /// When the team was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A member of a team.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique identifier.
    pub id: UserId,

    /// Owning team.
    pub team_id: TeamId,

    /// Display name.
    pub name: String,

    /// Email address, the side channel for failure notifications.
    pub email: String,

    /// Set while the user is suspended.
    pub suspended_at: Option<DateTime<Utc>>,

    /// When the user was created.
    pub created_at: DateTime<Utc>,
}

/// A document. The rich-text model itself lives outside this subsystem;
/// workers only read `text` to extract links and snapshot revisions.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    /// Unique identifier.
    pub id: DocumentId,

    /// Owning team.
    pub team_id: TeamId,

    /// Collection the document lives in.
    pub collection_id: CollectionId,

    /// Title.
    pub title: String,

    /// Markdown body.
    pub text: String,

    /// External identifier when the document came from an import.
    ///
    /// Unique per import; the idempotence key for resumable import steps.
    pub source_id: Option<String>,

    /// Import that created the document, if any.
    pub import_id: Option<ImportId>,

    /// User who created the document.
    pub created_by: UserId,

    /// Set once the document is published.
    pub published_at: Option<DateTime<Utc>>,

    /// Soft-delete timestamp. Purged permanently by the maintenance task.
    pub deleted_at: Option<DateTime<Utc>>,

    /// When the document was created.
    pub created_at: DateTime<Utc>,

    /// Last content change. The debounce compares this against the
    /// triggering event's `created_at`.
    pub updated_at: DateTime<Utc>,
}

/// A collection of documents.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Collection {
    /// Unique identifier.
    pub id: CollectionId,

    /// Owning team.
    pub team_id: TeamId,

    /// Display name.
    pub name: String,

    /// External identifier when the collection came from an import.
    pub source_id: Option<String>,

    /// Import that created the collection, if any.
    pub import_id: Option<ImportId>,

    /// User who created the collection.
    pub created_by: UserId,

    /// When the collection was created.
    pub created_at: DateTime<Utc>,

    /// Soft-delete timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Point-in-time snapshot of a document, created after edits settle.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Revision {
    /// Unique identifier.
    pub id: RevisionId,

    /// Document this snapshot belongs to.
    pub document_id: DocumentId,

    /// Title at snapshot time.
    pub title: String,

    /// Body at snapshot time.
    pub text: String,

    /// User whose edit produced the snapshot.
    pub created_by: UserId,

    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,
}

/// Directed link between two documents, maintained by the backlinks
/// processor. `document_id` contains the link, `target_document_id` is the
/// document being referenced.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Relationship {
    /// Unique identifier.
    pub id: RelationshipId,

    /// Document containing the link.
    pub document_id: DocumentId,

    /// Document being linked to.
    pub target_document_id: DocumentId,

    /// When the relationship was recorded.
    pub created_at: DateTime<Utc>,
}

/// Kinds of in-app notification the worker subsystem produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A document in a subscribed collection was published.
    DocumentPublished,
    /// An import finished.
    ImportCompleted,
    /// An import failed.
    ImportFailed,
    /// An export finished.
    ExportCompleted,
    /// An export failed.
    ExportFailed,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DocumentPublished => write!(f, "document_published"),
            Self::ImportCompleted => write!(f, "import_completed"),
            Self::ImportFailed => write!(f, "import_failed"),
            Self::ExportCompleted => write!(f, "export_completed"),
            Self::ExportFailed => write!(f, "export_failed"),
        }
    }
}

impl sqlx::Type<PgDb> for NotificationKind {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for NotificationKind {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "document_published" => Ok(Self::DocumentPublished),
            "import_completed" => Ok(Self::ImportCompleted),
            "import_failed" => Ok(Self::ImportFailed),
            "export_completed" => Ok(Self::ExportCompleted),
            "export_failed" => Ok(Self::ExportFailed),
            _ => Err(format!("invalid notification kind: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for NotificationKind {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// An in-app notification. Written with find-or-create so duplicate event
/// delivery cannot notify twice.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    /// Unique identifier.
    pub id: NotificationId,

    /// Recipient.
    pub user_id: UserId,

    /// User whose action triggered the notification, if any.
    pub actor_id: Option<UserId>,

    /// Document the notification refers to, if any.
    pub document_id: Option<DocumentId>,

    /// What kind of notification this is.
    pub kind: NotificationKind,

    /// When the notification was created.
    pub created_at: DateTime<Utc>,
}

/// Wildcard entry accepted in a subscription's event list.
pub const EVENT_WILDCARD: &str = "*";

/// A third party's request to be notified about team events over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookSubscription {
    /// Unique identifier.
    pub id: SubscriptionId,

    /// Owning team.
    pub team_id: TeamId,

    /// User who created the subscription.
    pub created_by: UserId,

    /// Destination URL for deliveries.
    pub url: String,

    /// Shared secret for HMAC signing, if configured.
    pub secret: Option<String>,

    /// Event names the subscription wants, or `["*"]` for everything.
    pub events: Vec<String>,

    /// Whether deliveries should be attempted.
    ///
    /// Cleared automatically after sustained delivery failure; re-enabling
    /// is an explicit action outside this subsystem.
    pub enabled: bool,

    /// When the subscription was created.
    pub created_at: DateTime<Utc>,

    /// When the subscription was last updated.
    pub updated_at: DateTime<Utc>,

    /// Soft-delete timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WebhookSubscription {
    /// Whether this subscription wants the given event.
    pub fn subscribed_to(&self, name: EventName) -> bool {
        self.events.iter().any(|e| e == EVENT_WILDCARD || e == name.as_str())
    }
}

/// Outcome of a webhook delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Row created, HTTP attempt not yet resolved.
    Pending,
    /// Endpoint acknowledged with a 2xx response.
    Success,
    /// Request failed or the endpoint rejected it.
    Failed,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl sqlx::Type<PgDb> for DeliveryStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DeliveryStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid delivery status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for DeliveryStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Append-only audit record of one webhook delivery attempt.
///
/// Created before the HTTP call; the response fields of the same row are
/// filled afterwards. Never otherwise updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    /// Unique identifier, also surfaced to the receiver in the envelope.
    pub id: DeliveryId,

    /// Subscription this delivery was made for.
    pub subscription_id: SubscriptionId,

    /// Current outcome.
    pub status: DeliveryStatus,

    /// HTTP status code, when a response was received.
    pub status_code: Option<i32>,

    /// The JSON envelope that was sent.
    pub request_body: serde_json::Value,

    /// Response body, truncated for storage.
    pub response_body: Option<String>,

    /// When the attempt was made.
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for WebhookDelivery {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        let request_body: sqlx::types::Json<serde_json::Value> = row.try_get("request_body")?;
        Ok(Self {
            id: row.try_get("id")?,
            subscription_id: row.try_get("subscription_id")?,
            status: row.try_get("status")?,
            status_code: row.try_get("status_code")?,
            request_body: request_body.0,
            response_body: row.try_get("response_body")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Import job lifecycle.
///
/// ```text
/// Created -> InProgress -> Completed -> Processed
///         \-> Errored (terminal, from any non-terminal state)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    /// Job recorded, no work performed yet.
    Created,
    /// Parse/persist steps are running.
    InProgress,
    /// All content persisted and links resolved.
    Completed,
    /// Post-completion cleanup and notification done.
    Processed,
    /// Terminal failure.
    Errored,
}

impl ImportState {
    /// Whether a transition to `next` is legal from this state.
    pub fn can_transition_to(self, next: ImportState) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::Completed, Self::Processed)
                | (Self::Created | Self::InProgress | Self::Completed, Self::Errored)
        )
    }

    /// Whether the import has already persisted everything it will.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Processed | Self::Errored)
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Processed => write!(f, "processed"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

impl sqlx::Type<PgDb> for ImportState {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ImportState {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "created" => Ok(Self::Created),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "processed" => Ok(Self::Processed),
            "errored" => Ok(Self::Errored),
            _ => Err(format!("invalid import state: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for ImportState {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// A long-running import job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Import {
    /// Unique identifier.
    pub id: ImportId,

    /// Owning team.
    pub team_id: TeamId,

    /// User who started the import.
    pub created_by: UserId,

    /// Current lifecycle state.
    pub state: ImportState,

    /// Storage key of the staged upload being imported.
    pub input_key: String,

    /// Truncated failure message when `state == Errored`.
    pub error: Option<String>,

    /// Number of documents persisted so far.
    pub document_count: i32,

    /// When the import was created.
    pub created_at: DateTime<Utc>,

    /// When the import last changed.
    pub updated_at: DateTime<Utc>,
}

/// Export (file operation) lifecycle.
///
/// ```text
/// Creating -> Uploading -> Complete
///          \------------\-> Error (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperationState {
    /// Archive is being assembled.
    Creating,
    /// Archive is being written to file storage.
    Uploading,
    /// Archive is available.
    Complete,
    /// Terminal failure.
    Error,
}

impl FileOperationState {
    /// Whether a transition to `next` is legal from this state.
    pub fn can_transition_to(self, next: FileOperationState) -> bool {
        matches!(
            (self, next),
            (Self::Creating, Self::Uploading)
                | (Self::Uploading, Self::Complete)
                | (Self::Creating | Self::Uploading, Self::Error)
        )
    }
}

impl fmt::Display for FileOperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Uploading => write!(f, "uploading"),
            Self::Complete => write!(f, "complete"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl sqlx::Type<PgDb> for FileOperationState {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for FileOperationState {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "creating" => Ok(Self::Creating),
            "uploading" => Ok(Self::Uploading),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            _ => Err(format!("invalid file operation state: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for FileOperationState {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// A long-running export job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileOperation {
    /// Unique identifier.
    pub id: FileOperationId,

    /// Owning team.
    pub team_id: TeamId,

    /// User who requested the export.
    pub user_id: UserId,

    /// Current lifecycle state.
    pub state: FileOperationState,

    /// Storage key of the produced archive.
    pub key: String,

    /// Archive size in bytes once uploaded.
    pub size: i64,

    /// Truncated failure message when `state == Error`.
    pub error: Option<String>,

    /// When the operation was created.
    pub created_at: DateTime<Utc>,

    /// When the operation last changed.
    pub updated_at: DateTime<Utc>,
}

/// A binary blob created during import (images, files referenced by
/// documents). Tracked so a failed import can clean up after itself.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attachment {
    /// Unique identifier.
    pub id: AttachmentId,

    /// Owning team.
    pub team_id: TeamId,

    /// Document the attachment belongs to, once known.
    pub document_id: Option<DocumentId>,

    /// Import that created the attachment, if any.
    pub import_id: Option<ImportId>,

    /// Storage key of the blob.
    pub key: String,

    /// MIME type.
    pub content_type: String,

    /// Size in bytes.
    pub size: i64,

    /// When the attachment was created.
    pub created_at: DateTime<Utc>,
}

/// Maximum length of error messages persisted on pipeline aggregates.
pub const MAX_STORED_ERROR_LEN: usize = 255;

/// Truncates an error message for storage on an aggregate row.
pub fn truncate_error(message: &str) -> String {
    if message.len() <= MAX_STORED_ERROR_LEN {
        return message.to_string();
    }
    let mut end = MAX_STORED_ERROR_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_wildcard_matches_everything() {
        let sub = WebhookSubscription {
            id: SubscriptionId::new(),
            team_id: TeamId::new(),
            created_by: UserId::new(),
            url: "https://example.com/hooks".to_string(),
            secret: None,
            events: vec![EVENT_WILDCARD.to_string()],
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };

        assert!(sub.subscribed_to(EventName::DocumentsPublish));
        assert!(sub.subscribed_to(EventName::UsersSuspend));
    }

    #[test]
    fn subscription_matches_listed_events_only() {
        let sub = WebhookSubscription {
            id: SubscriptionId::new(),
            team_id: TeamId::new(),
            created_by: UserId::new(),
            url: "https://example.com/hooks".to_string(),
            secret: None,
            events: vec!["documents.publish".to_string()],
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };

        assert!(sub.subscribed_to(EventName::DocumentsPublish));
        assert!(!sub.subscribed_to(EventName::DocumentsDelete));
    }

    #[test]
    fn import_state_transitions() {
        assert!(ImportState::Created.can_transition_to(ImportState::InProgress));
        assert!(ImportState::InProgress.can_transition_to(ImportState::Completed));
        assert!(ImportState::Completed.can_transition_to(ImportState::Processed));
        assert!(ImportState::InProgress.can_transition_to(ImportState::Errored));
        assert!(!ImportState::Created.can_transition_to(ImportState::Completed));
        assert!(!ImportState::Processed.can_transition_to(ImportState::Errored));
        assert!(!ImportState::Errored.can_transition_to(ImportState::InProgress));
    }

    #[test]
    fn file_operation_state_transitions() {
        assert!(FileOperationState::Creating.can_transition_to(FileOperationState::Uploading));
        assert!(FileOperationState::Uploading.can_transition_to(FileOperationState::Complete));
        assert!(FileOperationState::Creating.can_transition_to(FileOperationState::Error));
        assert!(!FileOperationState::Complete.can_transition_to(FileOperationState::Error));
        assert!(!FileOperationState::Creating.can_transition_to(FileOperationState::Complete));
    }

    #[test]
    fn error_messages_truncated_on_char_boundary() {
        let long = "é".repeat(300);
        let truncated = truncate_error(&long);
        assert!(truncated.len() <= MAX_STORED_ERROR_LEN);
        assert!(truncated.chars().all(|c| c == 'é'));

        assert_eq!(truncate_error("short"), "short");
    }
}
