//! Domain events flowing from the API layer into the worker subsystem.
//!
//! [`EventName`] is a closed sum type so processor dispatch stays a
//! compile-time-exhaustive table lookup rather than string matching spread
//! across the codebase. Wire names keep the dotted form the rest of the
//! product uses ("documents.publish").

use std::{fmt, net::IpAddr, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CollectionId, DocumentId, TeamId, UserId};

/// Every event name the subsystem understands.
///
/// `documents.update.delayed` and `documents.update.debounced` are internal
/// derivatives of `documents.update` produced by the debounce machinery;
/// the API layer never emits them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventName {
    /// A document was created.
    DocumentsCreate,
    /// A document's content changed.
    DocumentsUpdate,
    /// Delayed copy of an update, re-enqueued by the debounce.
    DocumentsUpdateDelayed,
    /// Settled update after the quiet period elapsed.
    DocumentsUpdateDebounced,
    /// A document was published.
    DocumentsPublish,
    /// A document was deleted.
    DocumentsDelete,
    /// A collection was created.
    CollectionsCreate,
    /// A collection was deleted.
    CollectionsDelete,
    /// A user was suspended.
    UsersSuspend,
    /// A suspended user was reactivated.
    UsersActivate,
    /// An import job was created.
    ImportsCreate,
    /// An export or other file operation was created.
    FileOperationsCreate,
    /// A file operation changed state.
    FileOperationsUpdate,
}

impl EventName {
    /// All names, in declaration order. Used to build dispatch tables.
    pub const ALL: &'static [EventName] = &[
        Self::DocumentsCreate,
        Self::DocumentsUpdate,
        Self::DocumentsUpdateDelayed,
        Self::DocumentsUpdateDebounced,
        Self::DocumentsPublish,
        Self::DocumentsDelete,
        Self::CollectionsCreate,
        Self::CollectionsDelete,
        Self::UsersSuspend,
        Self::UsersActivate,
        Self::ImportsCreate,
        Self::FileOperationsCreate,
        Self::FileOperationsUpdate,
    ];

    /// The dotted wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DocumentsCreate => "documents.create",
            Self::DocumentsUpdate => "documents.update",
            Self::DocumentsUpdateDelayed => "documents.update.delayed",
            Self::DocumentsUpdateDebounced => "documents.update.debounced",
            Self::DocumentsPublish => "documents.publish",
            Self::DocumentsDelete => "documents.delete",
            Self::CollectionsCreate => "collections.create",
            Self::CollectionsDelete => "collections.delete",
            Self::UsersSuspend => "users.suspend",
            Self::UsersActivate => "users.activate",
            Self::ImportsCreate => "imports.create",
            Self::FileOperationsCreate => "file_operations.create",
            Self::FileOperationsUpdate => "file_operations.update",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = UnknownEventName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownEventName(s.to_string()))
    }
}

impl TryFrom<String> for EventName {
    type Error = UnknownEventName;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EventName> for String {
    fn from(name: EventName) -> Self {
        name.as_str().to_string()
    }
}

/// Error returned when parsing an unrecognized event name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event name: {0}")]
pub struct UnknownEventName(pub String);

/// Immutable record of a domain occurrence.
///
/// Created by domain commands, consumed by zero or more processors, and
/// never mutated. Serializable because events ride inside job props for
/// at-least-once delivery across process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// What happened.
    pub name: EventName,

    /// Team the event belongs to. All fan-out is scoped to this team.
    pub team_id: TeamId,

    /// User who caused the event.
    pub actor_id: UserId,

    /// Primary model the event refers to, when not covered by a typed field.
    pub model_id: Option<Uuid>,

    /// Document the event refers to, if any.
    pub document_id: Option<DocumentId>,

    /// Collection the event refers to, if any.
    pub collection_id: Option<CollectionId>,

    /// Event-specific payload.
    pub data: Option<serde_json::Value>,

    /// Address the originating request came from.
    pub ip: Option<IpAddr>,

    /// When the event was created by the domain layer.
    ///
    /// The debounce compares this against the entity's `updated_at`, so
    /// derived copies keep the original timestamp.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Creates a bare event with no model references.
    pub fn new(name: EventName, team_id: TeamId, actor_id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            name,
            team_id,
            actor_id,
            model_id: None,
            document_id: None,
            collection_id: None,
            data: None,
            ip: None,
            created_at,
        }
    }

    /// Creates a document-scoped event.
    pub fn for_document(
        name: EventName,
        team_id: TeamId,
        actor_id: UserId,
        document_id: DocumentId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            model_id: Some(document_id.0),
            document_id: Some(document_id),
            ..Self::new(name, team_id, actor_id, created_at)
        }
    }

    /// Creates a collection-scoped event.
    pub fn for_collection(
        name: EventName,
        team_id: TeamId,
        actor_id: UserId,
        collection_id: CollectionId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            model_id: Some(collection_id.0),
            collection_id: Some(collection_id),
            ..Self::new(name, team_id, actor_id, created_at)
        }
    }

    /// Derives a copy of this event under a different name.
    ///
    /// Everything else, including `created_at`, is preserved. Used by the
    /// debounce to produce the `.delayed` and `.debounced` variants.
    pub fn with_name(&self, name: EventName) -> Self {
        Self { name, ..self.clone() }
    }

    /// Attaches an event-specific payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for name in EventName::ALL {
            let parsed: EventName = name.as_str().parse().expect("wire name parses");
            assert_eq!(parsed, *name);
        }
    }

    #[test]
    fn unknown_name_rejected() {
        assert!("documents.sparkle".parse::<EventName>().is_err());
    }

    #[test]
    fn with_name_preserves_timestamp() {
        let event = Event::for_document(
            EventName::DocumentsUpdate,
            TeamId::new(),
            UserId::new(),
            DocumentId::new(),
            Utc::now(),
        );
        let delayed = event.with_name(EventName::DocumentsUpdateDelayed);

        assert_eq!(delayed.created_at, event.created_at);
        assert_eq!(delayed.document_id, event.document_id);
        assert_eq!(delayed.name, EventName::DocumentsUpdateDelayed);
    }
}
