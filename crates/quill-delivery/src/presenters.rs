//! Model snapshots embedded in webhook payloads.
//!
//! Receivers get a point-in-time JSON view of the referenced model, not the
//! model itself: the entity may have changed or vanished between the event
//! firing and the delivery running, and a missing model presents as `null`
//! rather than a failure.

use quill_core::models::{Collection, Document, User};
use serde_json::json;

/// Snapshot of a document for webhook payloads.
pub fn present_document(document: &Document) -> serde_json::Value {
    json!({
        "id": document.id,
        "title": document.title,
        "text": document.text,
        "collectionId": document.collection_id,
        "teamId": document.team_id,
        "createdBy": document.created_by,
        "publishedAt": document.published_at,
        "createdAt": document.created_at,
        "updatedAt": document.updated_at,
    })
}

/// Snapshot of a collection for webhook payloads.
pub fn present_collection(collection: &Collection) -> serde_json::Value {
    json!({
        "id": collection.id,
        "name": collection.name,
        "teamId": collection.team_id,
        "createdBy": collection.created_by,
        "createdAt": collection.created_at,
    })
}

/// Snapshot of a user for webhook payloads. Email is deliberately omitted;
/// webhook receivers are third parties.
pub fn present_user(user: &User) -> serde_json::Value {
    json!({
        "id": user.id,
        "name": user.name,
        "teamId": user.team_id,
        "suspendedAt": user.suspended_at,
        "createdAt": user.created_at,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use quill_core::{TeamId, UserId};

    use super::*;

    #[test]
    fn user_snapshot_omits_email() {
        let user = User {
            id: UserId::new(),
            team_id: TeamId::new(),
            name: "Sam".to_string(),
            email: "sam@example.com".to_string(),
            suspended_at: None,
            created_at: Utc::now(),
        };

        let snapshot = present_user(&user);

        assert_eq!(snapshot["name"], "Sam");
        assert!(snapshot.get("email").is_none());
    }
}
