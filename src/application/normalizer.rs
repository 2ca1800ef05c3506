//! Maps producer event names and payload shapes onto [`CanonicalKind`] and
//! [`CanonicalPayload`].

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::events::{CanonicalKind, CanonicalPayload, FieldAliases, NormalizedEvent};

/// Every producer event name the indexer understands.
const EVENT_KIND_TABLE: &[(&str, CanonicalKind)] = &[
    // post service
    ("post.created", CanonicalKind::PostCreated),
    ("post.updated", CanonicalKind::PostUpdated),
    ("post.deleted", CanonicalKind::PostDeleted),
    ("PostCreated", CanonicalKind::PostCreated),
    ("PostUpdated", CanonicalKind::PostUpdated),
    ("PostDeleted", CanonicalKind::PostDeleted),
    ("POST_CREATED", CanonicalKind::PostCreated),
    ("POST_UPDATED", CanonicalKind::PostUpdated),
    ("POST_DELETED", CanonicalKind::PostDeleted),
    // content service publishes posts as content
    ("content.created", CanonicalKind::PostCreated),
    ("content.updated", CanonicalKind::PostUpdated),
    ("content.deleted", CanonicalKind::PostDeleted),
    ("ContentCreated", CanonicalKind::PostCreated),
    ("ContentUpdated", CanonicalKind::PostUpdated),
    ("ContentDeleted", CanonicalKind::PostDeleted),
    // user service
    ("user.created", CanonicalKind::UserCreated),
    ("user.updated", CanonicalKind::UserUpdated),
    ("user.deleted", CanonicalKind::UserDeleted),
    ("UserCreated", CanonicalKind::UserCreated),
    ("UserRegistered", CanonicalKind::UserCreated),
    ("UserUpdated", CanonicalKind::UserUpdated),
    ("UserProfileUpdated", CanonicalKind::UserUpdated),
    ("UserDeleted", CanonicalKind::UserDeleted),
    ("USER_CREATED", CanonicalKind::UserCreated),
    ("USER_UPDATED", CanonicalKind::UserUpdated),
    ("USER_DELETED", CanonicalKind::UserDeleted),
    // comment service
    ("comment.created", CanonicalKind::CommentCreated),
    ("comment.updated", CanonicalKind::CommentUpdated),
    ("comment.deleted", CanonicalKind::CommentDeleted),
    ("CommentCreated", CanonicalKind::CommentCreated),
    ("CommentAdded", CanonicalKind::CommentCreated),
    ("CommentUpdated", CanonicalKind::CommentUpdated),
    ("CommentEdited", CanonicalKind::CommentUpdated),
    ("CommentDeleted", CanonicalKind::CommentDeleted),
    ("COMMENT_CREATED", CanonicalKind::CommentCreated),
    ("COMMENT_UPDATED", CanonicalKind::CommentUpdated),
    ("COMMENT_DELETED", CanonicalKind::CommentDeleted),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("{kind} payload is not an object")]
    NotAnObject { kind: CanonicalKind },

    #[error("{kind} payload carries no entity id")]
    MissingId { kind: CanonicalKind },
}

pub fn canonical_kind(event_type: &str) -> Option<CanonicalKind> {
    EVENT_KIND_TABLE
        .iter()
        .find(|(name, _)| *name == event_type)
        .map(|(_, kind)| *kind)
}

/// Normalizes one producer event. Unknown event types come back as
/// [`NormalizedEvent::Unmapped`]; a known type with an unusable payload is
/// an error.
pub fn normalize(
    event_type: &str,
    payload: &Value,
    occurred_at: DateTime<Utc>,
) -> Result<NormalizedEvent, NormalizeError> {
    let Some(kind) = canonical_kind(event_type) else {
        return Ok(NormalizedEvent::Unmapped {
            event_type: event_type.to_string(),
        });
    };
    let object = payload
        .as_object()
        .ok_or(NormalizeError::NotAnObject { kind })?;
    let aliases = FieldAliases::for_entity(kind.entity());

    let id = first_text(object, aliases.id).ok_or(NormalizeError::MissingId { kind })?;
    let payload = CanonicalPayload {
        author_id: first_text(object, aliases.author),
        content: first_text(object, aliases.content),
        title: first_text(object, aliases.title),
        id,
    };

    Ok(NormalizedEvent::Canonical {
        kind,
        payload,
        occurred_at,
    })
}

fn first_text(object: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match object.get(*name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
