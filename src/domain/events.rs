//! Canonical event vocabulary the search indexer understands.
//!
//! Producers name their events and fields differently; the alias tables here
//! are shared by the topic schemas and the normalizer so both agree on what a
//! valid payload looks like.

use std::fmt;

use chrono::{DateTime, Utc};

use super::search::EntityType;

pub const POST_ID_FIELDS: &[&str] = &["entity_id", "post_id", "content_id", "postId", "id"];
pub const USER_ID_FIELDS: &[&str] = &["entity_id", "user_id", "userId", "id"];
pub const COMMENT_ID_FIELDS: &[&str] = &["entity_id", "comment_id", "commentId", "id"];

pub const POST_CONTENT_FIELDS: &[&str] = &["content", "body", "text"];
pub const USER_CONTENT_FIELDS: &[&str] = &["bio", "content", "display_name", "displayName"];
pub const COMMENT_CONTENT_FIELDS: &[&str] = &["content", "body", "text"];

pub const POST_TITLE_FIELDS: &[&str] = &["title", "headline"];
pub const USER_TITLE_FIELDS: &[&str] = &["username", "title", "name"];
pub const COMMENT_TITLE_FIELDS: &[&str] = &["title"];

pub const AUTHOR_FIELDS: &[&str] = &["author", "author_id", "authorId", "user_id", "userId"];

/// Field aliases for one entity type.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    pub id: &'static [&'static str],
    pub content: &'static [&'static str],
    pub title: &'static [&'static str],
    pub author: &'static [&'static str],
}

impl FieldAliases {
    pub fn for_entity(entity: EntityType) -> Self {
        match entity {
            EntityType::Post => FieldAliases {
                id: POST_ID_FIELDS,
                content: POST_CONTENT_FIELDS,
                title: POST_TITLE_FIELDS,
                author: AUTHOR_FIELDS,
            },
            // A user's own id doubles as its author.
            EntityType::User => FieldAliases {
                id: USER_ID_FIELDS,
                content: USER_CONTENT_FIELDS,
                title: USER_TITLE_FIELDS,
                author: USER_ID_FIELDS,
            },
            EntityType::Comment => FieldAliases {
                id: COMMENT_ID_FIELDS,
                content: COMMENT_CONTENT_FIELDS,
                title: COMMENT_TITLE_FIELDS,
                author: AUTHOR_FIELDS,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Created,
    Updated,
    Deleted,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Created => "created",
            Action::Updated => "updated",
            Action::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalKind {
    PostCreated,
    PostUpdated,
    PostDeleted,
    UserCreated,
    UserUpdated,
    UserDeleted,
    CommentCreated,
    CommentUpdated,
    CommentDeleted,
}

impl CanonicalKind {
    pub const ALL: [CanonicalKind; 9] = [
        CanonicalKind::PostCreated,
        CanonicalKind::PostUpdated,
        CanonicalKind::PostDeleted,
        CanonicalKind::UserCreated,
        CanonicalKind::UserUpdated,
        CanonicalKind::UserDeleted,
        CanonicalKind::CommentCreated,
        CanonicalKind::CommentUpdated,
        CanonicalKind::CommentDeleted,
    ];

    pub fn new(entity: EntityType, action: Action) -> Self {
        match (entity, action) {
            (EntityType::Post, Action::Created) => CanonicalKind::PostCreated,
            (EntityType::Post, Action::Updated) => CanonicalKind::PostUpdated,
            (EntityType::Post, Action::Deleted) => CanonicalKind::PostDeleted,
            (EntityType::User, Action::Created) => CanonicalKind::UserCreated,
            (EntityType::User, Action::Updated) => CanonicalKind::UserUpdated,
            (EntityType::User, Action::Deleted) => CanonicalKind::UserDeleted,
            (EntityType::Comment, Action::Created) => CanonicalKind::CommentCreated,
            (EntityType::Comment, Action::Updated) => CanonicalKind::CommentUpdated,
            (EntityType::Comment, Action::Deleted) => CanonicalKind::CommentDeleted,
        }
    }

    pub fn entity(&self) -> EntityType {
        match self {
            CanonicalKind::PostCreated | CanonicalKind::PostUpdated | CanonicalKind::PostDeleted => {
                EntityType::Post
            }
            CanonicalKind::UserCreated | CanonicalKind::UserUpdated | CanonicalKind::UserDeleted => {
                EntityType::User
            }
            CanonicalKind::CommentCreated
            | CanonicalKind::CommentUpdated
            | CanonicalKind::CommentDeleted => EntityType::Comment,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            CanonicalKind::PostCreated | CanonicalKind::UserCreated | CanonicalKind::CommentCreated => {
                Action::Created
            }
            CanonicalKind::PostUpdated | CanonicalKind::UserUpdated | CanonicalKind::CommentUpdated => {
                Action::Updated
            }
            CanonicalKind::PostDeleted | CanonicalKind::UserDeleted | CanonicalKind::CommentDeleted => {
                Action::Deleted
            }
        }
    }

    /// Domain topic carrying this kind, e.g. `post.created`.
    pub fn topic(&self) -> String {
        format!("{}.{}", self.entity().as_str(), self.action().as_str())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalKind::PostCreated => "POST_CREATED",
            CanonicalKind::PostUpdated => "POST_UPDATED",
            CanonicalKind::PostDeleted => "POST_DELETED",
            CanonicalKind::UserCreated => "USER_CREATED",
            CanonicalKind::UserUpdated => "USER_UPDATED",
            CanonicalKind::UserDeleted => "USER_DELETED",
            CanonicalKind::CommentCreated => "COMMENT_CREATED",
            CanonicalKind::CommentUpdated => "COMMENT_UPDATED",
            CanonicalKind::CommentDeleted => "COMMENT_DELETED",
        }
    }
}

impl fmt::Display for CanonicalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Producer-independent payload: `{id, content?, title?, authorId?}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPayload {
    pub id: String,
    pub content: Option<String>,
    pub title: Option<String>,
    pub author_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedEvent {
    Canonical {
        kind: CanonicalKind,
        payload: CanonicalPayload,
        occurred_at: DateTime<Utc>,
    },
    Unmapped {
        event_type: String,
    },
}

/// The nine domain topics, `<entity>.<created|updated|deleted>`.
pub fn domain_topics() -> Vec<String> {
    CanonicalKind::ALL.iter().map(CanonicalKind::topic).collect()
}
