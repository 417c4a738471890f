//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub joined_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRecord {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub author_id: Uuid,
    pub group_id: Option<Uuid>,
    pub text: String,
    pub image_path: Option<String>,
    pub published_at: OffsetDateTime,
}

/// A post joined with the display attributes every feed needs: the author's
/// username and, when the post is filed into a group, the group's title and
/// slug. Produced by a single store query so feed rendering never fans out
/// into per-row lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedPost {
    pub id: Uuid,
    pub text: String,
    pub image_path: Option<String>,
    pub published_at: OffsetDateTime,
    pub author_id: Uuid,
    pub author_username: String,
    pub group_title: Option<String>,
    pub group_slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentRecord {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub text: String,
    pub created_at: OffsetDateTime,
}

/// A login session at rest. Only the SHA-256 digest of the cookie secret is
/// stored; the plaintext secret exists solely in the visitor's cookie.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_digest: Vec<u8>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}
