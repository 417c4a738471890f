//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::PageWindow;
use crate::domain::entities::{
    CommentRecord, FeedPost, GroupRecord, PostRecord, SessionRecord, UserRecord,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Explicit feed query specification: which posts, in the one fixed order
/// (`published_at DESC, id DESC`). At most one axis is set per feed; the
/// store composes the matching `WHERE` clauses from whatever is present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostFeedCriteria {
    /// Only posts written by this author.
    pub author: Option<Uuid>,
    /// Only posts filed into this group.
    pub group: Option<Uuid>,
    /// Only posts whose author is followed by this user.
    pub followed_by: Option<Uuid>,
}

impl PostFeedCriteria {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_author(author: Uuid) -> Self {
        Self {
            author: Some(author),
            ..Self::default()
        }
    }

    pub fn in_group(group: Uuid) -> Self {
        Self {
            group: Some(group),
            ..Self::default()
        }
    }

    pub fn followed_by(user: Uuid) -> Self {
        Self {
            followed_by: Some(user),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub password_salt: Vec<u8>,
    pub password_digest: Vec<u8>,
}

/// A user row joined with its password material, for credential checks only.
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    pub user: UserRecord,
    pub password_salt: Vec<u8>,
    pub password_digest: Vec<u8>,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;

    async fn find_credentials(&self, username: &str)
    -> Result<Option<StoredCredentials>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateGroupParams {
    pub title: String,
    pub slug: String,
    pub description: String,
}

#[async_trait]
pub trait GroupsRepo: Send + Sync {
    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<GroupRecord>, RepoError>;

    async fn list_all(&self) -> Result<Vec<GroupRecord>, RepoError>;

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    /// Posts matching the criteria in feed order, restricted to the window.
    /// Author and group attributes arrive joined in the same rows.
    async fn list_feed(
        &self,
        criteria: &PostFeedCriteria,
        window: PageWindow,
    ) -> Result<Vec<FeedPost>, RepoError>;

    async fn count_feed(&self, criteria: &PostFeedCriteria) -> Result<u64, RepoError>;

    async fn find_feed_post(&self, id: Uuid) -> Result<Option<FeedPost>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub author_id: Uuid,
    pub text: String,
    pub group_id: Option<Uuid>,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: Uuid,
    pub text: String,
    pub group_id: Option<Uuid>,
    pub image_path: Option<String>,
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    /// Rewrites text/group/image. The author column is never touched.
    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateCommentParams {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub text: String,
}

#[async_trait]
pub trait CommentsRepo: Send + Sync {
    async fn create_comment(&self, params: CreateCommentParams)
    -> Result<CommentRecord, RepoError>;

    /// All comments on a post, oldest first.
    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError>;
}

#[async_trait]
pub trait FollowsRepo: Send + Sync {
    /// Insert the edge if absent. Returns whether a new row landed; an
    /// existing edge is not an error.
    async fn insert_edge(&self, follower: Uuid, author: Uuid) -> Result<bool, RepoError>;

    /// Delete the edge if present. Returns whether a row was removed.
    async fn delete_edge(&self, follower: Uuid, author: Uuid) -> Result<bool, RepoError>;

    async fn edge_exists(&self, follower: Uuid, author: Uuid) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait SessionsRepo: Send + Sync {
    async fn insert_session(&self, record: SessionRecord) -> Result<(), RepoError>;

    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>, RepoError>;

    async fn delete_session(&self, id: Uuid) -> Result<(), RepoError>;

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError>;
}
