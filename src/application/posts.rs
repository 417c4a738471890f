//! Publishing: post creation, author-only editing, and comments.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, GroupsRepo, PostsRepo, PostsWriteRepo,
    RepoError, UpdatePostParams,
};
use crate::domain::comments::validate_comment_draft;
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord};
use crate::domain::forms::FieldErrors;
use crate::domain::posts::{preview_text, validate_post_draft};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("form validation failed")]
    Validation(FieldErrors),
    #[error("post not found")]
    PostNotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// What a post-edit attempt produced. A non-author hitting the edit endpoint
/// is redirected to the post, not shown an error, so the handler needs to
/// distinguish the two successful shapes.
#[derive(Debug)]
pub enum EditOutcome {
    Updated(PostRecord),
    NotAuthor { post_id: Uuid },
}

/// A parsed post form: text, optional group selection, and the stored path
/// of an image the HTTP layer already persisted (if one was attached).
#[derive(Debug, Clone, Default)]
pub struct PostInput {
    pub text: String,
    pub group_id: Option<Uuid>,
    pub image_path: Option<String>,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    posts_write: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        posts_write: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
    ) -> Self {
        Self {
            posts,
            posts_write,
            groups,
            comments,
        }
    }

    /// Validate and persist a new post owned by `author`.
    pub async fn create_post(
        &self,
        author: Uuid,
        input: PostInput,
    ) -> Result<PostRecord, PublishError> {
        let draft = match validate_post_draft(&input.text, input.group_id) {
            Ok(draft) => draft,
            Err(errors) => return Err(PublishError::Validation(errors)),
        };
        self.check_group(draft.group_id).await?;

        let record = self
            .posts_write
            .create_post(CreatePostParams {
                author_id: author,
                text: draft.text,
                group_id: draft.group_id,
                image_path: input.image_path,
            })
            .await?;

        info!(
            target = "cortile::posts",
            author = %author,
            preview = %preview_text(&record.text),
            "post created"
        );
        Ok(record)
    }

    /// Apply an edit on behalf of `editor`. Only the author may change a
    /// post; anyone else gets [`EditOutcome::NotAuthor`] and the stored row
    /// is untouched. When `input.image_path` is `None` the existing image is
    /// kept.
    pub async fn edit_post(
        &self,
        editor: Uuid,
        post_id: Uuid,
        input: PostInput,
    ) -> Result<EditOutcome, PublishError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(PublishError::PostNotFound)?;

        if post.author_id != editor {
            return Ok(EditOutcome::NotAuthor { post_id });
        }

        let draft = match validate_post_draft(&input.text, input.group_id) {
            Ok(draft) => draft,
            Err(errors) => return Err(PublishError::Validation(errors)),
        };
        self.check_group(draft.group_id).await?;

        let record = self
            .posts_write
            .update_post(UpdatePostParams {
                id: post.id,
                text: draft.text,
                group_id: draft.group_id,
                image_path: input.image_path.or(post.image_path),
            })
            .await?;

        Ok(EditOutcome::Updated(record))
    }

    /// Append a comment to an existing post.
    pub async fn add_comment(
        &self,
        author: Uuid,
        post_id: Uuid,
        text: &str,
    ) -> Result<CommentRecord, PublishError> {
        let draft = match validate_comment_draft(text) {
            Ok(draft) => draft,
            Err(errors) => return Err(PublishError::Validation(errors)),
        };

        if self.posts.find_by_id(post_id).await?.is_none() {
            return Err(PublishError::PostNotFound);
        }

        let record = self
            .comments
            .create_comment(CreateCommentParams {
                post_id,
                author_id: author,
                text: draft.text,
            })
            .await?;

        Ok(record)
    }

    /// Groups offered in the post form's dropdown.
    pub async fn group_choices(&self) -> Result<Vec<GroupRecord>, PublishError> {
        Ok(self.groups.list_all().await?)
    }

    async fn check_group(&self, group_id: Option<Uuid>) -> Result<(), PublishError> {
        let Some(id) = group_id else {
            return Ok(());
        };

        if self.groups.find_by_id(id).await?.is_none() {
            let mut errors = FieldErrors::new();
            errors.push("group", "Selected group does not exist");
            return Err(PublishError::Validation(errors));
        }

        Ok(())
    }
}
