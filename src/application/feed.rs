//! Feed composition: which posts appear on which page, in what order.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::{Page, resolve_page};
use crate::application::repos::{
    CommentsRepo, FollowsRepo, GroupsRepo, PostFeedCriteria, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{CommentRecord, FeedPost, GroupRecord, UserRecord};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group")]
    UnknownGroup,
    #[error("unknown user")]
    UnknownUser,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// A group page: the group header plus its posts.
#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: GroupRecord,
    pub page: Page<FeedPost>,
}

/// A profile page: the author, their total output, whether the current
/// viewer follows them, and their posts.
#[derive(Debug, Clone)]
pub struct ProfileFeed {
    pub author: UserRecord,
    pub post_count: u64,
    pub viewer_follows: bool,
    pub page: Page<FeedPost>,
}

/// A single post with its comment thread and the author's total post count.
#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: FeedPost,
    pub comments: Vec<CommentRecord>,
    pub author_post_count: u64,
}

#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    comments: Arc<dyn CommentsRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        comments: Arc<dyn CommentsRepo>,
        follows: Arc<dyn FollowsRepo>,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            comments,
            follows,
        }
    }

    /// Every post on the site, newest first.
    pub async fn global_feed(&self, raw_page: Option<&str>) -> Result<Page<FeedPost>, FeedError> {
        self.paged(PostFeedCriteria::all(), raw_page).await
    }

    /// Posts filed into the group with the given slug.
    pub async fn group_feed(
        &self,
        slug: &str,
        raw_page: Option<&str>,
    ) -> Result<GroupFeed, FeedError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or(FeedError::UnknownGroup)?;

        let page = self.paged(PostFeedCriteria::in_group(group.id), raw_page).await?;
        Ok(GroupFeed { group, page })
    }

    /// Posts written by the named author, plus the follow affordance state
    /// for the current viewer (anonymous viewers never follow anyone).
    pub async fn profile_feed(
        &self,
        username: &str,
        viewer: Option<Uuid>,
        raw_page: Option<&str>,
    ) -> Result<ProfileFeed, FeedError> {
        let author = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(FeedError::UnknownUser)?;

        let criteria = PostFeedCriteria::by_author(author.id);
        let post_count = self.posts.count_feed(&criteria).await?;
        let page = self.paged(criteria, raw_page).await?;

        let viewer_follows = match viewer {
            Some(viewer_id) if viewer_id != author.id => {
                self.follows.edge_exists(viewer_id, author.id).await?
            }
            _ => false,
        };

        Ok(ProfileFeed {
            author,
            post_count,
            viewer_follows,
            page,
        })
    }

    /// Posts by every author the viewer follows. Empty when the viewer
    /// follows nobody. Authentication is the caller's responsibility.
    pub async fn follow_feed(
        &self,
        viewer: Uuid,
        raw_page: Option<&str>,
    ) -> Result<Page<FeedPost>, FeedError> {
        self.paged(PostFeedCriteria::followed_by(viewer), raw_page)
            .await
    }

    /// A single post with its comment thread, or `None` for unknown ids.
    pub async fn post_detail(&self, id: Uuid) -> Result<Option<PostDetail>, FeedError> {
        let Some(post) = self.posts.find_feed_post(id).await? else {
            return Ok(None);
        };

        let comments = self.comments.list_for_post(post.id).await?;
        let author_post_count = self
            .posts
            .count_feed(&PostFeedCriteria::by_author(post.author_id))
            .await?;

        Ok(Some(PostDetail {
            post,
            comments,
            author_post_count,
        }))
    }

    async fn paged(
        &self,
        criteria: PostFeedCriteria,
        raw_page: Option<&str>,
    ) -> Result<Page<FeedPost>, FeedError> {
        let total = self.posts.count_feed(&criteria).await?;
        let resolved = resolve_page(total, raw_page);
        let items = self.posts.list_feed(&criteria, resolved.window()).await?;
        Ok(Page::new(items, resolved))
    }
}
