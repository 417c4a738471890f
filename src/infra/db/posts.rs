use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::PageWindow;
use crate::application::repos::{
    CreatePostParams, PostFeedCriteria, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::{FeedPost, PostRecord};

use super::PostgresRepositories;
use super::util::map_sqlx_error;

const FEED_SELECT: &str = "SELECT p.id, p.text, p.image_path, p.published_at, p.author_id, \
     u.username AS author_username, g.title AS group_title, g.slug AS group_slug \
     FROM posts p \
     INNER JOIN users u ON u.id = p.author_id \
     LEFT JOIN groups g ON g.id = p.group_id \
     WHERE 1=1 ";

#[derive(sqlx::FromRow)]
struct FeedPostRow {
    id: Uuid,
    text: String,
    image_path: Option<String>,
    published_at: OffsetDateTime,
    author_id: Uuid,
    author_username: String,
    group_title: Option<String>,
    group_slug: Option<String>,
}

impl From<FeedPostRow> for FeedPost {
    fn from(row: FeedPostRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            image_path: row.image_path,
            published_at: row.published_at,
            author_id: row.author_id,
            author_username: row.author_username,
            group_title: row.group_title,
            group_slug: row.group_slug,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    author_id: Uuid,
    group_id: Option<Uuid>,
    text: String,
    image_path: Option<String>,
    published_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            author_id: row.author_id,
            group_id: row.group_id,
            text: row.text,
            image_path: row.image_path,
            published_at: row.published_at,
        }
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn list_feed(
        &self,
        criteria: &PostFeedCriteria,
        window: PageWindow,
    ) -> Result<Vec<FeedPost>, RepoError> {
        let mut qb = QueryBuilder::new(FEED_SELECT);
        Self::apply_feed_criteria(&mut qb, criteria);

        qb.push(" ORDER BY p.published_at DESC, p.id DESC LIMIT ");
        qb.push_bind(i64::from(window.limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(window.offset).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<FeedPostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(FeedPost::from).collect())
    }

    async fn count_feed(&self, criteria: &PostFeedCriteria) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p WHERE 1=1 ");
        Self::apply_feed_criteria(&mut qb, criteria);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn find_feed_post(&self, id: Uuid) -> Result<Option<FeedPost>, RepoError> {
        let mut qb = QueryBuilder::new(FEED_SELECT);
        qb.push(" AND p.id = ");
        qb.push_bind(id);

        let row = qb
            .build_query_as::<FeedPostRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(FeedPost::from))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(
            "SELECT id, author_id, group_id, text, image_path, published_at \
             FROM posts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(
            "INSERT INTO posts (id, author_id, group_id, text, image_path) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, author_id, group_id, text, image_path, published_at",
        )
        .bind(Uuid::new_v4())
        .bind(params.author_id)
        .bind(params.group_id)
        .bind(&params.text)
        .bind(&params.image_path)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(PostRecord::from(row))
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(
            "UPDATE posts SET text = $2, group_id = $3, image_path = $4 \
             WHERE id = $1 \
             RETURNING id, author_id, group_id, text, image_path, published_at",
        )
        .bind(params.id)
        .bind(&params.text)
        .bind(params.group_id)
        .bind(&params.image_path)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(PostRecord::from).ok_or(RepoError::NotFound)
    }
}
