//! Service-level flows over in-memory repository doubles: feed composition,
//! pagination clamping, publishing rules, the follow graph, and sessions.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use cortile::application::accounts::{AccountError, AccountService};
use cortile::application::feed::{FeedError, FeedService};
use cortile::application::follows::FollowService;
use cortile::application::pagination::PageWindow;
use cortile::application::posts::{EditOutcome, PostInput, PostService, PublishError};
use cortile::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, CreateUserParams,
    FollowsRepo, GroupsRepo, PostFeedCriteria, PostsRepo, PostsWriteRepo, RepoError, SessionsRepo,
    StoredCredentials, UpdatePostParams, UsersRepo,
};
use cortile::domain::entities::{
    CommentRecord, FeedPost, GroupRecord, PostRecord, SessionRecord, UserRecord,
};

#[derive(Default)]
struct InMemoryStore {
    users: Mutex<Vec<(UserRecord, Vec<u8>, Vec<u8>)>>,
    groups: Mutex<Vec<GroupRecord>>,
    posts: Mutex<Vec<PostRecord>>,
    comments: Mutex<Vec<CommentRecord>>,
    follows: Mutex<HashSet<(Uuid, Uuid)>>,
    sessions: Mutex<Vec<SessionRecord>>,
    clock_seq: Mutex<i64>,
}

impl InMemoryStore {
    fn next_time(&self) -> OffsetDateTime {
        let mut seq = self.clock_seq.lock().unwrap();
        *seq += 1;
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap() + Duration::seconds(*seq)
    }

    fn username_of(&self, id: Uuid) -> String {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|(user, _, _)| user.id == id)
            .map(|(user, _, _)| user.username.clone())
            .expect("author exists")
    }

    fn group_of(&self, id: Option<Uuid>) -> (Option<String>, Option<String>) {
        let Some(id) = id else {
            return (None, None);
        };
        let groups = self.groups.lock().unwrap();
        let group = groups.iter().find(|group| group.id == id);
        (
            group.map(|group| group.title.clone()),
            group.map(|group| group.slug.clone()),
        )
    }

    fn feed_post(&self, record: &PostRecord) -> FeedPost {
        let (group_title, group_slug) = self.group_of(record.group_id);
        FeedPost {
            id: record.id,
            text: record.text.clone(),
            image_path: record.image_path.clone(),
            published_at: record.published_at,
            author_id: record.author_id,
            author_username: self.username_of(record.author_id),
            group_title,
            group_slug,
        }
    }

    fn matching_posts(&self, criteria: &PostFeedCriteria) -> Vec<PostRecord> {
        let follows = self.follows.lock().unwrap();
        let mut records: Vec<PostRecord> = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|post| {
                criteria.author.is_none_or(|author| post.author_id == author)
                    && criteria
                        .group
                        .is_none_or(|group| post.group_id == Some(group))
                    && criteria
                        .followed_by
                        .is_none_or(|user| follows.contains(&(user, post.author_id)))
            })
            .cloned()
            .collect();

        records.sort_by(|left, right| {
            right
                .published_at
                .cmp(&left.published_at)
                .then(right.id.cmp(&left.id))
        });
        records
    }
}

#[async_trait]
impl UsersRepo for InMemoryStore {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut users = self.users.lock().unwrap();
        if users
            .iter()
            .any(|(user, _, _)| user.username == params.username)
        {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }

        let user = UserRecord {
            id: Uuid::new_v4(),
            username: params.username,
            joined_at: self.next_time(),
        };
        users.push((user.clone(), params.password_salt, params.password_digest));
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|(user, _, _)| user.username == username)
            .map(|(user, _, _)| user.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|(user, _, _)| user.id == id)
            .map(|(user, _, _)| user.clone()))
    }

    async fn find_credentials(
        &self,
        username: &str,
    ) -> Result<Option<StoredCredentials>, RepoError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|(user, _, _)| user.username == username)
            .map(|(user, salt, digest)| StoredCredentials {
                user: user.clone(),
                password_salt: salt.clone(),
                password_digest: digest.clone(),
            }))
    }
}

#[async_trait]
impl GroupsRepo for InMemoryStore {
    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let group = GroupRecord {
            id: Uuid::new_v4(),
            title: params.title,
            slug: params.slug,
            description: params.description,
            created_at: self.next_time(),
        };
        self.groups.lock().unwrap().push(group.clone());
        Ok(group)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .iter()
            .find(|group| group.slug == slug)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .iter()
            .find(|group| group.id == id)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<GroupRecord>, RepoError> {
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .iter()
            .any(|group| group.slug == slug))
    }
}

#[async_trait]
impl PostsRepo for InMemoryStore {
    async fn list_feed(
        &self,
        criteria: &PostFeedCriteria,
        window: PageWindow,
    ) -> Result<Vec<FeedPost>, RepoError> {
        Ok(self
            .matching_posts(criteria)
            .iter()
            .skip(window.offset as usize)
            .take(window.limit as usize)
            .map(|record| self.feed_post(record))
            .collect())
    }

    async fn count_feed(&self, criteria: &PostFeedCriteria) -> Result<u64, RepoError> {
        Ok(self.matching_posts(criteria).len() as u64)
    }

    async fn find_feed_post(&self, id: Uuid) -> Result<Option<FeedPost>, RepoError> {
        let record = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .find(|post| post.id == id)
            .cloned();
        Ok(record.map(|record| self.feed_post(&record)))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .find(|post| post.id == id)
            .cloned())
    }
}

#[async_trait]
impl PostsWriteRepo for InMemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let record = PostRecord {
            id: Uuid::new_v4(),
            author_id: params.author_id,
            group_id: params.group_id,
            text: params.text,
            image_path: params.image_path,
            published_at: self.next_time(),
        };
        self.posts.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut posts = self.posts.lock().unwrap();
        let post = posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;

        post.text = params.text;
        post.group_id = params.group_id;
        post.image_path = params.image_path;
        Ok(post.clone())
    }
}

#[async_trait]
impl CommentsRepo for InMemoryStore {
    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let record = CommentRecord {
            id: Uuid::new_v4(),
            post_id: params.post_id,
            author_id: params.author_id,
            author_username: self.username_of(params.author_id),
            text: params.text,
            created_at: self.next_time(),
        };
        self.comments.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError> {
        let mut records: Vec<CommentRecord> = self
            .comments
            .lock()
            .unwrap()
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect();
        records.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(records)
    }
}

#[async_trait]
impl FollowsRepo for InMemoryStore {
    async fn insert_edge(&self, follower: Uuid, author: Uuid) -> Result<bool, RepoError> {
        Ok(self.follows.lock().unwrap().insert((follower, author)))
    }

    async fn delete_edge(&self, follower: Uuid, author: Uuid) -> Result<bool, RepoError> {
        Ok(self.follows.lock().unwrap().remove(&(follower, author)))
    }

    async fn edge_exists(&self, follower: Uuid, author: Uuid) -> Result<bool, RepoError> {
        Ok(self.follows.lock().unwrap().contains(&(follower, author)))
    }
}

#[async_trait]
impl SessionsRepo for InMemoryStore {
    async fn insert_session(&self, record: SessionRecord) -> Result<(), RepoError> {
        self.sessions.lock().unwrap().push(record);
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>, RepoError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|session| session.id == id)
            .cloned())
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), RepoError> {
        self.sessions
            .lock()
            .unwrap()
            .retain(|session| session.id != id);
        Ok(())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|session| session.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

struct Fixture {
    store: Arc<InMemoryStore>,
    feed: FeedService,
    follows: FollowService,
    posts: PostService,
    accounts: AccountService,
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemoryStore::default());
    Fixture {
        feed: FeedService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        ),
        follows: FollowService::new(store.clone()),
        posts: PostService::new(store.clone(), store.clone(), store.clone(), store.clone()),
        accounts: AccountService::new(store.clone(), store.clone()),
        store,
    }
}

impl Fixture {
    async fn user(&self, username: &str) -> UserRecord {
        self.store
            .create_user(CreateUserParams {
                username: username.to_string(),
                password_salt: vec![0; 16],
                password_digest: vec![0; 32],
            })
            .await
            .expect("user created")
    }

    async fn group(&self, title: &str, slug: &str) -> GroupRecord {
        self.store
            .create_group(CreateGroupParams {
                title: title.to_string(),
                slug: slug.to_string(),
                description: String::new(),
            })
            .await
            .expect("group created")
    }

    async fn post(
        &self,
        author: &UserRecord,
        group: Option<&GroupRecord>,
        text: &str,
    ) -> PostRecord {
        self.posts
            .create_post(
                author.id,
                PostInput {
                    text: text.to_string(),
                    group_id: group.map(|group| group.id),
                    image_path: None,
                },
            )
            .await
            .expect("post created")
    }
}

#[tokio::test]
async fn thirteen_posts_paginate_ten_then_three() {
    let fx = fixture();
    let author = fx.user("auth").await;
    let group = fx.group("Garden Club", "garden-club").await;

    for i in 0..13 {
        fx.post(&author, Some(&group), &format!("post number {i}"))
            .await;
    }

    let first = fx.feed.global_feed(None).await.expect("first page");
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.total_pages, 2);
    assert!(first.has_next());
    assert_eq!(first.items[0].text, "post number 12");

    let second = fx.feed.global_feed(Some("2")).await.expect("second page");
    assert_eq!(second.items.len(), 3);
    assert!(!second.has_next());
    assert_eq!(second.items[2].text, "post number 0");

    let group_page = fx
        .feed
        .group_feed("garden-club", Some("2"))
        .await
        .expect("group page");
    assert_eq!(group_page.page.items.len(), 3);

    let profile = fx
        .feed
        .profile_feed("auth", None, Some("2"))
        .await
        .expect("profile page");
    assert_eq!(profile.page.items.len(), 3);
    assert_eq!(profile.post_count, 13);
}

#[tokio::test]
async fn out_of_range_page_resolves_to_last() {
    let fx = fixture();
    let author = fx.user("auth").await;
    for i in 0..13 {
        fx.post(&author, None, &format!("post {i}")).await;
    }

    let page = fx.feed.global_feed(Some("99")).await.expect("clamped page");
    assert_eq!(page.number, 2);
    assert_eq!(page.items.len(), 3);

    let page = fx
        .feed
        .global_feed(Some("garbage"))
        .await
        .expect("first page");
    assert_eq!(page.number, 1);
    assert_eq!(page.items.len(), 10);
}

#[tokio::test]
async fn group_feed_never_leaks_other_groups() {
    let fx = fixture();
    let author = fx.user("auth").await;
    let garden = fx.group("Garden Club", "garden-club").await;
    let chess = fx.group("Chess Circle", "chess-circle").await;

    fx.post(&author, Some(&garden), "tomatoes are in").await;
    let stray = fx.post(&author, Some(&chess), "queen's gambit night").await;
    fx.post(&author, None, "ungrouped note").await;

    let page = fx
        .feed
        .group_feed("garden-club", None)
        .await
        .expect("garden feed");

    assert_eq!(page.page.items.len(), 1);
    assert!(
        page.page
            .items
            .iter()
            .all(|post| post.group_slug.as_deref() == Some("garden-club"))
    );
    assert!(page.page.items.iter().all(|post| post.id != stray.id));
}

#[tokio::test]
async fn unknown_group_and_user_are_not_found() {
    let fx = fixture();

    assert!(matches!(
        fx.feed.group_feed("missing", None).await,
        Err(FeedError::UnknownGroup)
    ));
    assert!(matches!(
        fx.feed.profile_feed("nobody", None, None).await,
        Err(FeedError::UnknownUser)
    ));
}

#[tokio::test]
async fn follow_feed_shows_followed_authors_only() {
    let fx = fixture();
    let reader = fx.user("reader").await;
    let author = fx.user("author").await;
    let bystander = fx.user("bystander").await;

    fx.follows
        .follow(reader.id, author.id)
        .await
        .expect("follow");
    let post = fx.post(&author, None, "a post for followers").await;

    let reader_feed = fx.feed.follow_feed(reader.id, None).await.expect("feed");
    assert_eq!(reader_feed.items.len(), 1);
    assert_eq!(reader_feed.items[0].id, post.id);

    let bystander_feed = fx
        .feed
        .follow_feed(bystander.id, None)
        .await
        .expect("empty feed");
    assert!(bystander_feed.items.is_empty());
    assert_eq!(bystander_feed.total_pages, 1);
}

#[tokio::test]
async fn follow_feed_is_empty_when_following_nobody() {
    let fx = fixture();
    let reader = fx.user("reader").await;
    let author = fx.user("author").await;
    fx.post(&author, None, "unseen").await;

    let page = fx.feed.follow_feed(reader.id, None).await.expect("feed");
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn follow_is_idempotent() {
    let fx = fixture();
    let reader = fx.user("reader").await;
    let author = fx.user("author").await;

    fx.follows
        .follow(reader.id, author.id)
        .await
        .expect("first");
    fx.follows
        .follow(reader.id, author.id)
        .await
        .expect("second");

    assert_eq!(fx.store.follows.lock().unwrap().len(), 1);
    assert!(
        fx.follows
            .is_following(reader.id, author.id)
            .await
            .expect("flag")
    );
}

#[tokio::test]
async fn unfollow_missing_edge_is_a_noop() {
    let fx = fixture();
    let reader = fx.user("reader").await;
    let author = fx.user("author").await;

    fx.follows
        .unfollow(reader.id, author.id)
        .await
        .expect("noop unfollow");
    assert!(fx.store.follows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn self_follow_never_creates_an_edge() {
    let fx = fixture();
    let user = fx.user("solo").await;

    fx.follows.follow(user.id, user.id).await.expect("ignored");
    assert!(fx.store.follows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn profile_feed_reports_follow_flag() {
    let fx = fixture();
    let reader = fx.user("reader").await;
    let author = fx.user("author").await;
    fx.post(&author, None, "hello").await;

    let before = fx
        .feed
        .profile_feed("author", Some(reader.id), None)
        .await
        .expect("profile");
    assert!(!before.viewer_follows);

    fx.follows
        .follow(reader.id, author.id)
        .await
        .expect("follow");

    let after = fx
        .feed
        .profile_feed("author", Some(reader.id), None)
        .await
        .expect("profile");
    assert!(after.viewer_follows);
    assert_eq!(after.post_count, 1);

    // An author never sees a follow affordance on their own profile.
    let own = fx
        .feed
        .profile_feed("author", Some(author.id), None)
        .await
        .expect("own profile");
    assert!(!own.viewer_follows);
}

#[tokio::test]
async fn empty_post_text_is_rejected_without_a_write() {
    let fx = fixture();
    let author = fx.user("auth").await;

    let err = fx
        .posts
        .create_post(
            author.id,
            PostInput {
                text: "   ".to_string(),
                group_id: None,
                image_path: None,
            },
        )
        .await
        .expect_err("blank text rejected");

    assert!(matches!(err, PublishError::Validation(_)));
    assert!(fx.store.posts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_group_selection_is_a_field_error() {
    let fx = fixture();
    let author = fx.user("auth").await;

    let err = fx
        .posts
        .create_post(
            author.id,
            PostInput {
                text: "a fine post".to_string(),
                group_id: Some(Uuid::new_v4()),
                image_path: None,
            },
        )
        .await
        .expect_err("ghost group rejected");

    assert!(matches!(err, PublishError::Validation(_)));
}

#[tokio::test]
async fn non_author_edit_leaves_the_post_unchanged() {
    let fx = fixture();
    let author = fx.user("author").await;
    let intruder = fx.user("intruder").await;
    let post = fx.post(&author, None, "original text").await;

    let outcome = fx
        .posts
        .edit_post(
            intruder.id,
            post.id,
            PostInput {
                text: "hijacked".to_string(),
                group_id: None,
                image_path: None,
            },
        )
        .await
        .expect("edit resolves");

    assert!(matches!(outcome, EditOutcome::NotAuthor { .. }));
    let stored = fx.store.posts.lock().unwrap()[0].clone();
    assert_eq!(stored.text, "original text");
    assert_eq!(stored.author_id, author.id);
}

#[tokio::test]
async fn author_edit_rewrites_text_and_preserves_authorship() {
    let fx = fixture();
    let author = fx.user("author").await;
    let group = fx.group("Garden Club", "garden-club").await;
    let post = fx.post(&author, None, "original text").await;

    let outcome = fx
        .posts
        .edit_post(
            author.id,
            post.id,
            PostInput {
                text: "revised text".to_string(),
                group_id: Some(group.id),
                image_path: None,
            },
        )
        .await
        .expect("edit resolves");

    let EditOutcome::Updated(updated) = outcome else {
        panic!("author edit should update");
    };
    assert_eq!(updated.text, "revised text");
    assert_eq!(updated.group_id, Some(group.id));
    assert_eq!(updated.author_id, author.id);
    assert_eq!(updated.id, post.id);
}

#[tokio::test]
async fn comments_append_in_order() {
    let fx = fixture();
    let author = fx.user("author").await;
    let commenter = fx.user("commenter").await;
    let post = fx.post(&author, None, "discuss").await;

    fx.posts
        .add_comment(commenter.id, post.id, "first!")
        .await
        .expect("first comment");
    fx.posts
        .add_comment(author.id, post.id, "thanks for reading")
        .await
        .expect("second comment");

    let detail = fx
        .feed
        .post_detail(post.id)
        .await
        .expect("detail")
        .expect("post exists");

    assert_eq!(detail.comments.len(), 2);
    assert_eq!(detail.comments[0].text, "first!");
    assert_eq!(detail.comments[1].author_username, "author");
    assert_eq!(detail.author_post_count, 1);
}

#[tokio::test]
async fn commenting_on_a_missing_post_fails_cleanly() {
    let fx = fixture();
    let commenter = fx.user("commenter").await;

    let err = fx
        .posts
        .add_comment(commenter.id, Uuid::new_v4(), "into the void")
        .await
        .expect_err("missing post");
    assert!(matches!(err, PublishError::PostNotFound));
    assert!(fx.store.comments.lock().unwrap().is_empty());
}

#[tokio::test]
async fn post_detail_for_unknown_id_is_none() {
    let fx = fixture();
    assert!(
        fx.feed
            .post_detail(Uuid::new_v4())
            .await
            .expect("detail resolves")
            .is_none()
    );
}

#[tokio::test]
async fn signup_login_logout_round_trip() {
    let fx = fixture();

    let issued = fx
        .accounts
        .signup("marta", "correct-horse")
        .await
        .expect("signup");
    assert_eq!(issued.user.username, "marta");

    let resolved = fx
        .accounts
        .resolve(&issued.cookie_value)
        .await
        .expect("resolve")
        .expect("session valid");
    assert_eq!(resolved.id, issued.user.id);

    assert!(matches!(
        fx.accounts.signup("marta", "another-pass").await,
        Err(AccountError::UsernameTaken)
    ));
    assert!(matches!(
        fx.accounts.login("marta", "wrong-password").await,
        Err(AccountError::InvalidCredentials)
    ));

    let relogin = fx
        .accounts
        .login("marta", "correct-horse")
        .await
        .expect("login");
    assert_eq!(relogin.user.id, issued.user.id);

    fx.accounts
        .logout(&issued.cookie_value)
        .await
        .expect("logout");
    assert!(
        fx.accounts
            .resolve(&issued.cookie_value)
            .await
            .expect("resolve after logout")
            .is_none()
    );
}
