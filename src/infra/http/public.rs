use std::{io::ErrorKind, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{Path, Query, State},
    http::{
        HeaderValue, Request, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::{
    application::{
        accounts::AccountService,
        error::HttpError,
        feed::{FeedError, FeedService},
        follows::FollowService,
        posts::PostService,
    },
    cache::{CacheState, feed_cache_layer},
    infra::{
        assets,
        db::PostgresRepositories,
        http::auth::MaybeUser,
        uploads::{UploadStorage, UploadStorageError},
    },
    presentation::views::{
        CommentView, FeedContext, GroupContext, GroupTemplate, IndexTemplate, LayoutContext,
        PaginationView, PostCardView, PostDetailContext, PostDetailTemplate, ProfileContext,
        ProfileTemplate, post_cards, render_not_found_response, render_template_response,
        site_chrome,
    },
};

use super::{
    account, auth, db_health_response,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub follows: Arc<FollowService>,
    pub accounts: Arc<AccountService>,
    pub db: Arc<PostgresRepositories>,
    pub upload_storage: Arc<UploadStorage>,
    pub page_cache: Option<CacheState>,
}

impl HttpState {
    /// Drop every cached feed page. Called after successful writes so the
    /// TTL stays the only source of staleness under read-only load.
    pub fn invalidate_feed_cache(&self) {
        if let Some(cache) = &self.page_cache {
            cache.pages.clear();
        }
    }
}

pub fn build_router(state: HttpState, upload_body_limit: usize) -> Router {
    // Only the global feed is cached; every other page either varies per
    // viewer or is cheap enough to render on demand.
    let cached_routes = Router::new().route("/", get(index));
    let cached_routes = if let Some(cache_state) = state.page_cache.clone() {
        cached_routes.layer(middleware::from_fn_with_state(
            cache_state,
            feed_cache_layer,
        ))
    } else {
        cached_routes
    };

    let public_routes = Router::new()
        .route("/group/{slug}", get(group_feed))
        .route("/profile/{username}", get(profile))
        .route("/posts/{id}", get(post_detail))
        .route("/uploads/{*path}", get(serve_upload))
        .route("/static/{*path}", get(assets::serve_static))
        .route("/_health/db", get(public_health))
        .fallback(fallback_404);

    let account_routes = Router::new()
        .route("/create", get(account::new_post_form).post(account::create_post))
        .route(
            "/posts/{id}/edit",
            get(account::edit_post_form).post(account::edit_post),
        )
        .route("/posts/{id}/comment", post(account::add_comment))
        .route("/follow", get(account::follow_feed))
        .route("/profile/{username}/follow", post(account::follow_author))
        .route(
            "/profile/{username}/unfollow",
            post(account::unfollow_author),
        )
        .route("/auth/signup", get(auth::signup_form).post(auth::signup))
        .route("/auth/login", get(auth::login_form).post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .layer(axum::extract::DefaultBodyLimit::max(upload_body_limit));

    cached_routes
        .merge(public_routes)
        .merge(account_routes)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    pub page: Option<String>,
}

async fn index(State(state): State<HttpState>, Query(query): Query<PageQuery>) -> Response {
    match state.feed.global_feed(query.page.as_deref()).await {
        Ok(page) => {
            let content = FeedContext {
                heading: "Latest posts".to_string(),
                posts: post_cards(&page),
                pagination: PaginationView::from_page(&page, "/"),
            };
            render_template_response(
                IndexTemplate {
                    view: LayoutContext::new(site_chrome(), content),
                },
                StatusCode::OK,
            )
        }
        Err(err) => feed_error_to_response(err),
    }
}

async fn group_feed(
    State(state): State<HttpState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    match state.feed.group_feed(&slug, query.page.as_deref()).await {
        Ok(feed) => render_template_response(
            GroupTemplate {
                view: LayoutContext::new(site_chrome(), GroupContext::new(&feed.group, &feed.page)),
            },
            StatusCode::OK,
        ),
        Err(err) => feed_error_to_response(err),
    }
}

async fn profile(
    State(state): State<HttpState>,
    Path(username): Path<String>,
    MaybeUser(viewer): MaybeUser,
    Query(query): Query<PageQuery>,
) -> Response {
    let viewer_id = viewer.map(|user| user.id);

    match state
        .feed
        .profile_feed(&username, viewer_id, query.page.as_deref())
        .await
    {
        Ok(feed) => {
            let content = ProfileContext::new(
                &feed.author,
                feed.post_count,
                feed.viewer_follows,
                &feed.page,
            );
            render_template_response(
                ProfileTemplate {
                    view: LayoutContext::new(site_chrome(), content),
                },
                StatusCode::OK,
            )
        }
        Err(err) => feed_error_to_response(err),
    }
}

async fn post_detail(State(state): State<HttpState>, Path(id): Path<String>) -> Response {
    let Ok(post_id) = Uuid::try_parse(&id) else {
        return render_not_found_response();
    };

    match state.feed.post_detail(post_id).await {
        Ok(Some(detail)) => render_template_response(
            PostDetailTemplate {
                view: LayoutContext::new(
                    site_chrome(),
                    PostDetailContext {
                        post: PostCardView::from_record(&detail.post),
                        author_post_count: detail.author_post_count,
                        comments: detail.comments.iter().map(CommentView::from_record).collect(),
                        comment_errors: Vec::new(),
                    },
                ),
            },
            StatusCode::OK,
        ),
        Ok(None) => render_not_found_response(),
        Err(err) => feed_error_to_response(err),
    }
}

async fn serve_upload(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_upload";

    match state.upload_storage.read(&path).await {
        Ok(bytes) => build_upload_response(&path, bytes),
        Err(UploadStorageError::InvalidPath) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Upload not found",
            "The requested upload is not available",
        )
        .into_response(),
        Err(UploadStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Upload not found",
            "The requested upload is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored upload"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read uploaded file",
                err.to_string(),
            )
            .into_response()
        }
    }
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.db.health_check().await)
}

async fn fallback_404(_request: Request<Body>) -> Response {
    render_not_found_response()
}

pub(super) fn feed_error_to_response(err: FeedError) -> Response {
    match err {
        FeedError::UnknownGroup | FeedError::UnknownUser => {
            let report = crate::application::error::ErrorReport::from_message(
                "infra::http::public::feed_error_to_response",
                StatusCode::NOT_FOUND,
                err.to_string(),
            );
            let mut response = render_not_found_response();
            report.attach(&mut response);
            response
        }
        err => HttpError::from(err).into_response(),
    }
}

fn build_upload_response(path: &str, bytes: Bytes) -> Response {
    let mut response = Response::new(Body::from(bytes.clone()));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&bytes.len().to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
