//! Handlers behind the login wall: publishing, commenting, and the follow
//! graph. Every successful write clears the feed cache before redirecting.

use axum::{
    extract::{Form, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::application::error::HttpError;
use crate::application::posts::{EditOutcome, PostInput, PublishError};
use crate::application::repos::{PostsRepo, UsersRepo};
use crate::domain::entities::PostRecord;
use crate::domain::forms::FieldErrors;
use crate::infra::uploads::UploadStorageError;
use crate::presentation::views::{
    CommentView, FeedContext, FollowTemplate, GroupOptionView, LayoutContext, PaginationView,
    PostCardView, PostDetailContext, PostDetailTemplate, PostFormContext, PostFormTemplate,
    field_error_views, post_cards, render_not_found_response, render_template_response,
    site_chrome,
};

use super::auth::CurrentUser;
use super::public::{HttpState, PageQuery, feed_error_to_response};

const SOURCE: &str = "infra::http::account";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommentForm {
    text: String,
}

/// Raw fields read from the multipart post form.
#[derive(Debug, Default)]
struct RawPostForm {
    text: String,
    group_raw: String,
    image: Option<(String, Bytes)>,
}

async fn read_post_form(mut multipart: Multipart) -> Result<RawPostForm, HttpError> {
    let mut form = RawPostForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Malformed form submission",
            err.to_string(),
        )
    })? {
        match field.name() {
            Some("text") => {
                form.text = field.text().await.map_err(read_failure)?;
            }
            Some("group") => {
                form.group_raw = field.text().await.map_err(read_failure)?;
            }
            Some("image") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(read_failure)?;
                if !filename.is_empty() && !data.is_empty() {
                    form.image = Some((filename, data));
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

fn read_failure(err: axum::extract::multipart::MultipartError) -> HttpError {
    HttpError::new(
        SOURCE,
        StatusCode::BAD_REQUEST,
        "Malformed form submission",
        err.to_string(),
    )
}

fn parse_group(raw: &str) -> Result<Option<Uuid>, FieldErrors> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    Uuid::try_parse(trimmed).map(Some).map_err(|_| {
        let mut errors = FieldErrors::new();
        errors.push("group", "Selected group does not exist");
        errors
    })
}

async fn post_form_context(
    state: &HttpState,
    heading: &str,
    action: String,
    text_value: String,
    selected_group: Option<Uuid>,
    current_image: Option<String>,
    errors: &FieldErrors,
) -> Result<PostFormContext, HttpError> {
    let groups = state.posts.group_choices().await.map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            &err,
        )
    })?;

    Ok(PostFormContext {
        heading: heading.to_string(),
        action,
        text_value,
        groups: groups
            .iter()
            .map(|group| GroupOptionView {
                id: group.id.to_string(),
                title: group.title.clone(),
                selected: selected_group == Some(group.id),
            })
            .collect(),
        current_image,
        errors: field_error_views(errors),
    })
}

fn render_post_form(context: PostFormContext, status: StatusCode) -> Response {
    render_template_response(
        PostFormTemplate {
            view: LayoutContext::new(site_chrome(), context),
        },
        status,
    )
}

async fn store_image(
    state: &HttpState,
    image: Option<(String, Bytes)>,
) -> Result<Option<String>, FieldErrors> {
    let Some((filename, data)) = image else {
        return Ok(None);
    };

    match state.upload_storage.store(&filename, data).await {
        Ok(stored) => Ok(Some(stored.stored_path)),
        Err(UploadStorageError::PayloadTooLarge { limit }) => {
            let mut errors = FieldErrors::new();
            errors.push("image", format!("Image exceeds the {limit} byte limit"));
            Err(errors)
        }
        Err(err) => {
            let mut errors = FieldErrors::new();
            errors.push("image", format!("Image could not be stored: {err}"));
            Err(errors)
        }
    }
}

pub async fn new_post_form(
    State(state): State<HttpState>,
    CurrentUser(_user): CurrentUser,
) -> Response {
    match post_form_context(
        &state,
        "New post",
        "/create".to_string(),
        String::new(),
        None,
        None,
        &FieldErrors::new(),
    )
    .await
    {
        Ok(context) => render_post_form(context, StatusCode::OK),
        Err(err) => err.into_response(),
    }
}

pub async fn create_post(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Response {
    let form = match read_post_form(multipart).await {
        Ok(form) => form,
        Err(err) => return err.into_response(),
    };

    let rerender = |errors: FieldErrors, state: HttpState, text: String, group: Option<Uuid>| async move {
        match post_form_context(
            &state,
            "New post",
            "/create".to_string(),
            text,
            group,
            None,
            &errors,
        )
        .await
        {
            Ok(context) => render_post_form(context, StatusCode::UNPROCESSABLE_ENTITY),
            Err(err) => err.into_response(),
        }
    };

    let group_id = match parse_group(&form.group_raw) {
        Ok(group_id) => group_id,
        Err(errors) => return rerender(errors, state, form.text, None).await,
    };

    let image_path = match store_image(&state, form.image).await {
        Ok(path) => path,
        Err(errors) => return rerender(errors, state, form.text, group_id).await,
    };

    match state
        .posts
        .create_post(
            user.id,
            PostInput {
                text: form.text.clone(),
                group_id,
                image_path,
            },
        )
        .await
    {
        Ok(_) => {
            state.invalidate_feed_cache();
            Redirect::to(&format!("/profile/{}", user.username)).into_response()
        }
        Err(PublishError::Validation(errors)) => rerender(errors, state, form.text, group_id).await,
        Err(err) => publish_error_response(err),
    }
}

pub async fn edit_post_form(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Response {
    let post = match load_post(&state, &id).await {
        Ok(Some(post)) => post,
        Ok(None) => return render_not_found_response(),
        Err(response) => return response,
    };

    if post.author_id != user.id {
        return Redirect::to(&format!("/posts/{}", post.id)).into_response();
    }

    match post_form_context(
        &state,
        "Edit post",
        format!("/posts/{}/edit", post.id),
        post.text.clone(),
        post.group_id,
        post.image_path.clone(),
        &FieldErrors::new(),
    )
    .await
    {
        Ok(context) => render_post_form(context, StatusCode::OK),
        Err(err) => err.into_response(),
    }
}

pub async fn edit_post(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Response {
    let post = match load_post(&state, &id).await {
        Ok(Some(post)) => post,
        Ok(None) => return render_not_found_response(),
        Err(response) => return response,
    };

    let form = match read_post_form(multipart).await {
        Ok(form) => form,
        Err(err) => return err.into_response(),
    };

    let action = format!("/posts/{}/edit", post.id);
    let rerender = |errors: FieldErrors,
                    state: HttpState,
                    action: String,
                    text: String,
                    group: Option<Uuid>,
                    image: Option<String>| async move {
        match post_form_context(&state, "Edit post", action, text, group, image, &errors).await {
            Ok(context) => render_post_form(context, StatusCode::UNPROCESSABLE_ENTITY),
            Err(err) => err.into_response(),
        }
    };

    let group_id = match parse_group(&form.group_raw) {
        Ok(group_id) => group_id,
        Err(errors) => {
            return rerender(
                errors,
                state,
                action,
                form.text,
                None,
                post.image_path.clone(),
            )
            .await;
        }
    };

    let image_path = match store_image(&state, form.image).await {
        Ok(path) => path,
        Err(errors) => {
            return rerender(
                errors,
                state,
                action,
                form.text,
                group_id,
                post.image_path.clone(),
            )
            .await;
        }
    };

    let replaced_image = image_path.is_some();

    match state
        .posts
        .edit_post(
            user.id,
            post.id,
            PostInput {
                text: form.text.clone(),
                group_id,
                image_path,
            },
        )
        .await
    {
        Ok(EditOutcome::Updated(updated)) => {
            if replaced_image
                && let Some(old) = post.image_path.as_deref()
                && updated.image_path.as_deref() != Some(old)
                && let Err(err) = state.upload_storage.delete(old).await
            {
                warn!(
                    target = SOURCE,
                    path = old,
                    error = %err,
                    "failed to remove replaced image"
                );
            }
            state.invalidate_feed_cache();
            Redirect::to(&format!("/posts/{}", updated.id)).into_response()
        }
        Ok(EditOutcome::NotAuthor { post_id }) => {
            Redirect::to(&format!("/posts/{post_id}")).into_response()
        }
        Err(PublishError::Validation(errors)) => {
            rerender(
                errors,
                state,
                action,
                form.text,
                group_id,
                post.image_path.clone(),
            )
            .await
        }
        Err(err) => publish_error_response(err),
    }
}

pub async fn add_comment(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Form(form): Form<CommentForm>,
) -> Response {
    let Ok(post_id) = Uuid::try_parse(&id) else {
        return render_not_found_response();
    };

    match state.posts.add_comment(user.id, post_id, &form.text).await {
        Ok(_) => {
            state.invalidate_feed_cache();
            Redirect::to(&format!("/posts/{post_id}")).into_response()
        }
        Err(PublishError::Validation(errors)) => {
            render_post_detail_with_errors(&state, post_id, errors).await
        }
        Err(PublishError::PostNotFound) => render_not_found_response(),
        Err(err) => publish_error_response(err),
    }
}

pub async fn follow_feed(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PageQuery>,
) -> Response {
    match state.feed.follow_feed(user.id, query.page.as_deref()).await {
        Ok(page) => {
            let content = FeedContext {
                heading: "Following".to_string(),
                posts: post_cards(&page),
                pagination: PaginationView::from_page(&page, "/follow"),
            };
            render_template_response(
                FollowTemplate {
                    view: LayoutContext::new(site_chrome(), content),
                },
                StatusCode::OK,
            )
        }
        Err(err) => feed_error_to_response(err),
    }
}

pub async fn follow_author(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(username): Path<String>,
) -> Response {
    let author = match resolve_author(&state, &username).await {
        Ok(author) => author,
        Err(response) => return response,
    };

    match state.follows.follow(user.id, author).await {
        Ok(()) => {
            state.invalidate_feed_cache();
            Redirect::to("/follow").into_response()
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub async fn unfollow_author(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(username): Path<String>,
) -> Response {
    let author = match resolve_author(&state, &username).await {
        Ok(author) => author,
        Err(response) => return response,
    };

    match state.follows.unfollow(user.id, author).await {
        Ok(()) => {
            state.invalidate_feed_cache();
            Redirect::to("/follow").into_response()
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn resolve_author(state: &HttpState, username: &str) -> Result<Uuid, Response> {
    match state.db.find_by_username(username).await {
        Ok(Some(author)) => Ok(author.id),
        Ok(None) => Err(render_not_found_response()),
        Err(err) => Err(HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            &err,
        )
        .into_response()),
    }
}

async fn load_post(state: &HttpState, raw_id: &str) -> Result<Option<PostRecord>, Response> {
    let Ok(post_id) = Uuid::try_parse(raw_id) else {
        return Ok(None);
    };

    PostsRepo::find_by_id(&*state.db, post_id).await.map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            &err,
        )
        .into_response()
    })
}

async fn render_post_detail_with_errors(
    state: &HttpState,
    post_id: Uuid,
    errors: FieldErrors,
) -> Response {
    match state.feed.post_detail(post_id).await {
        Ok(Some(detail)) => render_template_response(
            PostDetailTemplate {
                view: LayoutContext::new(
                    site_chrome(),
                    PostDetailContext {
                        post: PostCardView::from_record(&detail.post),
                        author_post_count: detail.author_post_count,
                        comments: detail.comments.iter().map(CommentView::from_record).collect(),
                        comment_errors: field_error_views(&errors),
                    },
                ),
            },
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        Ok(None) => render_not_found_response(),
        Err(err) => feed_error_to_response(err),
    }
}

fn publish_error_response(err: PublishError) -> Response {
    match err {
        PublishError::PostNotFound => render_not_found_response(),
        err => HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            &err,
        )
        .into_response(),
    }
}
