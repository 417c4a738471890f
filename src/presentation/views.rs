use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::application::error::{ErrorReport, HttpError};
use crate::application::pagination::Page;
use crate::domain::entities::{CommentRecord, FeedPost, GroupRecord, UserRecord};
use crate::domain::forms::FieldErrors;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response() -> Response {
    let view = LayoutContext::new(site_chrome(), ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

#[derive(Clone)]
pub struct BrandView {
    pub title: String,
    pub href: String,
}

#[derive(Clone)]
pub struct NavLink {
    pub label: String,
    pub href: String,
}

#[derive(Clone)]
pub struct LayoutChrome {
    pub brand: BrandView,
    pub links: Vec<NavLink>,
}

/// The fixed page chrome. Deliberately identical for every viewer, signed in
/// or not: the cached global feed is shared across viewers, so nothing
/// user-specific may render on cacheable pages.
pub fn site_chrome() -> LayoutChrome {
    LayoutChrome {
        brand: BrandView {
            title: "Cortile".to_string(),
            href: "/".to_string(),
        },
        links: vec![
            NavLink {
                label: "Feed".to_string(),
                href: "/".to_string(),
            },
            NavLink {
                label: "Following".to_string(),
                href: "/follow".to_string(),
            },
            NavLink {
                label: "New post".to_string(),
                href: "/create".to_string(),
            },
            NavLink {
                label: "Sign in".to_string(),
                href: "/auth/login".to_string(),
            },
        ],
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub brand: BrandView,
    pub links: Vec<NavLink>,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            brand: chrome.brand,
            links: chrome.links,
            content,
        }
    }
}

#[derive(Clone)]
pub struct GroupBadge {
    pub title: String,
    pub slug: String,
}

#[derive(Clone)]
pub struct PostCardView {
    pub id: String,
    pub text: String,
    pub author_username: String,
    pub group: Option<GroupBadge>,
    pub image_url: Option<String>,
    pub published: String,
}

impl PostCardView {
    pub fn from_record(record: &FeedPost) -> Self {
        let group = match (&record.group_title, &record.group_slug) {
            (Some(title), Some(slug)) => Some(GroupBadge {
                title: title.clone(),
                slug: slug.clone(),
            }),
            _ => None,
        };

        Self {
            id: record.id.to_string(),
            text: record.text.clone(),
            author_username: record.author_username.clone(),
            group,
            image_url: record
                .image_path
                .as_ref()
                .map(|path| format!("/uploads/{path}")),
            published: format_published(record.published_at),
        }
    }
}

#[derive(Clone)]
pub struct PaginationView {
    pub base_path: String,
    pub number: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub has_previous: bool,
    pub has_next: bool,
    pub previous_number: u32,
    pub next_number: u32,
}

impl PaginationView {
    pub fn from_page<T>(page: &Page<T>, base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            number: page.number,
            total_pages: page.total_pages,
            total_items: page.total_items,
            has_previous: page.has_previous(),
            has_next: page.has_next(),
            previous_number: page.number.saturating_sub(1).max(1),
            next_number: page.number.saturating_add(1).min(page.total_pages),
        }
    }
}

pub fn post_cards(page: &Page<FeedPost>) -> Vec<PostCardView> {
    page.items.iter().map(PostCardView::from_record).collect()
}

pub struct FeedContext {
    pub heading: String,
    pub posts: Vec<PostCardView>,
    pub pagination: PaginationView,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<FeedContext>,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<FeedContext>,
}

pub struct GroupContext {
    pub title: String,
    pub description: String,
    pub posts: Vec<PostCardView>,
    pub pagination: PaginationView,
}

impl GroupContext {
    pub fn new(group: &GroupRecord, page: &Page<FeedPost>) -> Self {
        Self {
            title: group.title.clone(),
            description: group.description.clone(),
            posts: post_cards(page),
            pagination: PaginationView::from_page(page, format!("/group/{}", group.slug)),
        }
    }
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupContext>,
}

pub struct ProfileContext {
    pub username: String,
    pub joined: String,
    pub post_count: u64,
    pub viewer_follows: bool,
    pub posts: Vec<PostCardView>,
    pub pagination: PaginationView,
}

impl ProfileContext {
    pub fn new(
        author: &UserRecord,
        post_count: u64,
        viewer_follows: bool,
        page: &Page<FeedPost>,
    ) -> Self {
        Self {
            username: author.username.clone(),
            joined: format_published(author.joined_at),
            post_count,
            viewer_follows,
            posts: post_cards(page),
            pagination: PaginationView::from_page(page, format!("/profile/{}", author.username)),
        }
    }
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileContext>,
}

#[derive(Clone)]
pub struct CommentView {
    pub author_username: String,
    pub text: String,
    pub created: String,
}

impl CommentView {
    pub fn from_record(record: &CommentRecord) -> Self {
        Self {
            author_username: record.author_username.clone(),
            text: record.text.clone(),
            created: format_timestamp(record.created_at),
        }
    }
}

pub struct PostDetailContext {
    pub post: PostCardView,
    pub author_post_count: u64,
    pub comments: Vec<CommentView>,
    pub comment_errors: Vec<FieldErrorView>,
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailContext>,
}

#[derive(Clone)]
pub struct FieldErrorView {
    pub field: String,
    pub message: String,
}

pub fn field_error_views(errors: &FieldErrors) -> Vec<FieldErrorView> {
    errors
        .iter()
        .map(|err| FieldErrorView {
            field: err.field.to_string(),
            message: err.message.clone(),
        })
        .collect()
}

#[derive(Clone)]
pub struct GroupOptionView {
    pub id: String,
    pub title: String,
    pub selected: bool,
}

pub struct PostFormContext {
    pub heading: String,
    pub action: String,
    pub text_value: String,
    pub groups: Vec<GroupOptionView>,
    pub current_image: Option<String>,
    pub errors: Vec<FieldErrorView>,
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormContext>,
}

pub struct AuthFormContext {
    pub heading: String,
    pub action: String,
    pub submit_label: String,
    pub username_value: String,
    pub next: String,
    pub errors: Vec<FieldErrorView>,
    pub alternate_label: String,
    pub alternate_href: String,
}

#[derive(Template)]
#[template(path = "auth_form.html")]
pub struct AuthFormTemplate {
    pub view: LayoutContext<AuthFormContext>,
}

pub struct ErrorPageView {
    pub status: u16,
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            status: 404,
            title: "Page not found".to_string(),
            message: "Nothing lives at this address. The courtyard is large; try the feed."
                .to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

fn format_published(at: OffsetDateTime) -> String {
    let format = format_description!("[month repr:short] [day padding:none], [year]");
    at.format(&format).unwrap_or_else(|_| at.to_string())
}

fn format_timestamp(at: OffsetDateTime) -> String {
    let format =
        format_description!("[month repr:short] [day padding:none], [year] [hour]:[minute]");
    at.format(&format).unwrap_or_else(|_| at.to_string())
}
