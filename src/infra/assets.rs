//! Embedded static asset serving.

use axum::{
    body::Body,
    extract::Path,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use include_dir::{Dir, include_dir};

use crate::application::error::ErrorReport;

static STATIC_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

/// Serve files embedded from the `static/` directory at build time.
pub async fn serve_static(path: Option<Path<String>>) -> Response {
    const SOURCE: &str = "infra::assets::serve_static";

    let candidate = match path {
        Some(Path(value)) => value.trim_start_matches('/').to_string(),
        None => String::new(),
    };

    if candidate.is_empty() || candidate.ends_with('/') || candidate.contains("..") {
        return not_found_response(SOURCE);
    }

    let Some(file) = STATIC_ASSETS.get_file(&candidate) else {
        return not_found_response(SOURCE);
    };

    let mime = mime_guess::from_path(&candidate).first_or_octet_stream();
    let mut response = Response::new(Body::from(file.contents()));
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );
    response
}

fn not_found_response(source: &'static str) -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    ErrorReport::from_message(source, StatusCode::NOT_FOUND, "Static asset not found")
        .attach(&mut response);
    response
}
