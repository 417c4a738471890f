//! Response cache middleware for the global feed route.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument};

use super::config::CacheConfig;
use super::keys::PageKey;
use super::store::{CachedPage, PageCache};

const MAX_CACHED_BODY_BYTES: usize = 1024 * 1024;

/// Shared cache state for the middleware layer.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub pages: Arc<PageCache>,
}

/// Serve `GET` requests from the page cache, storing fresh 200 responses.
///
/// Responses that set cookies are never stored: the cached page must be
/// identical for every viewer, and a `Set-Cookie` header would leak one
/// visitor's session to the next.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn feed_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enabled {
        return next.run(request).await;
    }

    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let key = PageKey::new(
        &cache.config.key_prefix,
        request.uri().path(),
        request.uri().query().unwrap_or(""),
    );

    if let Some(cached) = cache.pages.get(&key) {
        debug!(cache = "feed", outcome = "hit", "serving cached response");
        return build_response(cached);
    }

    debug!(cache = "feed", outcome = "miss", "executing handler");

    let response = next.run(request).await;

    if !should_store_page(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    cache.pages.insert(
        key,
        CachedPage {
            status: parts.status.as_u16(),
            headers: parts
                .headers
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|text| (name.to_string(), text.to_string()))
                })
                .collect(),
            body: bytes.clone(),
        },
    );

    Response::from_parts(parts, Body::from(bytes))
}

fn should_store_page(response: &Response) -> bool {
    response.status() == StatusCode::OK && !response.headers().contains_key(header::SET_COOKIE)
}

fn build_response(cached: CachedPage) -> Response {
    let mut builder = Response::builder().status(cached.status);

    for (name, value) in cached.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_plain_ok_responses() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .body(Body::empty())
            .unwrap();
        assert!(should_store_page(&response));
    }

    #[test]
    fn skips_non_ok_responses() {
        let response = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap();
        assert!(!should_store_page(&response));
    }

    #[test]
    fn skips_responses_that_set_cookies() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::SET_COOKIE, "cortile_session=abc")
            .body(Body::empty())
            .unwrap();
        assert!(!should_store_page(&response));
    }
}
