//! End-to-end behavior of the global feed response cache: stale reads inside
//! the TTL, recomputation after expiry, and explicit invalidation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode, Uri, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use tower::ServiceExt;

use cortile::cache::{CacheConfig, CacheState, PageCache, feed_cache_layer};

#[derive(Clone)]
struct FeedState {
    posts: Arc<Mutex<Vec<String>>>,
}

async fn render_feed(State(state): State<FeedState>, uri: Uri) -> Response {
    let posts = state.posts.lock().unwrap();
    let body = format!("query={}\n{}", uri.query().unwrap_or(""), posts.join("\n"));
    (StatusCode::OK, body).into_response()
}

async fn render_feed_with_cookie(State(state): State<FeedState>, uri: Uri) -> Response {
    let mut response = render_feed(State(state), uri).await;
    response.headers_mut().insert(
        header::SET_COOKIE,
        "cortile_session=abc".parse().expect("header value"),
    );
    response
}

fn cache_state(config: CacheConfig) -> CacheState {
    CacheState {
        pages: Arc::new(PageCache::new(&config)),
        config,
    }
}

fn feed_router(posts: Arc<Mutex<Vec<String>>>, cache: CacheState) -> Router {
    Router::new()
        .route("/", get(render_feed))
        .layer(middleware::from_fn_with_state(cache, feed_cache_layer))
        .with_state(FeedState { posts })
}

async fn fetch(router: &Router, uri: &str) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    (status, String::from_utf8(bytes.to_vec()).expect("utf8 body"))
}

#[tokio::test]
async fn reads_within_ttl_are_byte_identical_despite_mutation() {
    let posts = Arc::new(Mutex::new(vec!["first post".to_string()]));
    let cache = cache_state(CacheConfig::default());
    let router = feed_router(posts.clone(), cache);

    let (status, before) = fetch(&router, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(before.contains("first post"));

    // Simulate a deletion between the two reads.
    posts.lock().unwrap().clear();

    let (_, after) = fetch(&router, "/").await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn explicit_invalidation_forces_recomputation() {
    let posts = Arc::new(Mutex::new(vec!["first post".to_string()]));
    let cache = cache_state(CacheConfig::default());
    let router = feed_router(posts.clone(), cache.clone());

    let (_, before) = fetch(&router, "/").await;
    posts.lock().unwrap().clear();

    cache.pages.clear();

    let (_, after) = fetch(&router, "/").await;
    assert_ne!(before, after);
    assert!(!after.contains("first post"));
}

#[tokio::test(start_paused = true)]
async fn expiry_recomputes_after_the_ttl_window() {
    let posts = Arc::new(Mutex::new(vec!["first post".to_string()]));
    let cache = cache_state(CacheConfig::default());
    let router = feed_router(posts.clone(), cache);

    let (_, before) = fetch(&router, "/").await;
    posts.lock().unwrap().push("second post".to_string());

    // Still inside the 20 second window: the stale page is served.
    tokio::time::advance(Duration::from_secs(10)).await;
    let (_, stale) = fetch(&router, "/").await;
    assert_eq!(before, stale);

    tokio::time::advance(Duration::from_secs(11)).await;
    let (_, fresh) = fetch(&router, "/").await;
    assert_ne!(before, fresh);
    assert!(fresh.contains("second post"));
}

#[tokio::test]
async fn pages_are_cached_per_query_string() {
    let posts = Arc::new(Mutex::new(vec!["first post".to_string()]));
    let cache = cache_state(CacheConfig::default());
    let router = feed_router(posts.clone(), cache);

    let (_, page_one) = fetch(&router, "/?page=1").await;
    let (_, page_two) = fetch(&router, "/?page=2").await;
    assert_ne!(page_one, page_two);

    // Both entries are live at once.
    posts.lock().unwrap().clear();
    let (_, page_one_again) = fetch(&router, "/?page=1").await;
    let (_, page_two_again) = fetch(&router, "/?page=2").await;
    assert_eq!(page_one, page_one_again);
    assert_eq!(page_two, page_two_again);
}

#[tokio::test]
async fn disabled_cache_passes_every_request_through() {
    let posts = Arc::new(Mutex::new(vec!["first post".to_string()]));
    let config = CacheConfig {
        enabled: false,
        ..Default::default()
    };
    let router = feed_router(posts.clone(), cache_state(config));

    let (_, before) = fetch(&router, "/").await;
    posts.lock().unwrap().clear();

    let (_, after) = fetch(&router, "/").await;
    assert_ne!(before, after);
}

#[tokio::test]
async fn responses_setting_cookies_are_never_stored() {
    let posts = Arc::new(Mutex::new(vec!["first post".to_string()]));
    let cache = cache_state(CacheConfig::default());

    let router = Router::new()
        .route("/", get(render_feed_with_cookie))
        .layer(middleware::from_fn_with_state(cache.clone(), feed_cache_layer))
        .with_state(FeedState {
            posts: posts.clone(),
        });

    let (_, before) = fetch(&router, "/").await;
    assert!(before.contains("first post"));
    assert!(cache.pages.is_empty());

    posts.lock().unwrap().clear();
    let (_, after) = fetch(&router, "/").await;
    assert_ne!(before, after);
}
