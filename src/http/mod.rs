mod error;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::http::header::{ACCEPT, CONTENT_TYPE, ORIGIN};
use axum::http::{HeaderValue, Method, Request};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;

use crate::github::Repository;
use crate::hackernews::Story;
use crate::news::NewsItem;
use crate::pipeline::RefreshPipeline;
use crate::tickers::TickerQuote;

pub use error::{ApiError, ApiResult};

/// Shared by every handler; one pipeline per data source.
#[derive(Clone)]
pub struct AppState {
    pub github: Arc<RefreshPipeline<Repository>>,
    pub hackernews: Arc<RefreshPipeline<Story>>,
    pub news: Arc<RefreshPipeline<NewsItem>>,
    pub tickers: Arc<RefreshPipeline<TickerQuote>>,
}

pub fn router(state: AppState, allowed_hosts: &str) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/github/trending", get(handlers::github_trending))
        .route("/hackernews/top", get(handlers::hackernews_top))
        .route("/news", get(handlers::news))
        .route("/tickers", get(handlers::tickers))
        .with_state(state)
        .layer(cors_layer(allowed_hosts))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        method = %request.method(),
                        uri = %request.uri()
                    )
                })
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
}

/// `*` (or nothing) allows every origin. Otherwise each comma-separated
/// host is allowed over both https and http; entries that already carry a
/// scheme are used as they are.
pub fn cors_layer(allowed_hosts: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers([ORIGIN, CONTENT_TYPE, ACCEPT]);

    let hosts = allowed_hosts.trim();
    if hosts.is_empty() || hosts == "*" {
        return layer.allow_origin(Any);
    }

    let mut origins = Vec::new();
    for host in hosts.split(',').map(str::trim).filter(|h| !h.is_empty()) {
        let candidates = if host.starts_with("http://") || host.starts_with("https://") {
            vec![host.trim_end_matches('/').to_string()]
        } else {
            vec![format!("https://{}", host), format!("http://{}", host)]
        };
        for origin in candidates {
            match HeaderValue::from_str(&origin) {
                Ok(value) => origins.push(value),
                Err(e) => tracing::warn!("Ignoring invalid CORS origin '{}': {}", origin, e),
            }
        }
    }

    tracing::info!("CORS restricted to {} origins", origins.len());
    layer.allow_origin(AllowOrigin::list(origins))
}

pub async fn serve(addr: SocketAddr, router: Router) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutdown requested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, FreshnessWindow, MemoryCache};
    use crate::pipeline::testing::StubFetcher;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Harness {
        state: AppState,
        github_fetcher: Arc<StubFetcher<Repository>>,
        github_cache: Arc<MemoryCache<Repository>>,
        news_fetcher: Arc<StubFetcher<NewsItem>>,
    }

    fn memory<T: Clone + Send + Sync>(key: &str) -> Arc<MemoryCache<T>> {
        Arc::new(MemoryCache::new(
            key,
            Arc::new(FreshnessWindow::new(Duration::from_secs(60))),
        ))
    }

    fn repo(name: &str, stars: u64) -> Repository {
        Repository {
            author: "octo".to_string(),
            name: name.to_string(),
            stars,
            ..Repository::default()
        }
    }

    fn quote(symbol: &str, day_change: Option<f64>) -> TickerQuote {
        TickerQuote {
            symbol: symbol.to_string(),
            price: Some(10.0),
            day_change,
            week_change: None,
            year_change: None,
        }
    }

    fn harness() -> Harness {
        let github_fetcher = Arc::new(StubFetcher::new(vec![repo("fresh", 5)]));
        let github_cache = memory::<Repository>("github_repos");
        let news_fetcher = Arc::new(StubFetcher::failing());
        let tickers_fetcher = Arc::new(StubFetcher::new(vec![
            quote("UP", Some(5.0)),
            quote("NONE", None),
            quote("DOWN", Some(-12.0)),
        ]));
        let stories = Arc::new(StubFetcher::new(vec![Story {
            id: 1,
            title: "Hello".to_string(),
            kind: "story".to_string(),
            ..Story::default()
        }]));

        let state = AppState {
            github: Arc::new(RefreshPipeline::new(
                "GitHub",
                github_fetcher.clone(),
                github_cache.clone(),
            )),
            hackernews: Arc::new(RefreshPipeline::new(
                "HackerNews",
                stories,
                memory::<Story>("hn_stories"),
            )),
            news: Arc::new(RefreshPipeline::new(
                "RSS",
                news_fetcher.clone(),
                memory::<NewsItem>("rss_news"),
            )),
            tickers: Arc::new(RefreshPipeline::new(
                "Tickers",
                tickers_fetcher,
                memory::<TickerQuote>("tickers"),
            )),
        };

        Harness {
            state,
            github_fetcher,
            github_cache,
            news_fetcher,
        }
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let (status, body) = get_json(router(h.state, "*"), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["time"].as_str().is_some());
        assert!(body["version"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_cache_hit_serves_cached_records() {
        let h = harness();
        h.github_cache.put(&[repo("cached", 9)]).await.unwrap();

        let (status, body) = get_json(router(h.state.clone(), "*"), "/github/trending").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "cached");
        assert_eq!(body[0]["currentPeriodStars"], 0);
        assert_eq!(h.github_fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_query_bypasses_cache() {
        let h = harness();
        h.github_cache.put(&[repo("cached", 9)]).await.unwrap();

        let (status, body) =
            get_json(router(h.state.clone(), "*"), "/github/trending?refresh=true").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "fresh");
        assert_eq!(h.github_fetcher.calls(), 1);

        let (_, body) =
            get_json(router(h.state.clone(), "*"), "/github/trending?refresh=false").await;
        assert_eq!(body[0]["name"], "fresh");
        assert_eq!(h.github_fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_500_with_message() {
        let h = harness();
        let (status, body) = get_json(router(h.state, "*"), "/news").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["error"].as_str().unwrap();
        assert!(message.starts_with("Failed to fetch news"));
        assert_eq!(h.news_fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_upstream_timeout_is_500() {
        let base = crate::test_support::spawn_upstream(Router::new().route(
            "/trending",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "<html></html>"
            }),
        ))
        .await;
        let client = crate::github::TrendingClient::new(
            &format!("{}/trending", base),
            Duration::from_millis(200),
        )
        .unwrap();

        let mut state = harness().state;
        state.github = Arc::new(RefreshPipeline::<Repository>::new(
            "GitHub",
            Arc::new(client),
            memory::<Repository>("github_repos"),
        ));

        let started = std::time::Instant::now();
        let (status, body) = get_json(router(state, "*"), "/github/trending").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to fetch trending repositories"));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_hackernews_route() {
        let h = harness();
        let (status, body) = get_json(router(h.state, "*"), "/hackernews/top").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["title"], "Hello");
        assert_eq!(body[0]["type"], "story");
    }

    #[tokio::test]
    async fn test_tickers_sorted_by_day_change() {
        let h = harness();
        let (status, body) = get_json(router(h.state, "*"), "/tickers").await;
        assert_eq!(status, StatusCode::OK);
        let order: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|q| q["ticker"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(order, vec!["DOWN", "UP", "NONE"]);
    }

    async fn allow_origin(allowed_hosts: &str, origin: &str) -> Option<String> {
        let h = harness();
        let response = router(h.state, allowed_hosts)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, origin)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_cors_wildcard() {
        assert_eq!(
            allow_origin("*", "https://anywhere.example").await.as_deref(),
            Some("*")
        );
    }

    #[tokio::test]
    async fn test_cors_allow_list() {
        let hosts = "today.example, localhost:5173";
        assert_eq!(
            allow_origin(hosts, "https://today.example").await.as_deref(),
            Some("https://today.example")
        );
        assert_eq!(
            allow_origin(hosts, "http://localhost:5173").await.as_deref(),
            Some("http://localhost:5173")
        );
        assert_eq!(allow_origin(hosts, "https://evil.example").await, None);
    }
}
