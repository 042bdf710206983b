use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};

use super::parser::parse_feed;
use super::types::NewsItem;
use crate::app::FeedSource;
use crate::error::{check_status, FetchError};
use crate::pipeline::Fetcher;

// Some publishers refuse requests without a browser User-Agent.
const FEED_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

pub struct FeedClient {
    client: reqwest::Client,
    feeds: Vec<FeedSource>,
    entries_per_feed: usize,
}

impl FeedClient {
    pub fn new(feeds: Vec<FeedSource>, entries_per_feed: usize, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/rss+xml, application/atom+xml, application/xml, text/xml, */*"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(FEED_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            feeds,
            entries_per_feed,
        })
    }

    /// The first entries of one feed, minus those without a link.
    pub async fn fetch_feed(&self, feed: &FeedSource) -> Result<Vec<NewsItem>, FetchError> {
        let url = feed.url.as_str();
        tracing::info!("[RSS] Fetching {} from {}", feed.name, url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::request(url, e))?;

        let body = check_status(response, url)?
            .text()
            .await
            .map_err(|e| FetchError::request(url, e))?;

        let entries = parse_feed(&body)?;
        let items: Vec<NewsItem> = entries
            .into_iter()
            .take(self.entries_per_feed)
            .filter(|entry| !entry.link.is_empty())
            .map(|entry| NewsItem {
                source: feed.name.clone(),
                title: entry.title,
                link: entry.link,
            })
            .collect();

        tracing::info!("[RSS] {} entries from {}", items.len(), feed.name);
        Ok(items)
    }

    /// All feeds fetched concurrently, concatenated in configured order.
    /// A failing feed contributes nothing; the fetch fails only if every
    /// feed failed.
    pub async fn fetch_all(&self) -> Result<Vec<NewsItem>, FetchError> {
        let results = join_all(self.feeds.iter().map(|feed| self.fetch_feed(feed))).await;

        let mut news = Vec::new();
        let mut failed = 0;
        for (feed, result) in self.feeds.iter().zip(results) {
            match result {
                Ok(items) => news.extend(items),
                Err(e) => {
                    failed += 1;
                    tracing::warn!("[RSS] Error fetching feed {}: {}", feed.name, e);
                }
            }
        }

        if failed > 0 && failed == self.feeds.len() {
            return Err(FetchError::Empty("news feeds"));
        }

        tracing::info!(
            "[RSS] Collected {} items from {}/{} feeds",
            news.len(),
            self.feeds.len() - failed,
            self.feeds.len()
        );
        Ok(news)
    }
}

#[async_trait]
impl Fetcher<NewsItem> for FeedClient {
    async fn fetch(&self) -> Result<Vec<NewsItem>, FetchError> {
        self.fetch_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_upstream;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::time::Instant;

    fn rss(count: usize) -> String {
        let items: String = (0..count)
            .map(|i| {
                let link = if i == 1 {
                    String::new()
                } else {
                    format!("<link>https://a.example/{}</link>", i)
                };
                format!("<item><title>A{}</title>{}</item>", i, link)
            })
            .collect();
        format!(r#"<rss version="2.0"><channel><title>A</title>{}</channel></rss>"#, items)
    }

    const ATOM: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom">
<entry><title>B0</title><link href="https://b.example/0"/></entry>
</feed>"#;

    fn feed(name: &str, base: &str, path: &str) -> FeedSource {
        FeedSource {
            name: name.to_string(),
            url: format!("{}{}", base, path),
        }
    }

    async fn upstream() -> String {
        let router = Router::new()
            .route("/a.xml", get(|| async { rss(8) }))
            .route("/b.xml", get(|| async { ATOM }))
            .route("/down.xml", get(|| async { StatusCode::BAD_GATEWAY }))
            .route("/html", get(|| async { "<html><body>nope</body></html>" }))
            .route(
                "/slow.xml",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    rss(1)
                }),
            );
        spawn_upstream(router).await
    }

    #[tokio::test]
    async fn test_caps_entries_and_drops_missing_links() {
        let base = upstream().await;
        let client =
            FeedClient::new(vec![feed("A", &base, "/a.xml")], 5, Duration::from_secs(5)).unwrap();

        let items = client.fetch().await.unwrap();
        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["A0", "A2", "A3", "A4"]);
        assert!(items.iter().all(|i| i.source == "A"));
    }

    #[tokio::test]
    async fn test_failing_feeds_are_skipped_and_order_is_kept() {
        let base = upstream().await;
        let feeds = vec![
            feed("Down", &base, "/down.xml"),
            feed("B", &base, "/b.xml"),
            feed("Html", &base, "/html"),
            feed("A", &base, "/a.xml"),
        ];
        let client = FeedClient::new(feeds, 5, Duration::from_secs(5)).unwrap();

        let items = client.fetch().await.unwrap();
        let sources: Vec<_> = items.iter().map(|i| i.source.as_str()).collect();
        assert_eq!(sources, vec!["B", "A", "A", "A", "A"]);
        assert_eq!(items[0].link, "https://b.example/0");
    }

    #[tokio::test]
    async fn test_every_feed_failing_is_an_error() {
        let base = upstream().await;
        let feeds = vec![feed("Down", &base, "/down.xml"), feed("Html", &base, "/html")];
        let client = FeedClient::new(feeds, 5, Duration::from_secs(5)).unwrap();

        assert!(matches!(
            client.fetch().await.unwrap_err(),
            FetchError::Empty(_)
        ));
    }

    #[tokio::test]
    async fn test_slow_feed_times_out_without_holding_up_others() {
        let base = upstream().await;
        let slow = feed("Slow", &base, "/slow.xml");
        let client = FeedClient::new(
            vec![slow.clone(), feed("B", &base, "/b.xml")],
            5,
            Duration::from_millis(300),
        )
        .unwrap();

        let started = Instant::now();
        let err = client.fetch_feed(&slow).await.unwrap_err();
        assert!(err.is_timeout(), "unexpected error: {}", err);

        let items = client.fetch().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, "B");
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
