use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use rand::Rng;
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;

use super::types::{ChartMeta, ChartRange, ChartResponse, TickerQuote};
use crate::app::TickersConfig;
use crate::cache::FreshnessWindow;
use crate::error::{check_status, FetchError};
use crate::pipeline::Fetcher;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:135.0) Gecko/20100101 Firefox/135.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.7; rv:135.0) Gecko/20100101 Firefox/135.0",
    "Mozilla/5.0 (X11; Linux i686; rv:135.0) Gecko/20100101 Firefox/135.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.3 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36 Edg/131.0.2903.86",
];

/// Browser identities sent to the quote endpoint. One is chosen at random on
/// construction and kept until [`UserAgentPool::rotate`] is called.
pub struct UserAgentPool {
    agents: &'static [&'static str],
    index: AtomicUsize,
}

impl UserAgentPool {
    pub fn new() -> Self {
        Self::with_agents(USER_AGENTS)
    }

    pub fn with_agents(agents: &'static [&'static str]) -> Self {
        let start = if agents.is_empty() {
            0
        } else {
            rand::thread_rng().gen_range(0..agents.len())
        };
        Self {
            agents,
            index: AtomicUsize::new(start),
        }
    }

    pub fn current(&self) -> &'static str {
        if self.agents.is_empty() {
            return "";
        }
        self.agents[self.index.load(Ordering::Relaxed) % self.agents.len()]
    }

    /// Switches to the next identity and returns it.
    pub fn rotate(&self) -> &'static str {
        if self.agents.is_empty() {
            return "";
        }
        let next = self.index.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        self.agents[next % self.agents.len()]
    }
}

impl Default for UserAgentPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Percent change from `previous` to `current`; a zero baseline yields 0.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    (current - previous) / previous * 100.0
}

/// Orders by descending absolute day change. Quotes without a day change
/// go last, keeping their relative order.
pub fn sort_by_day_change(quotes: &mut [TickerQuote]) {
    quotes.sort_by(|a, b| match (a.day_change, b.day_change) {
        (Some(x), Some(y)) => y.abs().partial_cmp(&x.abs()).unwrap_or(CmpOrdering::Equal),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    });
}

pub struct TickerClient {
    client: reqwest::Client,
    chart_url: String,
    symbols: Vec<String>,
    agents: UserAgentPool,
    backoff: Duration,
    extension: Duration,
    window: Arc<FreshnessWindow>,
}

impl TickerClient {
    /// `window` is the freshness window of the ticker cache; it is stretched
    /// when the endpoint keeps rate limiting us.
    pub fn new(config: &TickersConfig, window: Arc<FreshnessWindow>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            chart_url: config.chart_url.trim_end_matches('/').to_string(),
            symbols: config.symbols.clone(),
            agents: UserAgentPool::new(),
            backoff: Duration::from_millis(config.rate_limit_backoff_ms),
            extension: Duration::from_secs(config.rate_limit_extension_secs),
            window,
        })
    }

    async fn send(&self, url: &str, user_agent: &str) -> Result<reqwest::Response, FetchError> {
        self.client
            .get(url)
            .header(USER_AGENT, user_agent)
            .send()
            .await
            .map_err(|e| FetchError::request(url, e))
    }

    async fn fetch_chart(&self, symbol: &str, range: ChartRange) -> Result<ChartMeta, FetchError> {
        let url = format!(
            "{}/{}?range={}&interval=1d",
            self.chart_url,
            urlencoding::encode(symbol),
            range.as_query()
        );
        tracing::debug!("[Tickers] Requesting {}", url);

        let mut response = self.send(&url, self.agents.current()).await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(
                "[Tickers] Rate limited on {}, retrying in {:?}",
                symbol,
                self.backoff
            );
            tokio::time::sleep(self.backoff).await;
            let agent = self.agents.rotate();
            tracing::debug!("[Tickers] Retrying {} with User-Agent {}", url, agent);
            response = self.send(&url, agent).await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                self.window.extend(self.extension);
            }
        }

        let chart: ChartResponse = check_status(response, &url)?
            .json()
            .await
            .map_err(|e| FetchError::parse(format!("chart for {}", symbol), e))?;

        if let Some(error) = chart.chart.error.filter(|e| !e.is_null()) {
            return Err(FetchError::parse(
                format!("chart for {}", symbol),
                format!("upstream error: {}", error),
            ));
        }

        chart
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .map(|result| result.meta)
            .ok_or_else(|| {
                FetchError::parse(format!("chart for {}", symbol), "no data returned")
            })
    }

    /// One quote, built from the day, week and year ranges requested in turn.
    pub async fn fetch_quote(&self, symbol: &str) -> Result<TickerQuote, FetchError> {
        let mut metas = Vec::with_capacity(ChartRange::all().len());
        for range in ChartRange::all() {
            metas.push(self.fetch_chart(symbol, *range).await?);
        }

        let price = metas[0].regular_market_price;
        let change = |meta: &ChartMeta| match (price, meta.chart_previous_close) {
            (Some(current), Some(previous)) => Some(percent_change(current, previous)),
            _ => None,
        };

        Ok(TickerQuote {
            symbol: symbol.to_string(),
            price,
            day_change: change(&metas[0]),
            week_change: change(&metas[1]),
            year_change: change(&metas[2]),
        })
    }

    /// Fetches every configured symbol concurrently. Individual failures are
    /// logged and dropped; only a batch with no successes is an error.
    pub async fn fetch_quotes(&self) -> Result<Vec<TickerQuote>, FetchError> {
        tracing::info!("[Tickers] Fetching {} symbols", self.symbols.len());

        let results = join_all(self.symbols.iter().map(|s| self.fetch_quote(s))).await;

        let mut quotes = Vec::with_capacity(results.len());
        for (symbol, result) in self.symbols.iter().zip(results) {
            match result {
                Ok(quote) => quotes.push(quote),
                Err(e) => tracing::warn!("[Tickers] Failed to fetch {}: {}", symbol, e),
            }
        }

        if quotes.is_empty() {
            return Err(FetchError::Empty("ticker quotes"));
        }

        sort_by_day_change(&mut quotes);
        tracing::info!(
            "[Tickers] Fetched {}/{} symbols",
            quotes.len(),
            self.symbols.len()
        );
        Ok(quotes)
    }
}

#[async_trait]
impl Fetcher<TickerQuote> for TickerClient {
    async fn fetch(&self) -> Result<Vec<TickerQuote>, FetchError> {
        self.fetch_quotes().await
    }
}
