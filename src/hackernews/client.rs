use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;

use super::types::Story;
use crate::error::{check_status, FetchError};
use crate::pipeline::Fetcher;

pub struct HackerNewsClient {
    client: reqwest::Client,
    api_base: String,
    top_stories: usize,
}

impl HackerNewsClient {
    pub fn new(api_base: &str, top_stories: usize, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            top_stories,
        })
    }

    async fn get_json<R: serde::de::DeserializeOwned>(&self, url: &str) -> Result<R, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::request(url, e))?;

        check_status(response, url)?
            .json()
            .await
            .map_err(|e| FetchError::parse(url, e))
    }

    pub async fn fetch_top_story_ids(&self) -> Result<Vec<u64>, FetchError> {
        let url = format!("{}/topstories.json", self.api_base);
        let ids: Vec<u64> = self.get_json(&url).await?;
        tracing::info!(
            "[HackerNews] Fetched {} story IDs, processing top {}",
            ids.len(),
            self.top_stories
        );
        Ok(ids)
    }

    /// `Ok(None)` for ids the API reports as `null` (deleted items).
    pub async fn fetch_story(&self, id: u64) -> Result<Option<Story>, FetchError> {
        let url = format!("{}/item/{}.json", self.api_base, id);
        self.get_json(&url).await
    }

    /// Top stories in ranking order. Stories that fail to load are skipped;
    /// the fetch only fails if none load.
    pub async fn fetch_top_stories(&self) -> Result<Vec<Story>, FetchError> {
        let ids = self.fetch_top_story_ids().await?;
        let ids: Vec<u64> = ids.into_iter().take(self.top_stories).collect();

        let results = join_all(ids.iter().map(|id| self.fetch_story(*id))).await;

        let mut stories = Vec::with_capacity(ids.len());
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(Some(story)) => stories.push(story),
                Ok(None) => tracing::warn!("[HackerNews] Story {} no longer exists", id),
                Err(e) => tracing::warn!("[HackerNews] Failed to fetch story {}: {}", id, e),
            }
        }

        if stories.is_empty() {
            return Err(FetchError::Empty("stories"));
        }

        tracing::info!("[HackerNews] Fetched {}/{} stories", stories.len(), ids.len());
        Ok(stories)
    }
}

#[async_trait]
impl Fetcher<Story> for HackerNewsClient {
    async fn fetch(&self) -> Result<Vec<Story>, FetchError> {
        self.fetch_top_stories().await
    }
}
