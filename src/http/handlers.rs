use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::github::Repository;
use crate::hackernews::Story;
use crate::news::NewsItem;
use crate::tickers::{sort_by_day_change, TickerQuote};

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    refresh: Option<String>,
}

impl RefreshQuery {
    fn forced(&self) -> bool {
        self.refresh.as_deref() == Some("true")
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    time: String,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        time: Utc::now().to_rfc3339(),
        version: env!("BUILD_VERSION"),
    })
}

pub async fn github_trending(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<Json<Vec<Repository>>> {
    let repos = state
        .github
        .read(query.forced())
        .await
        .map_err(|e| ApiError::fetch("trending repositories", e))?;
    Ok(Json(repos))
}

pub async fn hackernews_top(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<Json<Vec<Story>>> {
    let stories = state
        .hackernews
        .read(query.forced())
        .await
        .map_err(|e| ApiError::fetch("top stories", e))?;
    Ok(Json(stories))
}

pub async fn news(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<Json<Vec<NewsItem>>> {
    let items = state
        .news
        .read(query.forced())
        .await
        .map_err(|e| ApiError::fetch("news", e))?;
    Ok(Json(items))
}

pub async fn tickers(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<Json<Vec<TickerQuote>>> {
    let mut quotes = state
        .tickers
        .read(query.forced())
        .await
        .map_err(|e| ApiError::fetch("ticker data", e))?;
    sort_by_day_change(&mut quotes);
    Ok(Json(quotes))
}
