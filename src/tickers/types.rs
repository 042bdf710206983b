use serde::{Deserialize, Serialize};

/// Quote for one symbol. Percent changes are absent when the upstream
/// series did not carry enough data to compute them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerQuote {
    #[serde(rename = "ticker")]
    pub symbol: String,
    #[serde(rename = "todaysPrice")]
    pub price: Option<f64>,
    #[serde(rename = "dayChange")]
    pub day_change: Option<f64>,
    #[serde(rename = "weekChange")]
    pub week_change: Option<f64>,
    #[serde(rename = "yearChange")]
    pub year_change: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    pub chart: Chart,
}

#[derive(Debug, Deserialize)]
pub struct Chart {
    #[serde(default)]
    pub result: Option<Vec<ChartResult>>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ChartResult {
    pub meta: ChartMeta,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub regular_market_price: Option<f64>,
    #[serde(default)]
    pub chart_previous_close: Option<f64>,
}

/// Look-back ranges requested per symbol, in request order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartRange {
    Day,
    Week,
    Year,
}

impl ChartRange {
    pub fn all() -> &'static [ChartRange] {
        &[ChartRange::Day, ChartRange::Week, ChartRange::Year]
    }

    pub fn as_query(&self) -> &'static str {
        match self {
            ChartRange::Day => "1d",
            ChartRange::Week => "5d",
            ChartRange::Year => "1y",
        }
    }
}
