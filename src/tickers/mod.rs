mod client;
mod types;

pub use client::{percent_change, sort_by_day_change, TickerClient, UserAgentPool};
pub use types::{ChartRange, TickerQuote};
