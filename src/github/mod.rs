mod client;
mod types;

pub use client::{parse_trending, TrendingClient};
pub use types::{Contributor, Repository};
