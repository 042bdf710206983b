pub mod app;
pub mod cache;
pub mod error;
pub mod github;
pub mod hackernews;
pub mod http;
pub mod news;
pub mod pipeline;
pub mod scheduler;
pub mod storage;
pub mod tickers;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;
