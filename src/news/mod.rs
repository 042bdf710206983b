mod client;
mod parser;
mod types;

pub use client::FeedClient;
pub use parser::{parse_feed, FeedEntry};
pub use types::NewsItem;
