mod client;
mod types;

pub use client::HackerNewsClient;
pub use types::Story;
