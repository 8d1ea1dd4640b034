pub mod client;
pub mod heartbeat;
pub mod wire;

pub use client::FeedClient;
