//! Feed fan-out worker.
//!
//! Consumes post events from RabbitMQ, looks up the author's followers over
//! gRPC and prepends the post id to each follower's capped Redis feed.

pub mod config;
pub mod consumers;
pub mod error;
pub mod feed_store;
pub mod grpc;
pub mod handlers;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
pub use feed_store::{FeedStore, RedisFeedStore};
pub use services::{FanOutHandler, FanOutSettings};
