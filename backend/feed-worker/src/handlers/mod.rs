pub mod feed;
pub mod health;

pub use feed::{get_feed, FeedHandlerState, FeedPage, FeedQueryParams};

use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::live))
        .route("/api/v1/health/live", web::get().to(health::live))
        .route("/api/v1/health/ready", web::get().to(health::ready))
        .route("/metrics", web::get().to(crate::metrics::serve_metrics))
        .service(get_feed);
}
