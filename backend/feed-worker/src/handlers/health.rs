use actix_web::{web, HttpResponse};

use crate::error::Result;
use crate::handlers::FeedHandlerState;

pub async fn live() -> &'static str {
    "OK"
}

/// Ready once the feed store answers PING; 503 otherwise.
pub async fn ready(state: web::Data<FeedHandlerState>) -> Result<HttpResponse> {
    state.store.ping().await?;
    Ok(HttpResponse::Ok().body("OK"))
}
