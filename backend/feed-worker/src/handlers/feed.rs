use actix_web::{get, web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::feed_store::{feed_key, FeedStore};

const MAX_PAGE_SIZE: usize = 100;

pub struct FeedHandlerState {
    pub store: Arc<dyn FeedStore>,
}

#[derive(Debug, Deserialize)]
pub struct FeedQueryParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedPage {
    pub user_id: String,
    pub post_ids: Vec<String>,
    pub count: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Read back a follower's materialized feed, newest first.
#[get("/internal/feeds/{user_id}")]
pub async fn get_feed(
    path: web::Path<String>,
    query: web::Query<FeedQueryParams>,
    state: web::Data<FeedHandlerState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    if user_id.trim().is_empty() {
        return Err(AppError::BadRequest("user_id must not be empty".into()));
    }

    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset;

    // Redis reads negative indexes from the tail, so an offset that does not
    // fit an isize must never reach LRANGE. No feed is that long.
    let post_ids = match isize::try_from(offset) {
        Ok(start) => {
            let stop = start.saturating_add(limit as isize - 1);
            state.store.range(&feed_key(&user_id), start, stop).await?
        }
        Err(_) => Vec::new(),
    };

    debug!(user_id = %user_id, count = post_ids.len(), limit, offset, "Feed page read");

    Ok(HttpResponse::Ok().json(FeedPage {
        count: post_ids.len(),
        user_id,
        post_ids,
        limit,
        offset,
    }))
}
