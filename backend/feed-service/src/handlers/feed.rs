//! Following-feed read endpoint.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::debug;

use crate::domain::PageRequest;
use crate::error::Result;
use crate::middleware::CallerId;
use crate::services::FollowingFeedReader;

#[derive(Debug, Deserialize)]
pub struct FeedQueryParams {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
}

fn default_size() -> u32 {
    PageRequest::DEFAULT_SIZE
}

/// GET /api/v1/feed/following?page=&size=
///
/// Newest-first page of posts from followed users, each annotated with
/// whether the caller has liked it. An empty feed is a 404.
pub async fn following_feed(
    caller: CallerId,
    params: web::Query<FeedQueryParams>,
    service: web::Data<FollowingFeedReader>,
) -> Result<HttpResponse> {
    let page = PageRequest::new(params.page, params.size);
    debug!(user_id = %caller.0, page = page.page, size = page.size, "feed page requested");

    let feed = service.get_following_feed(caller.0, page).await?;
    Ok(HttpResponse::Ok().json(feed))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/feed/following", web::get().to(following_feed));
}
