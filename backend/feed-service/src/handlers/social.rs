//! Follow-graph endpoints. Follow and unfollow commit the edge together with
//! the feed event that drives backfill or purge.

use actix_web::{web, HttpResponse};
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::middleware::CallerId;
use crate::repository::FollowRepository;

/// POST /api/v1/users/{user_id}/follow
pub async fn follow_user(
    caller: CallerId,
    path: web::Path<Uuid>,
    follows: web::Data<FollowRepository>,
) -> Result<HttpResponse> {
    let followee_id = path.into_inner();
    let created = follows.follow(caller.0, followee_id).await?;

    if created {
        info!(follower_id = %caller.0, %followee_id, "user followed");
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "following": true, "created": created })))
}

/// DELETE /api/v1/users/{user_id}/follow
pub async fn unfollow_user(
    caller: CallerId,
    path: web::Path<Uuid>,
    follows: web::Data<FollowRepository>,
) -> Result<HttpResponse> {
    let followee_id = path.into_inner();
    let removed = follows.unfollow(caller.0, followee_id).await?;

    if removed {
        info!(follower_id = %caller.0, %followee_id, "user unfollowed");
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "following": false, "removed": removed })))
}

/// GET /api/v1/users/{user_id}/counts
pub async fn follow_counts(
    path: web::Path<Uuid>,
    follows: web::Data<FollowRepository>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let followers = follows.follower_count(user_id).await?;
    let following = follows.following_count(user_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "followers": followers,
        "following": following,
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/users/{user_id}/follow", web::post().to(follow_user))
        .route("/users/{user_id}/follow", web::delete().to(unfollow_user))
        .route("/users/{user_id}/counts", web::get().to(follow_counts));
}
