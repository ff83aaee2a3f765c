//! Post write endpoints. These are the sources of the feed events: creating
//! a post enqueues fan-out, deleting one purges it from every feed in the
//! same transaction.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::middleware::CallerId;
use crate::repository::{LikeRepository, PostRepository};

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
}

/// POST /api/v1/posts
pub async fn create_post(
    caller: CallerId,
    body: web::Json<CreatePostRequest>,
    posts: web::Data<PostRepository>,
) -> Result<HttpResponse> {
    if body.caption.trim().is_empty() && body.media_urls.is_empty() {
        return Err(AppError::BadRequest(
            "post needs a caption or at least one media url".to_string(),
        ));
    }

    let post = posts
        .create_post(caller.0, &body.caption, &body.media_urls)
        .await?;

    info!(post_id = %post.id, author_id = %caller.0, "post created");
    Ok(HttpResponse::Created().json(post))
}

/// DELETE /api/v1/posts/{post_id}
///
/// Only the author may delete. Feed rows referencing the post go with it.
pub async fn delete_post(
    caller: CallerId,
    path: web::Path<Uuid>,
    posts: web::Data<PostRepository>,
) -> Result<HttpResponse> {
    let post_id = path.into_inner();

    let post = posts
        .get_by_id(post_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("post {} not found", post_id)))?;

    if post.author_id != caller.0 {
        return Err(AppError::Unauthorized);
    }

    posts.delete_by_id(post_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/v1/posts/{post_id}/like
pub async fn like_post(
    caller: CallerId,
    path: web::Path<Uuid>,
    posts: web::Data<PostRepository>,
    likes: web::Data<LikeRepository>,
) -> Result<HttpResponse> {
    let post_id = path.into_inner();

    if posts.get_by_id(post_id).await?.is_none() {
        return Err(AppError::NotFound(format!("post {} not found", post_id)));
    }

    let created = likes.like(caller.0, post_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "liked": true, "created": created })))
}

/// DELETE /api/v1/posts/{post_id}/like
pub async fn unlike_post(
    caller: CallerId,
    path: web::Path<Uuid>,
    likes: web::Data<LikeRepository>,
) -> Result<HttpResponse> {
    let post_id = path.into_inner();
    let removed = likes.unlike(caller.0, post_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "liked": false, "removed": removed })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/posts", web::post().to(create_post))
        .route("/posts/{post_id}", web::delete().to(delete_post))
        .route("/posts/{post_id}/like", web::post().to(like_post))
        .route("/posts/{post_id}/like", web::delete().to(unlike_post));
}
