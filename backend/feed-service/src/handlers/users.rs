//! Minimal user endpoints, enough to provision accounts for the feed.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::repository::UserRepository;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub avatar_url: Option<String>,
}

/// POST /api/v1/users
pub async fn create_user(
    body: web::Json<CreateUserRequest>,
    users: web::Data<UserRepository>,
) -> Result<HttpResponse> {
    if body.username.trim().is_empty() {
        return Err(AppError::BadRequest("username must not be empty".to_string()));
    }

    let user = users
        .create_user(body.username.trim(), body.avatar_url.as_deref())
        .await?;

    Ok(HttpResponse::Created().json(user))
}

/// GET /api/v1/users/{user_id}
pub async fn get_user(
    path: web::Path<Uuid>,
    users: web::Data<UserRepository>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let user = users
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", user_id)))?;

    Ok(HttpResponse::Ok().json(user))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/users", web::post().to(create_user))
        .route("/users/{user_id}", web::get().to(get_user));
}
