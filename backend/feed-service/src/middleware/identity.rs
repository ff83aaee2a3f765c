//! Caller identity extraction.
//!
//! Authentication happens at the edge gateway, which validates the session
//! and forwards the resolved user id in the `x-user-id` header. This service
//! trusts that header; it never sees raw credentials.

use actix_web::{FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use uuid::Uuid;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller, as asserted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub Uuid);

impl FromRequest for CallerId {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        let caller = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
            .map(CallerId)
            .ok_or(AppError::Unauthorized);

        ready(caller)
    }
}
