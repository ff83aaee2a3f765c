pub mod feed;
pub mod posts;
pub mod social;
pub mod users;

use actix_web::{web, HttpResponse, Responder};
use prometheus::{Encoder, TextEncoder};

pub async fn health() -> impl Responder {
    "OK"
}

pub async fn ready() -> impl Responder {
    "READY"
}

pub async fn metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/ready", web::get().to(ready))
        .route("/metrics", web::get().to(metrics))
        .service(
            web::scope("/api/v1")
                .configure(feed::configure)
                .configure(posts::configure)
                .configure(social::configure)
                .configure(users::configure),
        );
}
