pub mod admin;
pub mod auth;
pub mod courses;
pub mod health;

use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(health::health_check)
            .configure(auth::auth_routes)
            .configure(courses::course_routes)
            .configure(admin::admin_routes)
    );
}
