use axum::{Router, routing::get};

pub mod common;
pub mod departments;
pub mod expenses;
pub mod organisations;
pub mod permissions;
pub mod system;
pub mod users;
pub mod vendors;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/users", users::router())
        .nest("/departments", departments::router())
        .nest("/organisations", organisations::router())
        .nest("/permissions", permissions::router())
        .nest("/vendors", vendors::router())
        .nest("/expenses", expenses::router())
}
