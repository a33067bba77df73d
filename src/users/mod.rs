use crate::state::AppState;
use axum::Router;

pub mod codes;
pub mod dto;
pub mod handlers;
pub mod mailer;
pub mod model;
pub mod repo;
pub mod service;

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
