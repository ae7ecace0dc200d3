pub mod handlers;
pub mod responses;
pub mod routes;

pub use routes::{business_router, create_router, AppState};
