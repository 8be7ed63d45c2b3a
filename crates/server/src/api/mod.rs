pub mod audit;
pub mod error;
pub mod handlers;
pub mod histories;
pub mod middleware;
pub mod reports;
pub mod routes;

pub use error::{ApiError, ApiJson, ErrorResponse};
pub use routes::create_router;
