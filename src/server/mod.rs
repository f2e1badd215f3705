pub mod handlers;
pub mod middleware;
pub mod state;

pub use handlers::{create_router, ApiError, ErrorResponse, UrlsQuery};
pub use middleware::{API_KEY_HEADER, REQUEST_ID_HEADER};
pub use state::AppState;
