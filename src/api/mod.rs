pub mod api_key_extractor;
pub mod billing_handlers;
pub mod course_handlers;
pub mod extract;
pub mod handlers;
pub mod organization_handlers;
pub mod public_handlers;
pub mod routes;
pub mod theme_handlers;
pub mod user_extractor;

pub use api_key_extractor::ApiKeyAuth;
pub use handlers::{AppContext, AppState};
pub use routes::*;
