pub mod api_key;
pub mod billing;
pub mod common;
pub mod course;
pub mod invitation;
pub mod organization;
pub mod rate_limit;
pub mod theme;
pub mod user_context;

pub use api_key::*;
pub use billing::*;
pub use common::*;
pub use course::*;
pub use invitation::*;
pub use organization::*;
pub use rate_limit::*;
pub use theme::*;
pub use user_context::*;
