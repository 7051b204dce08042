//! Browser-facing pages: the route guard, session handling, and the
//! server-rendered HTML.

pub mod guard;
pub mod pages;
pub mod session;
pub mod templates;

pub use session::{CurrentUser, AUTH_COOKIE};
