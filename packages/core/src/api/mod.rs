pub mod auth;
pub mod frames;
pub mod headers;
pub mod health;
