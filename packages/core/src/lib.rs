// Library root: exposes the review server's modules to `src/main.rs` and
// to the router tests in `tests/`.

pub mod api;
pub mod app;
pub mod auth;
pub mod cache;
pub mod error;
pub mod metrics;
pub mod models;
pub mod services;
pub mod viewer;
pub mod web;

// Process start-up: flags, environment and log output.
pub mod cli;
pub mod config;
pub mod logging;
