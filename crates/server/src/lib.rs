pub mod api;
pub mod app;
pub mod config;
pub mod cors;
pub mod engine;
pub mod error;
pub mod store;
pub mod validation;
