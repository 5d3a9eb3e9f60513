pub mod api;
pub mod broadcast;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod history;
pub mod models;
pub mod observability;
pub mod packages;
pub mod registry;
pub mod state;
