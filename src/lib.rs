pub mod broker;
pub mod config;
pub mod error;
pub mod models;
pub mod relay;
pub mod routes;
pub mod server;
pub mod state;
