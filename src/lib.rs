pub mod bootstrap;
pub mod config;
pub mod data;
pub mod errors;
pub mod handlers;
pub mod ml;
pub mod models;
