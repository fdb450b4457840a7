pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod responses;
pub mod routes;
pub mod services;
pub mod state;

pub use state::AppState;
