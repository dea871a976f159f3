//! HTTP API handlers for ase-analyzer

pub mod health;
pub mod static_files;

pub use health::health_routes;
pub use static_files::static_service;
