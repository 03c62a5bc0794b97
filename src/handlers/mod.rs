//! API handlers for the covenant monitoring backend

pub mod ai;
pub mod auth;
pub mod covenants;
pub mod dashboard;
pub mod documents;
pub mod health;
pub mod loans;
pub mod timeline;
pub mod user;

// Re-export AuthenticatedUser from middleware for handler use
pub use crate::middleware::auth::AuthenticatedUser;
