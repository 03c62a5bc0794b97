//! Route definitions for the covenant monitoring API

mod ai;
mod auth;
mod loans;
mod user;

pub use ai::{ai_routes, dashboard_routes};
pub use auth::auth_routes;
pub use loans::{covenant_routes, loan_routes};
pub use user::user_routes;
