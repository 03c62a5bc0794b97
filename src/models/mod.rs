//! Data models for the covenant monitoring backend

use serde::{Deserialize, Serialize};

pub mod auth;
pub mod dashboard;
pub mod loan;

pub use auth::*;
pub use dashboard::*;
pub use loan::*;

/// Plain acknowledgement body
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
