//! Business logic services for covenant monitoring

pub mod compliance;
pub mod covenant;
pub mod export;
pub mod extraction;
mod loan_service;
pub mod prediction;
mod seed;

pub use loan_service::{CsvReport, LoanService};
pub use prediction::{NarrativeSource, PredictionProvider, PredictionReport, StatusBasedPredictor};
pub use seed::seed_demo_data;
