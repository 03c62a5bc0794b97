//! Covenant monitoring backend library
//!
//! Loans, covenants and their audit timeline behind a JSON API, with
//! AI-assisted analysis and a typed client for the API.

pub mod ai;
pub mod app;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod services;
pub mod state;
