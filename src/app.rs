//! Application assembly: state wiring and the HTTP router

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::ai::{AiAdvisor, GroqClient, GroqConfig, OcrSpaceClient, OcrSpaceConfig, TextGenerator};
use crate::auth::{AuthService, AuthSettings};
use crate::config::Config;
use crate::db::{self, Database};
use crate::handlers::health::health_check;
use crate::middleware::{self, REQUEST_ID_HEADER};
use crate::repository::{
    InMemoryLoanRepository, InMemoryUserRepository, LoanRepository, PgLoanRepository,
    PgUserRepository, UserRepository,
};
use crate::routes;
use crate::services::{seed_demo_data, LoanService};
use crate::state::AppState;

/// Wire repositories, services and AI clients from configuration.
///
/// Without `DATABASE_URL` the in-memory store is used.
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let (loans, users, database): (Arc<dyn LoanRepository>, Arc<dyn UserRepository>, _) =
        match &config.database_url {
            Some(_) => {
                let pool = db::create_pool(config)
                    .await
                    .context("Failed to connect to database")?;
                db::run_migrations(&pool)
                    .await
                    .context("Failed to run database migrations")?;
                (
                    Arc::new(PgLoanRepository::new(pool.clone())),
                    Arc::new(PgUserRepository::new(pool.clone())),
                    Some(Database::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using the in-memory store");
                (
                    Arc::new(InMemoryLoanRepository::new()),
                    Arc::new(InMemoryUserRepository::new()),
                    None,
                )
            }
        };

    let generator: Option<Arc<dyn TextGenerator>> = match GroqConfig::from_config(config) {
        Some(groq) => {
            let client = GroqClient::new(groq).context("Failed to build AI client")?;
            tracing::info!(model = %client.model(), "AI generator configured");
            Some(Arc::new(client))
        }
        None => None,
    };
    let advisor = Arc::new(AiAdvisor::new(generator));

    let ocr = OcrSpaceConfig::from_config(config)
        .map(OcrSpaceClient::new)
        .transpose()
        .context("Failed to build OCR client")?
        .map(Arc::new);

    let loan_service = Arc::new(LoanService::new(
        loans,
        advisor.clone(),
        config.upload_dir.clone(),
    ));

    let auth_service = Arc::new(AuthService::new(
        users,
        AuthSettings {
            jwt_secret: config.jwt_secret.clone(),
            access_token_ttl_seconds: config.jwt_access_token_ttl_seconds,
            refresh_token_ttl_days: config.jwt_refresh_token_ttl_days,
            bcrypt_cost: config.bcrypt_cost,
        },
    ));

    if config.seed_demo_data {
        if database.is_some() {
            tracing::warn!("SEED_DEMO_DATA ignored: demo data is only seeded into the in-memory store");
        } else {
            seed_demo_data(&loan_service)
                .await
                .context("Failed to seed demo data")?;
        }
    }

    Ok(AppState::new(
        loan_service,
        auth_service,
        advisor,
        ocr,
        database,
    ))
}

/// Build the full router with middleware
pub fn build_router(state: AppState, config: &Config) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_check))
        .merge(routes::auth_routes())
        .merge(routes::user_routes())
        .merge(routes::loan_routes())
        .merge(routes::covenant_routes())
        .merge(routes::dashboard_routes())
        .merge(routes::ai_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(configure_cors(config.cors_allowed_origins.as_deref()));

    if config.environment.is_production() {
        app = app.layer(axum::middleware::from_fn(middleware::hsts_header));
    }

    app
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
        .expose_headers([
            header::CONTENT_DISPOSITION,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}
