//! Entity storage
//!
//! Loans are stored as whole aggregates: a save writes the loan row and all
//! of its children in one transaction. Timeline events are insert-only.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Loan, User};

mod memory;
mod postgres;

pub use memory::{InMemoryLoanRepository, InMemoryUserRepository};
pub use postgres::{PgLoanRepository, PgUserRepository};

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepositoryError {
    pub fn loan_not_found(id: Uuid) -> Self {
        RepositoryError::NotFound {
            entity: "Loan",
            id: id.to_string(),
        }
    }

    pub fn user_not_found(id: Uuid) -> Self {
        RepositoryError::NotFound {
            entity: "User",
            id: id.to_string(),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            RepositoryError::Conflict(msg) => ApiError::Conflict(msg),
            RepositoryError::Database(e) => ApiError::from(e),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Storage for loan aggregates
#[async_trait]
pub trait LoanRepository: Send + Sync {
    /// All loans, newest first
    async fn list(&self) -> RepositoryResult<Vec<Loan>>;

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Loan>>;

    async fn insert(&self, loan: &Loan) -> RepositoryResult<()>;

    /// Persist the full aggregate; fails with `NotFound` for unknown loans
    async fn save(&self, loan: &Loan) -> RepositoryResult<()>;

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool>;

    /// Loan that owns the given covenant
    async fn loan_id_for_covenant(&self, covenant_id: Uuid) -> RepositoryResult<Option<Uuid>>;
}

/// Storage for user accounts
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<User>>;

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>>;

    /// Fails with `Conflict` when the username is taken
    async fn insert(&self, user: &User) -> RepositoryResult<()>;

    async fn update(&self, user: &User) -> RepositoryResult<()>;
}
