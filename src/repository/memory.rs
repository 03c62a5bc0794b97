//! In-memory repositories for tests and local development

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{LoanRepository, RepositoryError, RepositoryResult, UserRepository};
use crate::models::{Loan, User};

/// Loan aggregates held in a map
#[derive(Default)]
pub struct InMemoryLoanRepository {
    loans: RwLock<HashMap<Uuid, Loan>>,
}

impl InMemoryLoanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoanRepository for InMemoryLoanRepository {
    async fn list(&self) -> RepositoryResult<Vec<Loan>> {
        let loans = self.loans.read().await;
        let mut all: Vec<Loan> = loans.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Loan>> {
        Ok(self.loans.read().await.get(&id).cloned())
    }

    async fn insert(&self, loan: &Loan) -> RepositoryResult<()> {
        let mut loans = self.loans.write().await;
        if loans.contains_key(&loan.id) {
            return Err(RepositoryError::Conflict(format!(
                "Loan {} already exists",
                loan.id
            )));
        }
        loans.insert(loan.id, loan.clone());
        Ok(())
    }

    async fn save(&self, loan: &Loan) -> RepositoryResult<()> {
        let mut loans = self.loans.write().await;
        let stored = loans
            .get_mut(&loan.id)
            .ok_or_else(|| RepositoryError::loan_not_found(loan.id))?;

        // Events already stored stay as they were
        let mut updated = loan.clone();
        for event in updated.timeline_events.iter_mut() {
            if let Some(existing) = stored.timeline_events.iter().find(|e| e.id == event.id) {
                *event = existing.clone();
            }
        }
        *stored = updated;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        Ok(self.loans.write().await.remove(&id).is_some())
    }

    async fn loan_id_for_covenant(&self, covenant_id: Uuid) -> RepositoryResult<Option<Uuid>> {
        let loans = self.loans.read().await;
        Ok(loans
            .values()
            .find(|loan| loan.covenants.iter().any(|c| c.id == covenant_id))
            .map(|loan| loan.id))
    }
}

/// User accounts held in a map
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn insert(&self, user: &User) -> RepositoryResult<()> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(&user.username))
        {
            return Err(RepositoryError::Conflict(format!(
                "Username '{}' is already taken",
                user.username
            )));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update(&self, user: &User) -> RepositoryResult<()> {
        let mut users = self.users.write().await;
        let stored = users
            .get_mut(&user.id)
            .ok_or_else(|| RepositoryError::user_not_found(user.id))?;
        *stored = user.clone();
        Ok(())
    }
}
