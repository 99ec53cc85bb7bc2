use std::sync::Arc;

use thiserror::Error;

use crate::api::pagination::{Page, PageRequest};
use crate::api::validation::FieldErrors;
use crate::auth::{authorize, Ability, Decision};
use crate::database::models::{Expense, ExpenseInput};
use crate::database::{DatabaseError, ExpenseStore};
use crate::middleware::Principal;
use crate::notify::Notifier;
use crate::types::Operation;

/// Outcome of a failed expense operation
#[derive(Debug, Error)]
pub enum ExpenseError {
    #[error("validation failed")]
    Validation(FieldErrors),

    #[error("expense not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("{operation:?} failed: {source}")]
    Persistence {
        operation: Operation,
        #[source]
        source: DatabaseError,
    },
}

impl From<FieldErrors> for ExpenseError {
    fn from(errors: FieldErrors) -> Self {
        ExpenseError::Validation(errors)
    }
}

fn persistence(operation: Operation) -> impl FnOnce(DatabaseError) -> ExpenseError {
    move |source| ExpenseError::Persistence { operation, source }
}

fn allowed(decision: Decision) -> Result<Expense, ExpenseError> {
    match decision {
        Decision::Allowed(expense) => Ok(expense),
        Decision::NotFound => Err(ExpenseError::NotFound),
        Decision::Forbidden => Err(ExpenseError::Forbidden),
    }
}

/// Expense operations on behalf of an explicit principal.
///
/// Writes run inside a store transaction; returning early drops the
/// transaction handle, which rolls it back.
pub struct ExpenseService {
    store: Arc<dyn ExpenseStore>,
    notifier: Notifier,
}

impl ExpenseService {
    pub fn new(store: Arc<dyn ExpenseStore>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    pub async fn list(&self, principal: &Principal, request: PageRequest) -> Result<Page<Expense>, ExpenseError> {
        self.store
            .list(principal.id, request)
            .await
            .map_err(persistence(Operation::List))
    }

    pub async fn create(&self, principal: &Principal, input: ExpenseInput) -> Result<Expense, ExpenseError> {
        let mut tx = self.store.begin().await.map_err(persistence(Operation::Create))?;
        let expense = tx
            .insert(principal.id, &input)
            .await
            .map_err(persistence(Operation::Create))?;
        tx.commit().await.map_err(persistence(Operation::Create))?;

        tracing::info!("Expense {} created by {}", expense.id, principal.id);
        self.notifier.expense_created(&expense, principal);

        Ok(expense)
    }

    pub async fn show(&self, principal: &Principal, id: i64) -> Result<Expense, ExpenseError> {
        let found = self.store.get(id).await.map_err(persistence(Operation::View))?;
        allowed(authorize(principal, found, Ability::View))
    }

    /// Overwrite the mutable fields. The owner recorded at creation is kept.
    pub async fn update(&self, principal: &Principal, id: i64, input: ExpenseInput) -> Result<Expense, ExpenseError> {
        let mut tx = self.store.begin().await.map_err(persistence(Operation::Update))?;
        let found = tx.find_for_update(id).await.map_err(persistence(Operation::Update))?;
        let current = allowed(authorize(principal, found, Ability::Update))?;

        let expense = tx
            .update(current.id, current.owner_id, &input)
            .await
            .map_err(persistence(Operation::Update))?;
        tx.commit().await.map_err(persistence(Operation::Update))?;

        tracing::info!("Expense {} updated by {}", expense.id, principal.id);
        Ok(expense)
    }

    pub async fn delete(&self, principal: &Principal, id: i64) -> Result<(), ExpenseError> {
        let mut tx = self.store.begin().await.map_err(persistence(Operation::Delete))?;
        let found = tx.find_for_update(id).await.map_err(persistence(Operation::Delete))?;
        let current = allowed(authorize(principal, found, Ability::Delete))?;

        tx.delete(current.id).await.map_err(persistence(Operation::Delete))?;
        tx.commit().await.map_err(persistence(Operation::Delete))?;

        tracing::info!("Expense {} deleted by {}", current.id, principal.id);
        Ok(())
    }
}
