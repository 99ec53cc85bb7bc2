use async_trait::async_trait;
use uuid::Uuid;

use crate::api::pagination::{Page, PageRequest};
use crate::database::manager::DatabaseError;
use crate::database::models::{Expense, ExpenseInput};

/// Read access plus a transaction factory for writes
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    /// Expenses owned by `owner_id` in insertion order
    async fn list(&self, owner_id: Uuid, request: PageRequest) -> Result<Page<Expense>, DatabaseError>;

    async fn get(&self, id: i64) -> Result<Option<Expense>, DatabaseError>;

    /// Open a write transaction. Dropping the handle without `commit` rolls it back.
    async fn begin(&self) -> Result<Box<dyn ExpenseTx>, DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError>;
}

/// One open write transaction
#[async_trait]
pub trait ExpenseTx: Send {
    async fn insert(&mut self, owner_id: Uuid, input: &ExpenseInput) -> Result<Expense, DatabaseError>;

    /// Load a row and hold it against concurrent writers until commit or rollback
    async fn find_for_update(&mut self, id: i64) -> Result<Option<Expense>, DatabaseError>;

    async fn update(&mut self, id: i64, owner_id: Uuid, input: &ExpenseInput) -> Result<Expense, DatabaseError>;

    async fn delete(&mut self, id: i64) -> Result<(), DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;
}
