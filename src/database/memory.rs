use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use crate::api::pagination::{Page, PageRequest};
use crate::database::manager::DatabaseError;
use crate::database::models::{Expense, ExpenseInput};
use crate::database::store::{ExpenseStore, ExpenseTx};

#[derive(Debug, Clone, Default)]
struct Table {
    rows: BTreeMap<i64, Expense>,
    last_id: i64,
}

/// In-process expense store.
///
/// A transaction owns the table's write lock and mutates a staged copy; the
/// copy replaces the table only on commit, so readers never observe a
/// half-applied write.
#[derive(Clone, Default)]
pub struct MemoryExpenseStore {
    table: Arc<RwLock<Table>>,
    fail_next_commit: Arc<AtomicBool>,
    unhealthy: Arc<AtomicBool>,
}

impl MemoryExpenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail as a storage fault would
    #[cfg(test)]
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Report the store as unreachable from `health_check`
    #[cfg(test)]
    pub fn fail_health_checks(&self) {
        self.unhealthy.store(true, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ExpenseStore for MemoryExpenseStore {
    async fn list(&self, owner_id: Uuid, request: PageRequest) -> Result<Page<Expense>, DatabaseError> {
        let table = self.table.read().await;
        let owned: Vec<&Expense> = table.rows.values().filter(|e| e.owner_id == owner_id).collect();
        let total = owned.len() as u64;

        let items = owned
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.per_page as usize)
            .cloned()
            .collect();

        Ok(Page::new(items, total, request))
    }

    async fn get(&self, id: i64) -> Result<Option<Expense>, DatabaseError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn begin(&self) -> Result<Box<dyn ExpenseTx>, DatabaseError> {
        let guard = self.table.clone().write_owned().await;
        let staged = Table::clone(&guard);
        Ok(Box::new(MemoryExpenseTx {
            guard,
            staged,
            fail_next_commit: self.fail_next_commit.clone(),
        }))
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(DatabaseError::Connection("memory store marked unhealthy".to_string()));
        }
        Ok(())
    }
}

struct MemoryExpenseTx {
    guard: OwnedRwLockWriteGuard<Table>,
    staged: Table,
    fail_next_commit: Arc<AtomicBool>,
}

#[async_trait]
impl ExpenseTx for MemoryExpenseTx {
    async fn insert(&mut self, owner_id: Uuid, input: &ExpenseInput) -> Result<Expense, DatabaseError> {
        let now = Utc::now();
        self.staged.last_id += 1;

        let expense = Expense {
            id: self.staged.last_id,
            description: input.description.clone(),
            date: input.date,
            owner_id,
            amount: input.amount,
            created_at: now,
            updated_at: now,
        };
        self.staged.rows.insert(expense.id, expense.clone());
        Ok(expense)
    }

    async fn find_for_update(&mut self, id: i64) -> Result<Option<Expense>, DatabaseError> {
        Ok(self.staged.rows.get(&id).cloned())
    }

    async fn update(&mut self, id: i64, owner_id: Uuid, input: &ExpenseInput) -> Result<Expense, DatabaseError> {
        let expense = self
            .staged
            .rows
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("expense {}", id)))?;

        expense.description = input.description.clone();
        expense.date = input.date;
        expense.owner_id = owner_id;
        expense.amount = input.amount;
        expense.updated_at = Utc::now();
        Ok(expense.clone())
    }

    async fn delete(&mut self, id: i64) -> Result<(), DatabaseError> {
        self.staged
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DatabaseError::NotFound(format!("expense {}", id)))
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let MemoryExpenseTx {
            mut guard,
            staged,
            fail_next_commit,
        } = *self;

        if fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(DatabaseError::Query("simulated commit failure".to_string()));
        }

        *guard = staged;
        Ok(())
    }
}
