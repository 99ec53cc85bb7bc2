use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::api::pagination::{Page, PageRequest};
use crate::database::manager::DatabaseError;
use crate::database::models::{Expense, ExpenseInput};
use crate::database::store::{ExpenseStore, ExpenseTx};

const COLUMNS: &str = "id, description, date, user_id, amount, created_at, updated_at";

/// Expense store backed by the `expenses` table (see sql/expenses.sql)
pub struct PgExpenseStore {
    pool: PgPool,
}

impl PgExpenseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExpenseStore for PgExpenseStore {
    async fn list(&self, owner_id: Uuid, request: PageRequest) -> Result<Page<Expense>, DatabaseError> {
        // Count and page must come from the same snapshot
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM expenses WHERE user_id = $1")
            .bind(owner_id)
            .fetch_one(&mut *tx)
            .await?;

        let sql = format!(
            "SELECT {} FROM expenses WHERE user_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
            COLUMNS
        );
        let items = sqlx::query_as::<_, Expense>(&sql)
            .bind(owner_id)
            .bind(i64::from(request.per_page))
            .bind(request.offset() as i64)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Page::new(items, total.max(0) as u64, request))
    }

    async fn get(&self, id: i64) -> Result<Option<Expense>, DatabaseError> {
        let sql = format!("SELECT {} FROM expenses WHERE id = $1", COLUMNS);
        let expense = sqlx::query_as::<_, Expense>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(expense)
    }

    async fn begin(&self) -> Result<Box<dyn ExpenseTx>, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgExpenseTx { tx }))
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        Ok(())
    }
}

/// sqlx rolls the transaction back when this is dropped uncommitted
struct PgExpenseTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ExpenseTx for PgExpenseTx {
    async fn insert(&mut self, owner_id: Uuid, input: &ExpenseInput) -> Result<Expense, DatabaseError> {
        let sql = format!(
            "INSERT INTO expenses (description, date, user_id, amount, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, now(), now()) RETURNING {}",
            COLUMNS
        );
        let expense = sqlx::query_as::<_, Expense>(&sql)
            .bind(&input.description)
            .bind(input.date)
            .bind(owner_id)
            .bind(input.amount)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(expense)
    }

    async fn find_for_update(&mut self, id: i64) -> Result<Option<Expense>, DatabaseError> {
        let sql = format!("SELECT {} FROM expenses WHERE id = $1 FOR UPDATE", COLUMNS);
        let expense = sqlx::query_as::<_, Expense>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(expense)
    }

    async fn update(&mut self, id: i64, owner_id: Uuid, input: &ExpenseInput) -> Result<Expense, DatabaseError> {
        let sql = format!(
            "UPDATE expenses SET description = $2, date = $3, user_id = $4, amount = $5, updated_at = now() \
             WHERE id = $1 RETURNING {}",
            COLUMNS
        );
        sqlx::query_as::<_, Expense>(&sql)
            .bind(id)
            .bind(&input.description)
            .bind(input.date)
            .bind(owner_id)
            .bind(input.amount)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("expense {}", id)))
    }

    async fn delete(&mut self, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("expense {}", id)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx.commit().await?;
        Ok(())
    }
}
