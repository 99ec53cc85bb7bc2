use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Expense {
    pub id: i64,
    pub description: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "user_id")]
    #[sqlx(rename = "user_id")]
    pub owner_id: Uuid,
    /// Written as a JSON number carrying every stored digit
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated values for a create or update
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseInput {
    pub description: String,
    pub date: DateTime<Utc>,
    pub amount: Decimal,
}
