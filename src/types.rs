/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// Expense operations exposed by the API
/// Used by the service layer for log context and client-safe failure messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    List,
    Create,
    View,
    Update,
    Delete,
}

impl Operation {
    /// Generic message returned when the storage layer fails during this operation
    pub fn failure_message(&self) -> &'static str {
        match self {
            Operation::List => "Error retrieving expenses",
            Operation::Create => "Error creating expense",
            Operation::View => "Error retrieving expense",
            Operation::Update => "Error updating expense",
            Operation::Delete => "Error deleting expense",
        }
    }
}
