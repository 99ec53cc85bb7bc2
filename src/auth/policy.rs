//! Ownership policy for expense records.
//!
//! Existence and ownership are decided in one step so show, update and
//! delete report missing and foreign records the same way.

use crate::database::models::Expense;
use crate::middleware::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ability {
    View,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allowed(Expense),
    NotFound,
    Forbidden,
}

pub fn authorize(principal: &Principal, record: Option<Expense>, ability: Ability) -> Decision {
    let Some(expense) = record else {
        return Decision::NotFound;
    };

    if allows(principal, &expense, ability) {
        Decision::Allowed(expense)
    } else {
        tracing::warn!(
            "Principal {} denied {:?} on expense {} owned by {}",
            principal.id, ability, expense.id, expense.owner_id
        );
        Decision::Forbidden
    }
}

fn allows(principal: &Principal, expense: &Expense, ability: Ability) -> bool {
    match ability {
        Ability::View | Ability::Update | Ability::Delete => expense.owner_id == principal.id,
    }
}
