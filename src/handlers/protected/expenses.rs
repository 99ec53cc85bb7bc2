// handlers/protected/expenses.rs - Expense resource endpoints
//
// Each handler validates input, calls the service with the principal the
// auth middleware injected, and converts the outcome into the envelope.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use serde_json::Value;

use crate::api::pagination::{PageQuery, PageRequest, Paginated};
use crate::database::models::{Expense, ExpenseInput};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, Principal};
use crate::state::AppState;

/// GET /expenses - List the principal's expenses
pub async fn index(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Paginated<Expense>> {
    let api = &state.config.api;
    let request = PageRequest::from_query(&query, api.default_per_page, api.max_per_page);

    let page = state.expenses.list(&principal, request).await?;
    Ok(ApiResponse::success(page.into_paginated(&state.expenses_url)))
}

/// POST /expenses - Create an expense owned by the principal
pub async fn store(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Expense> {
    let input = parse_input(payload)?;
    let expense = state.expenses.create(&principal, input).await?;
    Ok(ApiResponse::created(expense))
}

/// GET /expenses/:id - Show one expense
pub async fn show(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Expense> {
    let id = expense_id(id)?;
    let expense = state.expenses.show(&principal, id).await?;
    Ok(ApiResponse::success(expense))
}

/// PUT /expenses/:id - Replace description, date and amount
pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Expense> {
    let id = expense_id(id)?;
    let input = parse_input(payload)?;
    let expense = state.expenses.update(&principal, id, input).await?;
    Ok(ApiResponse::success(expense))
}

/// DELETE /expenses/:id - Permanently remove an expense
pub async fn destroy(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<&'static str> {
    let id = expense_id(id)?;
    state.expenses.delete(&principal, id).await?;
    Ok(ApiResponse::success("Expense deleted successfully."))
}

fn parse_input(payload: Result<Json<Value>, JsonRejection>) -> Result<ExpenseInput, ApiError> {
    let Json(payload) = payload.map_err(|rejection| ApiError::invalid_json(rejection.body_text()))?;
    Ok(ExpenseInput::from_payload(&payload)?)
}

/// Ids that cannot name a row are reported like any other missing expense
fn expense_id(id: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    id.map(|Path(id)| id)
        .map_err(|_| ApiError::not_found("Expense not found"))
}
