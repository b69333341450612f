//! Customer CRUD endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use domain::{Customer, CustomerChanges, NewCustomer};
use serde::Deserialize;
use table_store::TableBackend;

use super::entity_key;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListCustomersQuery {
    pub city: Option<String>,
}

/// GET /customers: list customers, newest first, optionally in one city.
#[tracing::instrument(skip(state))]
pub async fn list<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<ListCustomersQuery>,
) -> Result<Json<Vec<Customer>>, ApiError> {
    let customers = state.customers.list(query.city.as_deref()).await?;
    Ok(Json(customers))
}

/// POST /customers: register a customer in their city's partition.
#[tracing::instrument(skip(state, req))]
pub async fn create<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<NewCustomer>,
) -> Result<(StatusCode, Json<Customer>), ApiError> {
    let customer = state.customers.create(req).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

/// GET /customers/{pk}/{rk}
#[tracing::instrument(skip(state))]
pub async fn get<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(path): Path<(String, String)>,
) -> Result<Json<Customer>, ApiError> {
    let key = entity_key(path);
    let customer = state
        .customers
        .get(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Customer {key} not found")))?;
    Ok(Json(customer))
}

/// PUT /customers/{pk}/{rk}: edit a customer; a new city moves it.
#[tracing::instrument(skip(state, req))]
pub async fn update<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(path): Path<(String, String)>,
    Json(req): Json<CustomerChanges>,
) -> Result<Json<Customer>, ApiError> {
    let customer = state.customers.update(&entity_key(path), req).await?;
    Ok(Json(customer))
}

/// DELETE /customers/{pk}/{rk}
#[tracing::instrument(skip(state))]
pub async fn delete<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(path): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let key = entity_key(path);
    if state.customers.delete(&key).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Customer {key} not found")))
    }
}
