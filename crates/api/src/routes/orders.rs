//! Order placement, listing and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::UniqueId;
use domain::{NewOrder, Order, OrderStatus};
use serde::Deserialize;
use table_store::{ETag, TableBackend};

use super::entity_key;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub customer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    #[serde(default)]
    pub etag: Option<ETag>,
}

/// POST /orders: place an order priced from the stored catalogue.
#[tracing::instrument(skip(state, req))]
pub async fn create<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.orders.create_order(req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders: list orders, newest first, optionally for one customer.
#[tracing::instrument(skip(state))]
pub async fn list<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let customer_id = query
        .customer_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(UniqueId::from);
    let orders = state.orders.list(customer_id.as_ref()).await?;
    Ok(Json(orders))
}

/// GET /orders/{pk}/{rk}
#[tracing::instrument(skip(state))]
pub async fn get<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(path): Path<(String, String)>,
) -> Result<Json<Order>, ApiError> {
    let key = entity_key(path);
    let order = state
        .orders
        .get(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {key} not found")))?;
    Ok(Json(order))
}

/// PUT /orders/{pk}/{rk}/status
#[tracing::instrument(skip(state, req))]
pub async fn update_status<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(path): Path<(String, String)>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let status: OrderStatus = req.status.parse().map_err(ApiError::BadRequest)?;
    let order = state
        .orders
        .update_status(&entity_key(path), status, req.etag)
        .await?;
    Ok(Json(order))
}

/// DELETE /orders/{pk}/{rk}
#[tracing::instrument(skip(state))]
pub async fn delete<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(path): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let key = entity_key(path);
    if state.orders.delete(&key).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Order {key} not found")))
    }
}
