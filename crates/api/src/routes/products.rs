//! Product CRUD and image upload endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use bytes::Bytes;
use domain::{Attachment, DomainError, NewProduct, Product, ProductChanges};
use rust_decimal::Decimal;
use serde::Deserialize;
use table_store::TableBackend;

use super::entity_key;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub file_name: Option<String>,
}

/// GET /products: list products, optionally in one category.
#[tracing::instrument(skip(state))]
pub async fn list<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = state.products.list(query.category.as_deref()).await?;
    Ok(Json(products))
}

/// POST /products: add a product to its category's partition.
///
/// Takes either a JSON body or a `multipart/form-data` form; a non-empty
/// `image` file part in the form is stored with the product.
#[tracing::instrument(skip(state, request))]
pub async fn create<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    request: Request,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let (details, image) = if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        product_form(multipart).await?
    } else {
        let Json(details) = Json::<NewProduct>::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        (details, None)
    };

    let product = state.products.create(details, image).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /products/{pk}/{rk}
#[tracing::instrument(skip(state))]
pub async fn get<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(path): Path<(String, String)>,
) -> Result<Json<Product>, ApiError> {
    let key = entity_key(path);
    let product = state
        .products
        .get(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {key} not found")))?;
    Ok(Json(product))
}

/// PUT /products/{pk}/{rk}: edit a product; a new category moves it.
#[tracing::instrument(skip(state, req))]
pub async fn update<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(path): Path<(String, String)>,
    Json(req): Json<ProductChanges>,
) -> Result<Json<Product>, ApiError> {
    let product = state.products.update(&entity_key(path), req, None).await?;
    Ok(Json(product))
}

/// PUT /products/{pk}/{rk}/image?file_name=...: attach or replace the
/// product image with the raw request body.
#[tracing::instrument(skip(state, body), fields(size = body.len()))]
pub async fn upload_image<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(path): Path<(String, String)>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<Product>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("Image body is empty".to_string()));
    }
    let file_name = query
        .file_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "image".to_string());

    let product = state
        .products
        .replace_image(&entity_key(path), Attachment::new(body, file_name))
        .await?;
    Ok(Json(product))
}

/// DELETE /products/{pk}/{rk}: delete a product and its image.
#[tracing::instrument(skip(state))]
pub async fn delete<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(path): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let key = entity_key(path);
    if state.products.delete(&key).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Product {key} not found")))
    }
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

/// Reads the product form: text fields named like [`NewProduct`]'s and an
/// optional `image` file part.
async fn product_form(
    mut multipart: Multipart,
) -> Result<(NewProduct, Option<Attachment>), ApiError> {
    let mut fields = HashMap::new();
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let file_name = field.file_name().unwrap_or("image").to_string();
            let data = field.bytes().await.map_err(bad_form)?;
            if !data.is_empty() {
                image = Some(Attachment::new(data, file_name));
            }
        } else {
            fields.insert(name, field.text().await.map_err(bad_form)?);
        }
    }

    let filled = |key: &str| {
        fields
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    };
    let price = filled("price")
        .ok_or_else(|| DomainError::validation("price", "is required"))?
        .parse::<Decimal>()
        .map_err(|_| DomainError::validation("price", "must be a number"))?;
    let stock_quantity = match filled("stock_quantity") {
        Some(raw) => raw
            .parse::<i32>()
            .map_err(|_| DomainError::validation("stock_quantity", "must be a whole number"))?,
        None => 0,
    };

    let details = NewProduct {
        category: filled("category").unwrap_or_default().to_string(),
        name: filled("name").unwrap_or_default().to_string(),
        description: filled("description").map(str::to_string),
        price,
        stock_quantity,
    };
    Ok((details, image))
}

fn bad_form(e: MultipartError) -> ApiError {
    ApiError::BadRequest(e.body_text())
}
