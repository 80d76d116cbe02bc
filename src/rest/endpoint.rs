use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde_json::{Map, Value};

use super::{extract_parent_id, ModelDescriptor, PagedResult, PagingDefaults, PagingParams};
use crate::database::{Collection, Document, Resource};
use crate::error::ApiError;
use crate::middleware::CallerContext;

type Caller = Option<Extension<CallerContext>>;
type JsonBody = Result<Json<Value>, JsonRejection>;

/// Type-erased handler state shared by the six routes of one model.
struct Endpoint {
    storage: Arc<dyn Collection>,
    primary_key: &'static str,
    parent_id_property: Option<String>,
    paging: PagingDefaults,
}

impl Endpoint {
    /// Caller id for an ownership-scoped model; `Ok(None)` when the model is unscoped.
    fn owner(&self, caller: &Caller) -> Result<Option<(&str, String)>, ApiError> {
        let Some(property) = self.parent_id_property.as_deref() else {
            return Ok(None);
        };
        let caller = caller.as_ref().map(|Extension(c)| c);
        match extract_parent_id(caller, Some(property)) {
            Some(owner) => Ok(Some((property, owner))),
            None => Err(ApiError::unauthorized("Authentication required")),
        }
    }

    /// JSON object body with any client-supplied primary key removed.
    fn document(&self, body: JsonBody) -> Result<Document, ApiError> {
        let Json(value) = body?;
        let Value::Object(mut doc) = value else {
            return Err(ApiError::invalid_json("Request body must be a JSON object"));
        };
        doc.remove(self.primary_key);
        Ok(doc)
    }
}

/// Builds the router for one model. Called once per model at startup.
pub fn generate_rest_endpoint<T: Resource>(descriptor: ModelDescriptor<T>) -> Router {
    let path = descriptor.path().to_string();
    let endpoint = Arc::new(Endpoint {
        storage: descriptor.storage().clone(),
        primary_key: descriptor.primary_key(),
        parent_id_property: descriptor.parent_id_property().map(str::to_string),
        paging: descriptor.paging(),
    });

    Router::new()
        .route(&path, get(list).post(create))
        .route(&format!("{}/paging", path), get(paged_list))
        .route(&format!("{}/:id", path), get(get_one).put(update).delete(remove))
        .with_state(endpoint)
}

async fn list(State(endpoint): State<Arc<Endpoint>>) -> Result<Json<Vec<Document>>, ApiError> {
    Ok(Json(endpoint.storage.find_all().await?))
}

async fn paged_list(
    State(endpoint): State<Arc<Endpoint>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<PagedResult>, ApiError> {
    let params = PagingParams::from_query(&query, &endpoint.paging);

    let total = endpoint.storage.count().await?;
    let results = endpoint.storage.find_page(&params.to_page_query()).await?;

    Ok(Json(PagedResult::new(total, &params, results)))
}

async fn get_one(
    State(endpoint): State<Arc<Endpoint>>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ApiError> {
    endpoint
        .storage
        .find_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Entity not found"))
}

async fn create(
    State(endpoint): State<Arc<Endpoint>>,
    caller: Caller,
    body: JsonBody,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let mut doc = endpoint.document(body)?;
    // Ownership always comes from the caller, never from the body
    if let Some((property, owner)) = endpoint.owner(&caller)? {
        doc.insert(property.to_string(), Value::String(owner));
    }

    let id = endpoint.storage.insert(doc).await?;
    tracing::debug!("Created {} record {}", endpoint.storage.name(), id);

    let mut created = Map::new();
    created.insert(endpoint.primary_key.to_string(), Value::String(id));
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update(
    State(endpoint): State<Arc<Endpoint>>,
    Path(id): Path<String>,
    caller: Caller,
    body: JsonBody,
) -> Result<StatusCode, ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::bad_request("Missing id"));
    }
    let mut patch = endpoint.document(body)?;

    if let Some((property, owner)) = endpoint.owner(&caller)? {
        let existing = endpoint
            .storage
            .find_by_id(&id)
            .await?
            .ok_or_else(|| ApiError::not_found("Entity not found"))?;

        if existing.get(property).and_then(Value::as_str) != Some(owner.as_str()) {
            tracing::warn!("Rejected update of {} record {} by non-owner", endpoint.storage.name(), id);
            return Err(ApiError::forbidden("You do not have permission to modify this record"));
        }
        patch.insert(property.to_string(), Value::String(owner));
    }

    if !endpoint.storage.update_by_id(&id, patch).await? {
        return Err(ApiError::not_found("Entity not found"));
    }
    Ok(StatusCode::OK)
}

async fn remove(State(endpoint): State<Arc<Endpoint>>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    if !endpoint.storage.delete_by_id(&id).await? {
        tracing::debug!("Delete of missing {} record {} ignored", endpoint.storage.name(), id);
    }
    Ok(StatusCode::NO_CONTENT)
}
