use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower::ServiceExt;

use rest_starter::database::{Collection, DocumentSchema, MemoryCollection, Resource};
use rest_starter::middleware::CallerContext;
use rest_starter::rest::{generate_rest_endpoint, ModelDescriptor};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Note {
    title: String,
    #[serde(default)]
    rank: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    owner_id: Option<String>,
}

impl Resource for Note {
    const COLLECTION: &'static str = "notes";
}

fn storage() -> Arc<dyn Collection> {
    Arc::new(MemoryCollection::new(DocumentSchema::of::<Note>()))
}

fn plain_router(storage: Arc<dyn Collection>) -> Router {
    generate_rest_endpoint(ModelDescriptor::<Note>::new("/notes", storage).unwrap())
}

fn owned_router(storage: Arc<dyn Collection>) -> Router {
    let descriptor = ModelDescriptor::<Note>::new("/notes", storage)
        .unwrap()
        .with_parent_id_property("ownerId")
        .unwrap();
    generate_rest_endpoint(descriptor)
}

fn caller(id: &str) -> CallerContext {
    CallerContext::new().with("ownerId", id)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    who: Option<CallerContext>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(who) = who {
        builder = builder.extension(who);
    }
    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

async fn create(app: &Router, body: Value, who: Option<CallerContext>) -> Result<String> {
    let (status, created) = send(app, Method::POST, "/notes", Some(body), who).await?;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    Ok(created["_id"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn exposes_exactly_the_six_routes() -> Result<()> {
    let app = plain_router(storage());
    let id = create(&app, json!({"title": "x"}), None).await?;

    assert_eq!(send(&app, Method::GET, "/notes", None, None).await?.0, StatusCode::OK);
    assert_eq!(send(&app, Method::GET, "/notes/paging", None, None).await?.0, StatusCode::OK);
    assert_eq!(send(&app, Method::GET, &format!("/notes/{id}"), None, None).await?.0, StatusCode::OK);
    assert_eq!(
        send(&app, Method::PUT, &format!("/notes/{id}"), Some(json!({"rank": 2})), None).await?.0,
        StatusCode::OK
    );
    assert_eq!(send(&app, Method::DELETE, &format!("/notes/{id}"), None, None).await?.0, StatusCode::NO_CONTENT);

    // Anything else is not routed
    assert_eq!(send(&app, Method::PATCH, "/notes/abc", None, None).await?.0, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(send(&app, Method::DELETE, "/notes", None, None).await?.0, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(send(&app, Method::GET, "/notes/a/b", None, None).await?.0, StatusCode::NOT_FOUND);
    assert_eq!(send(&app, Method::GET, "/other", None, None).await?.0, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn create_then_get_one_round_trips() -> Result<()> {
    let app = plain_router(storage());
    let id = create(&app, json!({"title": "x"}), None).await?;

    let (status, record) = send(&app, Method::GET, &format!("/notes/{id}"), None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["title"], "x");
    assert_eq!(record["_id"], json!(id));

    let (_, all) = send(&app, Method::GET, "/notes", None, None).await?;
    assert_eq!(all.as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn client_supplied_primary_key_is_ignored() -> Result<()> {
    let app = plain_router(storage());
    let id = create(&app, json!({"title": "x", "_id": "chosen"}), None).await?;
    assert_ne!(id, "chosen");

    let (status, _) = send(&app, Method::GET, "/notes/chosen", None, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn invalid_bodies_are_bad_requests() -> Result<()> {
    let app = plain_router(storage());

    let (status, body) = send(&app, Method::POST, "/notes", Some(json!({"rank": 1})), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["field_errors"]["title"], "This field is required");

    let (status, body) = send(&app, Method::POST, "/notes", Some(json!(["not", "an", "object"])), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_JSON");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/notes")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))?;
    assert_eq!(app.clone().oneshot(request).await?.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn owner_is_always_taken_from_caller() -> Result<()> {
    let store = storage();
    let app = owned_router(store.clone());

    let forged = create(&app, json!({"title": "x", "ownerId": "mallory"}), Some(caller("alice"))).await?;
    let omitted = create(&app, json!({"title": "y"}), Some(caller("alice"))).await?;

    for id in [forged, omitted] {
        let record = store.find_by_id(&id).await?.unwrap();
        assert_eq!(record["ownerId"], "alice");
    }
    Ok(())
}

#[tokio::test]
async fn scoped_create_without_caller_is_unauthorized() -> Result<()> {
    let store = storage();
    let app = owned_router(store.clone());

    let (status, _) = send(&app, Method::POST, "/notes", Some(json!({"title": "x"})), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(store.count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn update_by_non_owner_is_forbidden_and_leaves_record() -> Result<()> {
    let store = storage();
    let app = owned_router(store.clone());
    let id = create(&app, json!({"title": "original"}), Some(caller("alice"))).await?;

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/notes/{id}"),
        Some(json!({"title": "hijacked", "ownerId": "bob"})),
        Some(caller("bob")),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let record = store.find_by_id(&id).await?.unwrap();
    assert_eq!(record["title"], "original");
    assert_eq!(record["ownerId"], "alice");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/notes/{id}"),
        Some(json!({"title": "edited", "ownerId": "bob"})),
        Some(caller("alice")),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);

    let record = store.find_by_id(&id).await?.unwrap();
    assert_eq!(record["title"], "edited");
    assert_eq!(record["ownerId"], "alice");
    Ok(())
}

#[tokio::test]
async fn update_of_missing_record_is_not_found() -> Result<()> {
    let plain = plain_router(storage());
    let (status, _) = send(&plain, Method::PUT, "/notes/missing", Some(json!({"rank": 1})), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let owned = owned_router(storage());
    let (status, _) = send(&owned, Method::PUT, "/notes/missing", Some(json!({"rank": 1})), Some(caller("alice"))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn blank_id_on_update_is_bad_request() -> Result<()> {
    let app = plain_router(storage());
    let (status, body) = send(&app, Method::PUT, "/notes/%20", Some(json!({"rank": 1})), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
    Ok(())
}

#[tokio::test]
async fn delete_then_get_one_is_not_found() -> Result<()> {
    let app = plain_router(storage());
    let id = create(&app, json!({"title": "x"}), None).await?;

    let (status, _) = send(&app, Method::DELETE, &format!("/notes/{id}"), None, None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::GET, &format!("/notes/{id}"), None, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Entity not found");

    // Deleting again is a no-op
    let (status, _) = send(&app, Method::DELETE, &format!("/notes/{id}"), None, None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    Ok(())
}

#[tokio::test]
async fn paging_windows_over_total_count() -> Result<()> {
    let app = plain_router(storage());
    for rank in 0..25 {
        create(&app, json!({"title": format!("note {rank}"), "rank": rank}), None).await?;
    }

    for (page, expected) in [(1, 10), (3, 5), (4, 0)] {
        let (status, body) = send(&app, Method::GET, &format!("/notes/paging?page={page}&limit=10"), None, None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalRecords"], 25);
        assert_eq!(body["page"], page);
        assert_eq!(body["limit"], 10);
        assert_eq!(body["results"].as_array().map(Vec::len), Some(expected), "page {page}");
    }
    Ok(())
}

#[tokio::test]
async fn garbage_paging_params_fall_back_to_defaults() -> Result<()> {
    let app = plain_router(storage());
    for rank in 0..25 {
        create(&app, json!({"title": "n", "rank": rank}), None).await?;
    }

    let (status, body) = send(&app, Method::GET, "/notes/paging?page=abc&limit=xyz", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 20);
    assert_eq!(body["results"].as_array().map(Vec::len), Some(20));
    assert!(body.get("sortProp").is_none());
    assert!(body.get("sortOrder").is_none());
    Ok(())
}

#[tokio::test]
async fn paging_sorts_and_echoes_sort_params() -> Result<()> {
    let app = plain_router(storage());
    for rank in [3, 1, 2] {
        create(&app, json!({"title": format!("r{rank}"), "rank": rank}), None).await?;
    }

    let (_, body) = send(&app, Method::GET, "/notes/paging?sortProp=rank&sortOrder=desc", None, None).await?;
    let ranks: Vec<i64> = body["results"].as_array().unwrap().iter().map(|r| r["rank"].as_i64().unwrap()).collect();
    assert_eq!(ranks, vec![3, 2, 1]);
    assert_eq!(body["sortProp"], "rank");
    assert_eq!(body["sortOrder"], "desc");

    // Anything other than ASC sorts descending
    let (_, body) = send(&app, Method::GET, "/notes/paging?sortProp=rank&sortOrder=bogus", None, None).await?;
    assert_eq!(body["results"][0]["rank"], 3);

    let (_, body) = send(&app, Method::GET, "/notes/paging?sortProp=rank", None, None).await?;
    assert_eq!(body["results"][0]["rank"], 1);
    assert_eq!(body["sortOrder"], "ASC");
    Ok(())
}
