//! HTTP surface of the admin tool.
//!
//! Every route is a thin wrapper around one [`AdminService`] call. The
//! service does blocking file and image work, so handlers hand it to
//! `spawn_blocking` instead of running it on the async workers.
//!
//! ## Routes
//! - `GET    /api/photos`: list all source photos
//! - `GET    /api/photos/{id}`: one photo with full metadata
//! - `PATCH  /api/photos/{id}`: update tags and/or description
//! - `POST   /api/photos/{id}/hero`: make this the only hero photo
//! - `POST   /api/photos/bulk/tags/add` / `.../remove`: `{photoIds, tags}`
//! - `GET    /api/tags`: every tag in use (`?public=true` hides `_` tags)
//! - `GET    /api/thumb/{filename}`: square JPEG preview
//! - `POST   /api/cache/refresh`: drop the ID index and thumbnail cache
//!
//! Errors are JSON: `{"error": "...", "status": 404}`.

use crate::admin::{AdminError, AdminService, BulkTagRequest};
use crate::metadata::{MetadataError, MetadataUpdate};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// An error rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));
        (self.status, body).into_response()
    }
}

impl From<AdminError> for ApiError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::NotFound(msg) => Self::new(StatusCode::NOT_FOUND, msg),
            err @ AdminError::Metadata(MetadataError::ValueTooLarge { .. }) => {
                Self::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            other => {
                tracing::error!(error = %other, "admin request failed");
                Self::internal(other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

type SharedService = Arc<AdminService>;

/// Run `f` on the blocking pool.
async fn blocking<T, F>(service: &SharedService, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AdminService) -> Result<T, AdminError> + Send + 'static,
{
    let service = Arc::clone(service);
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .map_err(ApiError::from)
}

async fn list_photos(State(service): State<SharedService>) -> Result<impl IntoResponse, ApiError> {
    let photos = blocking(&service, |s| s.list_photos()).await?;
    Ok(Json(photos))
}

async fn get_photo(
    State(service): State<SharedService>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let photo = blocking(&service, move |s| s.get_photo(&id)).await?;
    Ok(Json(photo))
}

async fn update_photo(
    State(service): State<SharedService>,
    Path(id): Path<String>,
    payload: Result<Json<MetadataUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(update) = payload?;
    let photo = blocking(&service, move |s| s.update_photo(&id, &update)).await?;
    Ok(Json(photo))
}

async fn set_hero(
    State(service): State<SharedService>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let hero = blocking(&service, move |s| s.set_hero(&id)).await?;
    Ok(Json(json!({ "success": true, "heroId": hero })))
}

async fn bulk_add_tags(
    State(service): State<SharedService>,
    payload: Result<Json<BulkTagRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let updated = blocking(&service, move |s| s.bulk_add_tags(&request)).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

async fn bulk_remove_tags(
    State(service): State<SharedService>,
    payload: Result<Json<BulkTagRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let updated = blocking(&service, move |s| s.bulk_remove_tags(&request)).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

#[derive(Debug, Default, Deserialize)]
struct TagsQuery {
    #[serde(default)]
    public: bool,
}

async fn list_tags(
    State(service): State<SharedService>,
    Query(query): Query<TagsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tags = blocking(&service, move |s| s.list_tags(!query.public)).await?;
    Ok(Json(tags))
}

async fn thumbnail(
    State(service): State<SharedService>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let bytes = blocking(&service, move |s| s.thumbnail(&filename)).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Body::from(bytes.to_vec()),
    )
        .into_response())
}

async fn refresh_cache(State(service): State<SharedService>) -> Result<impl IntoResponse, ApiError> {
    blocking(&service, |s| s.refresh()).await?;
    Ok(Json(json!({ "success": true, "message": "Cache refreshed" })))
}

/// Build the admin router with its shared service.
pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/api/photos", get(list_photos))
        .route("/api/photos/bulk/tags/add", post(bulk_add_tags))
        .route("/api/photos/bulk/tags/remove", post(bulk_remove_tags))
        .route("/api/photos/{id}", get(get_photo).patch(update_photo))
        .route("/api/photos/{id}/hero", post(set_hero))
        .route("/api/tags", get(list_tags))
        .route("/api/thumb/{filename}", get(thumbnail))
        .route("/api/cache/refresh", post(refresh_cache))
        .with_state(service)
}

/// Preload the source index, then serve on `addr` until `shutdown` resolves.
pub async fn serve(
    addr: &str,
    service: SharedService,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Admin API listening on http://{}", listener.local_addr()?);

    let preload = Arc::clone(&service);
    tokio::task::spawn_blocking(move || match preload.preload() {
        Ok(count) => tracing::info!(photos = count, "source index preloaded"),
        Err(e) => tracing::warn!(error = %e, "source index preload failed"),
    });

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}
