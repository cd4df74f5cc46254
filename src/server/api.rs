// FILE: src/server/api.rs
//! REST handlers over the shared service.

use crate::identity::FileId;
use crate::record::Position;
use crate::server::error::ApiError;
use crate::service::SharedService;
use crate::store::Page;
use crate::visibility::LodBuckets;
use axum::body::Body;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const THUMBNAIL_CACHE_CONTROL: &str = "public, max-age=31536000";

#[derive(Debug, Default, Deserialize)]
pub struct FilesQuery {
    pub cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VisibleQuery {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_files: usize,
    pub last_scan: Option<DateTime<Utc>>,
}

fn parse_cursor(raw: Option<&str>) -> Result<usize, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(0),
        Some(text) => text
            .parse()
            .map_err(|_| ApiError::bad_request(format!("invalid cursor: {}", text))),
    }
}

pub(crate) async fn list_files(
    State(service): State<SharedService>,
    Query(query): Query<FilesQuery>,
) -> Result<Json<Page>, ApiError> {
    let cursor = parse_cursor(query.cursor.as_deref())?;
    Ok(Json(service.page(cursor)))
}

pub(crate) async fn thumbnail(
    State(service): State<SharedService>,
    UrlPath(id): UrlPath<String>,
) -> Result<Response<Body>, ApiError> {
    let id = FileId::from(id);
    let thumb = service.thumbnail(&id).await.map_err(|e| {
        tracing::warn!("[Server] Thumbnail for {} failed: {}", id, e);
        ApiError::from(e)
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, thumb.content_type)
        .header(header::CACHE_CONTROL, THUMBNAIL_CACHE_CONTROL)
        .body(Body::from(thumb.bytes))
        .map_err(|e| ApiError::internal(e.to_string()))
}

pub(crate) async fn stats(State(service): State<SharedService>) -> Json<Stats> {
    Json(Stats {
        total_files: service.store().count(),
        last_scan: service.store().last_scan_time(),
    })
}

pub(crate) async fn visible(
    State(service): State<SharedService>,
    Query(query): Query<VisibleQuery>,
) -> Result<Json<LodBuckets>, ApiError> {
    let viewpoint = Position::new(query.x.unwrap_or(0.0), query.y.unwrap_or(0.0), query.z.unwrap_or(0.0));
    if ![viewpoint.x, viewpoint.y, viewpoint.z].iter().all(|c| c.is_finite()) {
        return Err(ApiError::bad_request("viewpoint must be finite"));
    }

    let distance = query.distance.unwrap_or_else(|| service.default_view_distance());
    if distance.is_nan() || distance < 0.0 {
        return Err(ApiError::bad_request(format!("invalid view distance: {}", distance)));
    }

    // Placement and sorting can be heavy on a large index
    let buckets = tokio::task::spawn_blocking(move || service.visible(viewpoint, distance))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(buckets))
}
