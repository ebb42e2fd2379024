use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use rental_meters::{
    aggregation::{CombinedMonth, MonthlyConsumption, PeriodFilter, ReadingWithConsumption},
    domain::{Reading, SeriesTarget, SpaceDocument, UtilityKind},
    validation::{parse_reading_value, validate_value, ValidationError},
    DocumentStore, NewReading, Precondition, ReadingError, ReadingService, StoreError, Versioned,
};
use serde::Deserialize;
use time::OffsetDateTime;

pub struct AppState<S> {
    service: Arc<ReadingService<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

impl<S> AppState<S> {
    pub fn new(service: Arc<ReadingService<S>>) -> Self {
        Self { service }
    }
}

pub fn router<S: DocumentStore + 'static>(service: Arc<ReadingService<S>>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/spaces/:space_id", get(get_space::<S>).put(put_space::<S>))
        .route("/spaces/:space_id/statement", get(monthly_statement::<S>))
        .route(
            "/spaces/:space_id/meters/:utility/readings",
            get(list_readings::<S>).post(record_reading::<S>),
        )
        .route(
            "/spaces/:space_id/meters/:utility/readings/latest",
            get(latest_reading::<S>),
        )
        .route(
            "/spaces/:space_id/meters/:utility/monthly",
            get(monthly_consumption::<S>),
        )
        .route(
            "/spaces/:space_id/rooms/:room_id/statement",
            get(monthly_statement::<S>),
        )
        .route(
            "/spaces/:space_id/rooms/:room_id/meters/:utility/readings",
            get(list_readings::<S>).post(record_reading::<S>),
        )
        .route(
            "/spaces/:space_id/rooms/:room_id/meters/:utility/readings/latest",
            get(latest_reading::<S>),
        )
        .route(
            "/spaces/:space_id/rooms/:room_id/meters/:utility/monthly",
            get(monthly_consumption::<S>),
        )
        .with_state(AppState::new(service))
}

/// Path parameters shared by the apartment and room reading routes.
#[derive(Debug, Clone, Deserialize)]
pub struct SeriesPath {
    pub space_id: String,
    #[serde(default)]
    pub room_id: Option<String>,
    pub utility: UtilityKind,
}

impl From<SeriesPath> for SeriesTarget {
    fn from(p: SeriesPath) -> Self {
        SeriesTarget {
            space_id: p.space_id,
            room_id: p.room_id,
            utility: p.utility,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitPath {
    pub space_id: String,
    #[serde(default)]
    pub room_id: Option<String>,
}

/// Form inputs arrive as text as often as as numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SubmittedValue {
    Number(f64),
    Text(String),
}

impl SubmittedValue {
    fn parse(&self) -> Result<f64, ValidationError> {
        match self {
            Self::Number(v) => validate_value(*v),
            Self::Text(raw) => parse_reading_value(raw),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordReadingRequest {
    pub value: SubmittedValue,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub reading_date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PutSpaceQuery {
    pub expected_version: Option<u64>,
}

async fn healthz() -> &'static str {
    "ok"
}

pub async fn get_space<S: DocumentStore>(
    State(state): State<AppState<S>>,
    Path(space_id): Path<String>,
) -> Result<Json<Versioned<SpaceDocument>>, ApiError> {
    let doc = state.service.store().get_document(&space_id).await?;
    Ok(Json(doc))
}

/// Whole-document replace. With `expected_version` the write only lands if
/// the stored version still matches.
pub async fn put_space<S: DocumentStore>(
    State(state): State<AppState<S>>,
    Path(space_id): Path<String>,
    Query(query): Query<PutSpaceQuery>,
    Json(document): Json<SpaceDocument>,
) -> Result<Json<Versioned<SpaceDocument>>, ApiError> {
    if document.id != space_id {
        return Err(ApiError::BadRequest(format!(
            "document id '{}' does not match path '{space_id}'",
            document.id
        )));
    }

    let precondition = match query.expected_version {
        Some(v) => Precondition::Version(v),
        None => Precondition::Any,
    };
    let saved = state
        .service
        .store()
        .put_document(&space_id, document, precondition)
        .await?;
    tracing::info!(space_id = %space_id, version = saved.version, "space document saved");
    Ok(Json(saved))
}

pub async fn record_reading<S: DocumentStore>(
    State(state): State<AppState<S>>,
    Path(path): Path<SeriesPath>,
    Json(req): Json<RecordReadingRequest>,
) -> Result<(StatusCode, Json<Reading>), ApiError> {
    metrics::counter!("http_record_reading_requests_total").increment(1);

    let value = req.value.parse().map_err(ReadingError::from)?;
    let target = SeriesTarget::from(path);
    let reading = state
        .service
        .record_reading(
            &target,
            NewReading {
                value,
                notes: req.notes,
                reading_date: req.reading_date,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(reading)))
}

pub async fn list_readings<S: DocumentStore>(
    State(state): State<AppState<S>>,
    Path(path): Path<SeriesPath>,
) -> Result<Json<Vec<ReadingWithConsumption>>, ApiError> {
    let rows = state
        .service
        .readings_with_consumption(&path.into())
        .await?;
    Ok(Json(rows))
}

pub async fn latest_reading<S: DocumentStore>(
    State(state): State<AppState<S>>,
    Path(path): Path<SeriesPath>,
) -> Result<Json<Option<Reading>>, ApiError> {
    let latest = state.service.latest_reading(&path.into()).await?;
    Ok(Json(latest))
}

pub async fn monthly_consumption<S: DocumentStore>(
    State(state): State<AppState<S>>,
    Path(path): Path<SeriesPath>,
    Query(filter): Query<PeriodFilter>,
) -> Result<Json<Vec<MonthlyConsumption>>, ApiError> {
    let months = state
        .service
        .monthly_consumption(&path.into(), &filter)
        .await?;
    Ok(Json(months))
}

pub async fn monthly_statement<S: DocumentStore>(
    State(state): State<AppState<S>>,
    Path(path): Path<UnitPath>,
    Query(filter): Query<PeriodFilter>,
) -> Result<Json<Vec<CombinedMonth>>, ApiError> {
    let months = state
        .service
        .monthly_statement(&path.space_id, path.room_id.as_deref(), &filter)
        .await?;
    Ok(Json(months))
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Reading(#[from] ReadingError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("bad request: {0}")]
    BadRequest(String),
}

fn store_error_parts(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        StoreError::VersionConflict { .. } => (StatusCode::CONFLICT, "conflict"),
        StoreError::Serialization(_) | StoreError::Backend(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "store")
        }
    }
}

impl ApiError {
    /// HTTP status and a stable machine-readable kind.
    pub fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Reading(ReadingError::Validation(v)) => {
                let kind = match v {
                    ValidationError::InvalidValue => "invalid_value",
                    ValidationError::NotIncreasing { .. } => "not_increasing",
                    ValidationError::AlreadyRecorded { .. } => "already_recorded",
                    ValidationError::ReadingDateOutOfRange => "reading_date_out_of_range",
                };
                (StatusCode::UNPROCESSABLE_ENTITY, kind)
            }
            Self::Reading(ReadingError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Reading(ReadingError::Conflict { .. }) => (StatusCode::CONFLICT, "conflict"),
            Self::Reading(ReadingError::Store(e)) | Self::Store(e) => store_error_parts(e),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.parts();
        metrics::counter!("http_requests_failed_total").increment(1);
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "kind": kind,
        });
        (status, Json(body)).into_response()
    }
}
