//! axum routes.
//!
//! | Method | Path                                 | Auth |
//! |--------|--------------------------------------|------|
//! | POST   | `/add_plot`                          | yes  |
//! | DELETE | `/grimoire/:g`                       | yes  |
//! | DELETE | `/grimoire/:g/chapter/:c`            | yes  |
//! | DELETE | `/grimoire/:g/chapter/:c/plot/:p`    | yes  |
//! | GET    | `/api/tree`                          | no   |
//! | GET    | `/api/plot/:grimoire/:chapter/:plot` | no   |
//! | POST   | `/api/changes`                       | no   |
//! | GET    | `/api/events`                        | no   |
//! | GET    | `/api/health`                        | no   |
//! | GET    | `/`                                  | no   |

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use grimoire_core::{PathPrefix, PlotPath, StoreError, Tree};
use grimoire_renderer::{DashboardRenderer, RenderError};
use grimoire_sync::{AuthFailure, HubEvent, LiveSync, PollOutcome, SyncError, SECRET_HEADER};

use crate::error::ServerError;
use crate::protocol::{
    ChangeBody, ChangesRequest, ChangesResponse, DeleteResponse, ErrorBody, HealthResponse,
    PollQuery, PrefixQuery, PushRequest, PushResponse, SnapshotBody,
};

/// Header carrying the current version on a `304 Not Modified` long-poll.
pub const VERSION_HEADER: &str = "x-grimoire-version";

const KEEP_ALIVE: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct AppState {
    pub sync: LiveSync,
    pub renderer: Arc<DashboardRenderer>,
    pub max_wait: Duration,
}

impl AppState {
    pub fn new(sync: LiveSync, max_wait: Duration) -> Result<Self, ServerError> {
        Ok(Self {
            sync,
            renderer: Arc::new(DashboardRenderer::new()?),
            max_wait,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/add_plot", post(add_plot))
        .route("/grimoire/:grimoire", delete(delete_grimoire))
        .route("/grimoire/:grimoire/chapter/:chapter", delete(delete_chapter))
        .route(
            "/grimoire/:grimoire/chapter/:chapter/plot/:plot",
            delete(delete_plot),
        )
        .route("/api/health", get(health))
        .route("/api/tree", get(tree))
        .route("/api/plot/:grimoire/:chapter/:plot", get(plot))
        .route("/api/changes", post(changes))
        .route("/api/events", get(events))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failed request, rendered as `{"error": code, "message": ..}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let status = match &err {
            SyncError::Unauthorized(AuthFailure::Missing) => StatusCode::UNAUTHORIZED,
            SyncError::Unauthorized(AuthFailure::Invalid) => StatusCode::FORBIDDEN,
            SyncError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            SyncError::Store(StoreError::InvalidName { .. } | StoreError::InvalidPayload(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            SyncError::Store(
                StoreError::ModeConflict { .. } | StoreError::IncompatibleAppend { .. },
            ) => StatusCode::CONFLICT,
        };
        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        SyncError::from(err).into()
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        tracing::error!(error = %err, "dashboard render failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| StoreError::InvalidPayload(format!("malformed request body: {e}")).into())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn secret(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SECRET_HEADER)
        .map(|value| value.to_str().unwrap_or_default())
}

async fn add_plot(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PushResponse>, ApiError> {
    state.sync.authorize(secret(&headers))?;

    let request: PushRequest = parse_json(&body)?;
    let (path, figure, mode) = request.into_parts()?;
    let outcome = state.sync.push_authorized(path, figure, mode).await?;

    tracing::info!(
        plot = %outcome.path,
        version = outcome.version,
        mode = %outcome.mode,
        "plot updated"
    );
    Ok(Json(PushResponse {
        status: "success".to_string(),
        plot_name: outcome.path.plot.to_string(),
        version: outcome.version,
        mode: outcome.mode,
    }))
}

async fn delete_grimoire(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(grimoire): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    remove(&state, &headers, Some(grimoire), None, None)
}

async fn delete_chapter(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((grimoire, chapter)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>, ApiError> {
    remove(&state, &headers, Some(grimoire), Some(chapter), None)
}

async fn delete_plot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((grimoire, chapter, plot)): Path<(String, String, String)>,
) -> Result<Json<DeleteResponse>, ApiError> {
    remove(&state, &headers, Some(grimoire), Some(chapter), Some(plot))
}

fn remove(
    state: &AppState,
    headers: &HeaderMap,
    grimoire: Option<String>,
    chapter: Option<String>,
    plot: Option<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.sync.authorize(secret(headers))?;
    let prefix = PathPrefix::from_parts(grimoire, chapter, plot)?;
    let removed = state.sync.remove_authorized(&prefix)?;
    let deleted = match &prefix {
        PathPrefix::Plot(path) => path.plot.to_string(),
        PathPrefix::Chapter(_, chapter) => chapter.to_string(),
        PathPrefix::Grimoire(grimoire) => grimoire.to_string(),
        PathPrefix::All => String::new(),
    };
    Ok(Json(DeleteResponse {
        status: "success".to_string(),
        deleted,
        plots: removed.len(),
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        plots: state.sync.store().plot_count(),
        subscribers: state.sync.hub().subscriber_count(),
    })
}

async fn tree(State(state): State<AppState>) -> Json<Tree> {
    Json(state.sync.read().tree())
}

async fn plot(
    State(state): State<AppState>,
    Path((grimoire, chapter, plot)): Path<(String, String, String)>,
    Query(query): Query<PollQuery>,
) -> Result<Response, ApiError> {
    let path = PlotPath::new(grimoire, chapter, plot);
    let Some(after) = query.after else {
        let snapshot = state.sync.read().snapshot(&path)?;
        return Ok(Json(SnapshotBody::from(snapshot.as_ref())).into_response());
    };

    let wait = query
        .wait
        .map(Duration::from_secs)
        .unwrap_or(Duration::ZERO)
        .min(state.max_wait);
    match state.sync.read().updates_after(&path, after, wait).await? {
        PollOutcome::Updated(snapshot) => {
            Ok(Json(SnapshotBody::from(snapshot.as_ref())).into_response())
        }
        PollOutcome::Unchanged { version } => Ok((
            StatusCode::NOT_MODIFIED,
            [(VERSION_HEADER, version.to_string())],
        )
            .into_response()),
    }
}

async fn changes(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChangesResponse>, ApiError> {
    let request: ChangesRequest = parse_json(&body)?;
    let prefix = request.prefix.to_prefix()?;
    let changes = state
        .sync
        .read()
        .changed_since(&prefix, &request.known_versions())
        .iter()
        .map(ChangeBody::from)
        .collect();
    Ok(Json(ChangesResponse { changes }))
}

async fn events(
    State(state): State<AppState>,
    Query(query): Query<PrefixQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let prefix = query.to_prefix()?;
    let subscription = state.sync.subscribe(prefix);
    tracing::info!(subscriber = subscription.id(), prefix = %subscription.prefix(), "event stream opened");

    let stream = subscription
        .into_stream()
        .map(|event| Ok::<_, Infallible>(sse_event(event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE).text("ping")))
}

fn sse_event(event: HubEvent) -> Event {
    match event {
        HubEvent::Changed(change) => Event::default()
            .event("change")
            .json_data(ChangeBody::from(&change))
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "change event encoding failed, sending resync");
                resync_event()
            }),
        HubEvent::Resync => resync_event(),
    }
}

fn resync_event() -> Event {
    Event::default().event("resync").data("{}")
}

async fn dashboard(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let tree = state.sync.read().tree();
    Ok(Html(state.renderer.render(&tree)?))
}
