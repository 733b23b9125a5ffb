// 🌐 REST API - upload, pivot, export and snapshot routes over one UploadSession
// Built as a plain Router so the server binary and the tests share it

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::db::{delete_snapshot, get_snapshot, list_snapshots, save_snapshot, SnapshotSummary};
use crate::export::{pivot_view, write_csv, write_xlsx, PivotView};
use crate::session::{BatchReport, UploadSession};
use crate::sort::{SortColumn, SortDirection, SortSpec};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub session: Arc<Mutex<UploadSession>>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(conn: Connection, config: &Config) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            session: Arc::new(Mutex::new(UploadSession::new())),
            max_upload_bytes: config.max_upload_bytes(),
        }
    }
}

/// Lock, recovering the guard if a handler panicked while holding it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
    )
        .into_response()
}

fn internal_error(context: &str, e: impl std::fmt::Display) -> Response {
    log::error!("{}: {}", context, e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{}: {}", context, e))
}

fn signed_in_user(session: &UploadSession) -> Result<String, Response> {
    session
        .user_id()
        .map(str::to_string)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "sign in required"))
}

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Deserialize)]
pub struct SignInRequest {
    pub user_id: String,
}

#[derive(Serialize)]
pub struct SessionInfo {
    pub user_id: Option<String>,
    pub companies: usize,
    pub owners: Vec<String>,
}

impl SessionInfo {
    fn of(session: &UploadSession) -> Self {
        Self {
            user_id: session.user_id().map(str::to_string),
            companies: session.table().len(),
            owners: session.table().owners().to_vec(),
        }
    }
}

/// `?column=<header>&direction=asc|desc`; both optional
#[derive(Debug, Default, Deserialize)]
pub struct SortQuery {
    pub column: Option<String>,
    pub direction: Option<String>,
}

impl SortQuery {
    fn to_spec(&self) -> Result<SortSpec, Response> {
        let default = SortSpec::default();

        let column = self
            .column
            .as_deref()
            .map(SortColumn::from_label)
            .unwrap_or(default.column);

        let direction = match self.direction.as_deref() {
            None => default.direction,
            Some(text) => SortDirection::parse(text).ok_or_else(|| {
                error_response(
                    StatusCode::BAD_REQUEST,
                    format!("direction must be asc or desc, got '{}'", text),
                )
            })?,
        };

        Ok(SortSpec::new(column, direction))
    }
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub report: BatchReport,
    pub companies: usize,
}

#[derive(Deserialize)]
pub struct SaveRequest {
    pub name: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// POST /api/session/sign-in
async fn sign_in(State(state): State<AppState>, Json(req): Json<SignInRequest>) -> Response {
    let user_id = req.user_id.trim();
    if user_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "user_id must not be empty");
    }

    let mut session = lock(&state.session);
    session.sign_in(user_id);

    ApiResponse::ok(SessionInfo::of(&session))
}

/// POST /api/session/sign-out - drops the working table
async fn sign_out(State(state): State<AppState>) -> Response {
    let mut session = lock(&state.session);
    session.sign_out();

    ApiResponse::ok(SessionInfo::of(&session))
}

/// POST /api/upload/:filename - raw file bytes as the body
async fn upload(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    body: Bytes,
) -> Response {
    let mut session = lock(&state.session);
    let report = session.ingest_batch([(filename.as_str(), &body[..])]).clone();

    ApiResponse::ok(UploadResponse {
        report,
        companies: session.table().len(),
    })
}

/// GET /api/pivot - current table, sorted
async fn get_pivot(State(state): State<AppState>, Query(query): Query<SortQuery>) -> Response {
    let spec = match query.to_spec() {
        Ok(spec) => spec,
        Err(response) => return response,
    };

    let session = lock(&state.session);
    ApiResponse::ok(pivot_view(session.table(), &spec))
}

/// POST /api/reset
async fn reset(State(state): State<AppState>) -> Response {
    let mut session = lock(&state.session);
    session.reset();

    ApiResponse::ok(SessionInfo::of(&session))
}

fn attachment(content_type: &'static str, file_name: &str, bytes: Vec<u8>) -> Response {
    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    );

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

fn export_name(session: &UploadSession, extension: &str) -> String {
    match session.user_id() {
        Some(user) => format!("holdings_{}.{}", user, extension),
        None => format!("holdings.{}", extension),
    }
}

/// GET /api/export/csv
async fn export_csv(State(state): State<AppState>, Query(query): Query<SortQuery>) -> Response {
    let spec = match query.to_spec() {
        Ok(spec) => spec,
        Err(response) => return response,
    };

    let session = lock(&state.session);
    let mut bytes = Vec::new();
    if let Err(e) = write_csv(session.table(), &spec, &mut bytes) {
        return internal_error("CSV export failed", e);
    }

    attachment("text/csv; charset=utf-8", &export_name(&session, "csv"), bytes)
}

/// GET /api/export/xlsx
async fn export_xlsx(State(state): State<AppState>, Query(query): Query<SortQuery>) -> Response {
    let spec = match query.to_spec() {
        Ok(spec) => spec,
        Err(response) => return response,
    };

    let session = lock(&state.session);
    match write_xlsx(session.table(), &spec) {
        Ok(bytes) => attachment(
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            &export_name(&session, "xlsx"),
            bytes,
        ),
        Err(e) => internal_error("XLSX export failed", e),
    }
}

/// GET /api/snapshots - saved tables for the signed-in user
async fn get_snapshots(State(state): State<AppState>) -> Response {
    let user = match signed_in_user(&lock(&state.session)) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let conn = lock(&state.db);
    match list_snapshots(&conn, &user) {
        Ok(snapshots) => {
            let summaries: Vec<SnapshotSummary> =
                snapshots.iter().map(SnapshotSummary::from).collect();
            ApiResponse::ok(summaries)
        }
        Err(e) => internal_error("Failed to list snapshots", e),
    }
}

/// POST /api/snapshots - save the current table under a name
async fn create_snapshot(State(state): State<AppState>, Json(req): Json<SaveRequest>) -> Response {
    let session = lock(&state.session);
    let user = match signed_in_user(&session) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let name = req.name.trim();
    if name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "name must not be empty");
    }
    if session.table().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "nothing to save");
    }

    let conn = lock(&state.db);
    match save_snapshot(&conn, &user, name, session.table()) {
        Ok(snapshot) => ApiResponse::ok(SnapshotSummary::from(&snapshot)),
        Err(e) => internal_error("Failed to save snapshot", e),
    }
}

/// POST /api/snapshots/:id/load - replace the working table with a saved one
async fn load_snapshot(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let mut session = lock(&state.session);
    let user = match signed_in_user(&session) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let found = {
        let conn = lock(&state.db);
        get_snapshot(&conn, &user, &id)
    };

    match found {
        Ok(Some(snapshot)) => {
            session.load_table(snapshot.table);
            let view: PivotView = pivot_view(session.table(), &SortSpec::default());
            ApiResponse::ok(view)
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("snapshot '{}' not found", id)),
        Err(e) => internal_error("Failed to load snapshot", e),
    }
}

/// DELETE /api/snapshots/:id
async fn remove_snapshot(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let user = match signed_in_user(&lock(&state.session)) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let conn = lock(&state.db);
    match delete_snapshot(&conn, &user, &id) {
        Ok(true) => ApiResponse::ok(id),
        Ok(false) => error_response(StatusCode::NOT_FOUND, format!("snapshot '{}' not found", id)),
        Err(e) => internal_error("Failed to delete snapshot", e),
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let limit = state.max_upload_bytes;

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/session/sign-in", post(sign_in))
        .route("/session/sign-out", post(sign_out))
        .route(
            "/upload/:filename",
            post(upload).layer(DefaultBodyLimit::max(limit)),
        )
        .route("/pivot", get(get_pivot))
        .route("/export/csv", get(export_csv))
        .route("/export/xlsx", get(export_xlsx))
        .route("/reset", post(reset))
        .route("/snapshots", get(get_snapshots).post(create_snapshot))
        .route("/snapshots/:id/load", post(load_snapshot))
        .route("/snapshots/:id", delete(remove_snapshot))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        router(AppState::new(conn, &Config::default()))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn send_json(app: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
        let (status, bytes) = send(app, method, uri, body).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn upload_two(app: &Router) {
        send(
            app,
            "POST",
            "/api/upload/CLIENT_Alice_CLIENT-ID.csv",
            Body::from("Company,Holding\nInfosys,100\nITC,5\n"),
        )
        .await;
        send(
            app,
            "POST",
            "/api/upload/CLIENT_Bob_CLIENT-ID.csv",
            Body::from("Company,Holding\nITC,7\nTCS,20\n"),
        )
        .await;
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send_json(&app(), "GET", "/api/health", Body::empty()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_upload_then_pivot() {
        let app = app();
        upload_two(&app).await;

        let (status, body) = send_json(&app, "GET", "/api/pivot", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);

        let data = &body["data"];
        assert_eq!(
            data["columns"],
            serde_json::json!(["Company Name", "Alice", "Bob", "Total Holdings"])
        );
        // Default sort: total descending
        assert_eq!(data["rows"][0]["company"], "Infosys");
        assert_eq!(data["rows"][1]["company"], "TCS");
        assert_eq!(data["rows"][2]["company"], "ITC");
        assert_eq!(data["rows"][2]["values"], serde_json::json!([5.0, 7.0, 12.0]));
    }

    #[tokio::test]
    async fn test_pivot_sort_query() {
        let app = app();
        upload_two(&app).await;

        let (_, body) = send_json(
            &app,
            "GET",
            "/api/pivot?column=Company%20Name&direction=asc",
            Body::empty(),
        )
        .await;
        assert_eq!(body["data"]["rows"][0]["company"], "Infosys");
        assert_eq!(body["data"]["rows"][1]["company"], "ITC");

        let (status, _) = send(&app, "GET", "/api/pivot?direction=sideways", Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bad_upload_reports_failure() {
        let app = app();
        let (status, body) = send_json(
            &app,
            "POST",
            "/api/upload/statement.xlsx",
            Body::from("definitely not a workbook"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["report"]["files"][0]["outcome"]["status"], "decode_failed");
        assert_eq!(body["data"]["companies"], 0);
    }

    #[tokio::test]
    async fn test_export_csv() {
        let app = app();
        upload_two(&app).await;

        let (status, bytes) = send(&app, "GET", "/api/export/csv", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);

        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("Company Name,Alice,Bob,Total Holdings\n"));
        assert!(text.contains("TCS,0,20,20\n"));
    }

    #[tokio::test]
    async fn test_snapshots_require_sign_in() {
        let app = app();
        let (status, body) = send_json(&app, "GET", "/api/snapshots", Body::empty()).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_snapshot_save_load_delete() {
        let app = app();
        send(&app, "POST", "/api/session/sign-in", Body::from(r#"{"user_id":"u1"}"#)).await;
        upload_two(&app).await;

        let (status, saved) = send_json(
            &app,
            "POST",
            "/api/snapshots",
            Body::from(r#"{"name":"March"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = saved["data"]["id"].as_str().unwrap().to_string();

        send(&app, "POST", "/api/reset", Body::empty()).await;
        let (_, empty) = send_json(&app, "GET", "/api/pivot", Body::empty()).await;
        assert_eq!(empty["data"]["rows"], serde_json::json!([]));

        let (status, loaded) = send_json(
            &app,
            "POST",
            &format!("/api/snapshots/{}/load", id),
            Body::empty(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(loaded["data"]["rows"].as_array().unwrap().len(), 3);

        let (_, listed) = send_json(&app, "GET", "/api/snapshots", Body::empty()).await;
        assert_eq!(listed["data"][0]["name"], "March");

        let uri = format!("/api/snapshots/{}", id);
        let (status, _) = send(&app, "DELETE", &uri, Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "DELETE", &uri, Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sign_out_clears_table() {
        let app = app();
        send(&app, "POST", "/api/session/sign-in", Body::from(r#"{"user_id":"u1"}"#)).await;
        upload_two(&app).await;

        let (_, body) = send_json(&app, "POST", "/api/session/sign-out", Body::empty()).await;
        assert_eq!(body["data"]["companies"], 0);
        assert_eq!(body["data"]["user_id"], Value::Null);
    }
}
