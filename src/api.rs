//! REST API: routes, request bodies, and handlers.
//!
//! Every success response carries the `{"success": true, ...}`
//! envelope; failures propagate as [`ApiError`] so status codes and
//! the failure envelope stay uniform across endpoints.

use std::sync::Arc;

use axum::extract::{FromRequest, FromRequestParts, Path, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::json;

use crate::auth::{self, TokenKeys};
use crate::db::DbHandle;
use crate::errors::{ApiError, StoreError};
use crate::models::{RequestStatus, RequestType, Role};

/// Shared state handed to every handler.
pub struct AppState {
    pub db: DbHandle,
    pub keys: TokenKeys,
    /// Refuse to move requests out of Repaired or Scrap.
    pub strict_transitions: bool,
}

pub type SharedState = Arc<AppState>;

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/equipment", post(create_equipment).get(list_equipment))
        .route(
            "/equipment/{id}",
            get(get_equipment).put(update_equipment).delete(delete_equipment),
        )
        .route("/equipment/{id}/scrap", put(scrap_equipment))
        .route("/equipment/{id}/maintenance", get(equipment_maintenance))
        .route("/requests", post(create_request).get(list_requests))
        .route("/requests/{id}", get(get_request).delete(delete_request))
        // Both verbs are accepted so kanban-style clients that PUT keep working.
        .route(
            "/requests/{id}/assign",
            patch(assign_technician).put(assign_technician),
        )
        .route(
            "/requests/{id}/status",
            patch(update_request_status).put(update_request_status),
        )
        .route("/requests/preventive/calendar", get(preventive_calendar))
        .route("/teams", post(create_team).get(list_teams))
        .route(
            "/teams/{id}",
            get(get_team).put(update_team).delete(delete_team),
        )
        .route("/teams/{id}/add-member", put(add_team_member))
        .route("/teams/{id}/remove-member", put(remove_team_member))
        .route("/health", get(health_check))
}

/// `Json` with its rejection mapped onto the failure envelope, so a
/// body that fails to parse comes back as a 400 like any other
/// validation error.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidJson(value)),
            Err(rejection) => Err(ApiError::Validation(rejection.body_text())),
        }
    }
}

/// `Path` with the same treatment: a malformed id segment answers with
/// the envelope instead of axum's plain-text rejection.
pub struct ValidPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(ValidPath(value)),
            Err(rejection) => Err(ApiError::Validation(rejection.body_text())),
        }
    }
}

/// Keeps an explicit JSON null distinguishable from an absent field:
/// absent stays `None`, null becomes `Some(None)`.
fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Missing fields and empty strings fail validation the same way.
fn required(field: Option<String>, message: &str) -> Result<String, ApiError> {
    match field {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(ApiError::Validation(message.to_string())),
    }
}

// ── Auth ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegisterBody {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
    role: Option<Role>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoginBody {
    email: Option<String>,
    password: Option<String>,
}

async fn register(
    State(state): State<SharedState>,
    ValidJson(body): ValidJson<RegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
    let name = required(body.name, "All fields are required")?;
    let email = required(body.email, "All fields are required")?;
    let password = required(body.password, "All fields are required")?;
    let role = body.role.unwrap_or(Role::Technician);

    let password_hash = auth::hash_password(&password)?;
    let user = state
        .db
        .call(move |db| db.create_user(&name, &email, &password_hash, role))
        .await?;
    let token = state.keys.issue(user.id, user.role)?;
    tracing::info!(user_id = user.id, role = %user.role, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "User registered successfully",
            "token": token,
            "user": user.public(),
        })),
    ))
}

async fn login(
    State(state): State<SharedState>,
    ValidJson(body): ValidJson<LoginBody>,
) -> Result<impl IntoResponse, ApiError> {
    let email = required(body.email, "Email and password are required")?;
    let password = required(body.password, "Email and password are required")?;

    // Unknown email and wrong password answer identically so the
    // response does not reveal which one failed.
    let user = state
        .db
        .call(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::Authentication("Invalid credentials".into()))?;
    if !auth::verify_password(&password, &user.password_hash) {
        return Err(ApiError::Authentication("Invalid credentials".into()));
    }
    let token = state.keys.issue(user.id, user.role)?;
    tracing::debug!(user_id = user.id, "login");
    Ok(Json(json!({
        "success": true,
        "message": "Login successful",
        "token": token,
        "user": user.public(),
    })))
}

async fn me(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = auth::authenticate(&state.db, &state.keys, &headers).await?;
    Ok(Json(json!({"success": true, "user": user})))
}

// ── Equipment ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CreateEquipmentBody {
    name: Option<String>,
    serial_number: Option<String>,
    department: Option<String>,
    location: Option<String>,
    assigned_team: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UpdateEquipmentBody {
    name: Option<String>,
    serial_number: Option<String>,
    department: Option<String>,
    location: Option<String>,
    /// Omitted keeps the current team; an explicit null unassigns it.
    #[serde(default, deserialize_with = "present")]
    assigned_team: Option<Option<i64>>,
}

async fn create_equipment(
    State(state): State<SharedState>,
    ValidJson(body): ValidJson<CreateEquipmentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let name = required(body.name, "All required fields must be provided")?;
    let serial_number = required(body.serial_number, "All required fields must be provided")?;
    let department = required(body.department, "All required fields must be provided")?;
    let location = required(body.location, "All required fields must be provided")?;
    let team_id = body.assigned_team;

    let equipment = state
        .db
        .call(move |db| db.create_equipment(&name, &serial_number, &department, &location, team_id))
        .await?;
    tracing::info!(equipment_id = equipment.id, "equipment created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Equipment created successfully",
            "equipment": equipment,
        })),
    ))
}

async fn list_equipment(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let equipments = state.db.call(|db| db.list_equipment()).await?;
    Ok(Json(json!({
        "success": true,
        "count": equipments.len(),
        "equipments": equipments,
    })))
}

async fn get_equipment(
    State(state): State<SharedState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let (equipment, open_count) = state
        .db
        .call(move |db| {
            let equipment = db
                .get_equipment_view(id)?
                .ok_or_else(|| StoreError::NotFound("Equipment not found".into()))?;
            let open_count = db.open_request_count(id)?;
            Ok((equipment, open_count))
        })
        .await?;
    Ok(Json(json!({
        "success": true,
        "equipment": equipment,
        "openRequestCount": open_count,
    })))
}

async fn update_equipment(
    State(state): State<SharedState>,
    ValidPath(id): ValidPath<i64>,
    ValidJson(body): ValidJson<UpdateEquipmentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let equipment = state
        .db
        .call(move |db| {
            db.update_equipment(
                id,
                body.name.as_deref(),
                body.serial_number.as_deref(),
                body.department.as_deref(),
                body.location.as_deref(),
                body.assigned_team,
            )
        })
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Equipment updated successfully",
        "equipment": equipment,
    })))
}

async fn delete_equipment(
    State(state): State<SharedState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_equipment(id)).await?;
    if !deleted {
        return Err(ApiError::NotFound("Equipment not found".into()));
    }
    tracing::info!(equipment_id = id, "equipment deleted");
    Ok(Json(json!({
        "success": true,
        "message": "Equipment deleted successfully",
    })))
}

async fn scrap_equipment(
    State(state): State<SharedState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let cascaded = state.db.call(move |db| db.scrap_equipment(id)).await?;
    tracing::info!(equipment_id = id, cascaded, "equipment scrapped");
    Ok(Json(json!({
        "success": true,
        "message": "Equipment scrapped successfully",
    })))
}

async fn equipment_maintenance(
    State(state): State<SharedState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let requests = state
        .db
        .call(move |db| db.list_requests_for_equipment(id))
        .await?;
    Ok(Json(json!({
        "success": true,
        "count": requests.len(),
        "requests": requests,
    })))
}

// ── Maintenance requests ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CreateRequestBody {
    subject: Option<String>,
    #[serde(rename = "type")]
    request_type: Option<RequestType>,
    equipment_id: Option<i64>,
    scheduled_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AssignBody {
    technician_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StatusBody {
    status: RequestStatus,
    duration: Option<f64>,
}

async fn create_request(
    State(state): State<SharedState>,
    ValidJson(body): ValidJson<CreateRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let subject = required(body.subject, "Subject, type and equipment are required")?;
    let request_type = body
        .request_type
        .ok_or_else(|| ApiError::Validation("Subject, type and equipment are required".into()))?;
    let equipment_id = body
        .equipment_id
        .ok_or_else(|| ApiError::Validation("Subject, type and equipment are required".into()))?;
    let scheduled_date = body.scheduled_date;

    let request = state
        .db
        .call(move |db| db.create_request(&subject, request_type, equipment_id, scheduled_date))
        .await?;
    tracing::info!(request_id = request.id, equipment_id, "maintenance request created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Maintenance request created successfully",
            "maintenanceRequest": request,
        })),
    ))
}

async fn list_requests(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let requests = state.db.call(|db| db.list_requests()).await?;
    Ok(Json(json!({
        "success": true,
        "count": requests.len(),
        "requests": requests,
    })))
}

async fn get_request(
    State(state): State<SharedState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .db
        .call(move |db| db.get_request_view(id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Maintenance request not found".into()))?;
    Ok(Json(json!({"success": true, "request": request})))
}

async fn assign_technician(
    State(state): State<SharedState>,
    ValidPath(id): ValidPath<i64>,
    ValidJson(body): ValidJson<AssignBody>,
) -> Result<impl IntoResponse, ApiError> {
    let strict = state.strict_transitions;
    let request = state
        .db
        .call(move |db| db.assign_technician(id, body.technician_id, strict))
        .await?;
    tracing::info!(request_id = id, technician_id = body.technician_id, "technician assigned");
    Ok(Json(json!({
        "success": true,
        "message": "Technician assigned successfully",
        "request": request,
    })))
}

async fn update_request_status(
    State(state): State<SharedState>,
    ValidPath(id): ValidPath<i64>,
    ValidJson(body): ValidJson<StatusBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.duration.is_some_and(|d| d < 0.0) {
        return Err(ApiError::Validation("Duration cannot be negative".into()));
    }
    let strict = state.strict_transitions;
    let request = state
        .db
        .call(move |db| db.update_request_status(id, body.status, body.duration, strict))
        .await?;
    tracing::info!(request_id = id, status = %request.status, "request status updated");
    Ok(Json(json!({
        "success": true,
        "message": "Request updated successfully",
        "request": request,
    })))
}

async fn preventive_calendar(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let requests = state.db.call(|db| db.list_preventive_requests()).await?;
    Ok(Json(json!({"success": true, "requests": requests})))
}

async fn delete_request(
    State(state): State<SharedState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_request(id)).await?;
    if !deleted {
        return Err(ApiError::NotFound("Maintenance request not found".into()));
    }
    Ok(Json(json!({
        "success": true,
        "message": "Maintenance request deleted",
    })))
}

// ── Teams ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateTeamBody {
    name: Option<String>,
    members: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateTeamBody {
    name: Option<String>,
    members: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct MemberBody {
    user_id: i64,
}

async fn create_team(
    State(state): State<SharedState>,
    ValidJson(body): ValidJson<CreateTeamBody>,
) -> Result<impl IntoResponse, ApiError> {
    let name = required(body.name, "Team name is required")?;
    let members = body.members.unwrap_or_default();

    let team = state
        .db
        .call(move |db| db.create_team(&name, &members))
        .await?;
    tracing::info!(team_id = team.id, "maintenance team created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Maintenance team created successfully",
            "team": team,
        })),
    ))
}

async fn list_teams(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let teams = state.db.call(|db| db.list_teams()).await?;
    Ok(Json(json!({
        "success": true,
        "count": teams.len(),
        "teams": teams,
    })))
}

async fn get_team(
    State(state): State<SharedState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let team = state
        .db
        .call(move |db| db.get_team_view(id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Maintenance team not found".into()))?;
    Ok(Json(json!({"success": true, "team": team})))
}

async fn update_team(
    State(state): State<SharedState>,
    ValidPath(id): ValidPath<i64>,
    ValidJson(body): ValidJson<UpdateTeamBody>,
) -> Result<impl IntoResponse, ApiError> {
    let team = state
        .db
        .call(move |db| db.update_team(id, body.name.as_deref(), body.members.as_deref()))
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Maintenance team updated successfully",
        "team": team,
    })))
}

async fn delete_team(
    State(state): State<SharedState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_team(id)).await?;
    if !deleted {
        return Err(ApiError::NotFound("Maintenance team not found".into()));
    }
    tracing::info!(team_id = id, "maintenance team deleted");
    Ok(Json(json!({
        "success": true,
        "message": "Maintenance team deleted successfully",
    })))
}

async fn add_team_member(
    State(state): State<SharedState>,
    ValidPath(id): ValidPath<i64>,
    ValidJson(body): ValidJson<MemberBody>,
) -> Result<impl IntoResponse, ApiError> {
    let team = state
        .db
        .call(move |db| db.add_team_member(id, body.user_id))
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Team member added successfully",
        "team": team,
    })))
}

async fn remove_team_member(
    State(state): State<SharedState>,
    ValidPath(id): ValidPath<i64>,
    ValidJson(body): ValidJson<MemberBody>,
) -> Result<impl IntoResponse, ApiError> {
    let team = state
        .db
        .call(move |db| db.remove_team_member(id, body.user_id))
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Team member removed successfully",
        "team": team,
    })))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}
