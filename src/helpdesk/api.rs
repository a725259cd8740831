use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Form, FromRequestParts, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;
use tracing::{error, warn};

use super::attachments::FileStore;
use super::cache::LookupCache;
use super::calendar::{self, CalendarBounds};
use super::dashboard::{self, Dashboard, DashboardInput};
use super::datatables::{DataTablesRequest, DataTablesResponse};
use super::db::{DbHandle, GridQuery, HelpdeskDb, TicketScope};
use super::events::EventBus;
use super::filters::{FilterKind, FilterStore, FlashLevel, FlashStore};
use super::form::{ChangeAgentForm, ChangePriorityForm, CompleteForm, read_ticket_form};
use super::lang::Translator;
use super::models::{Attachment, Role, TicketList, User};
use super::permissions::Visibility;
use super::render::GridRenderer;
use super::stats;
use super::views::{self, Lookups};
use super::workflow::{self, SaveOutcome, Transition, Workflow};
use crate::config::HelpdeskToml;
use crate::errors::HelpdeskError;

/// Header carrying the authenticated user id, set by the front proxy.
pub const USER_HEADER: &str = "x-user-id";

const LIST_URL: &str = "/tickets";

/// Months before the current one covered by the performance report when
/// the request gives no period.
const DEFAULT_PERFORMANCE_PERIOD: u32 = 2;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub cache: LookupCache,
    pub filters: FilterStore,
    pub flashes: FlashStore,
    pub files: FileStore,
    pub config: HelpdeskToml,
    pub tr: Translator,
    pub events: EventBus,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(db: DbHandle, config: HelpdeskToml) -> Self {
        let files = FileStore::new(
            config.settings.attachments_path.clone(),
            config.settings.attachments_max_bytes(),
        );
        Self {
            db,
            cache: LookupCache::default(),
            filters: FilterStore::new(),
            flashes: FlashStore::new(),
            files,
            tr: Translator::new(&config.locale.lang),
            events: EventBus::new(),
            config,
        }
    }

    fn workflow<'a>(&'a self, db: &'a HelpdeskDb, now: NaiveDateTime) -> Workflow<'a> {
        Workflow {
            db,
            settings: &self.config.settings,
            locale: &self.config.locale,
            tr: &self.tr,
            files: &self.files,
            now,
        }
    }

    fn scope(&self, user: &User, list: TicketList, bounds: CalendarBounds) -> TicketScope {
        let settings = &self.config.settings;
        TicketScope {
            list,
            visibility: Visibility::for_user(user, settings.agent_restrict),
            filters: self.filters.get(user.id),
            default_status_id: settings.default_status_id,
            bounds,
        }
    }

    async fn lookups(&self) -> Result<Lookups, ApiError> {
        Ok(Lookups {
            priorities: self.cache.priorities(&self.db).await?.as_ref().clone(),
            statuses: self.cache.statuses(&self.db).await?.as_ref().clone(),
        })
    }
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
    Unauthorized(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast_ref::<HelpdeskError>() {
            Some(he) if he.is_not_found() => ApiError::NotFound(he.to_string()),
            Some(he @ HelpdeskError::Forbidden(_)) => ApiError::Forbidden(he.to_string()),
            Some(he @ HelpdeskError::BadRequest(_)) => ApiError::BadRequest(he.to_string()),
            _ => {
                error!("request failed: {:#}", e);
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<HelpdeskError> for ApiError {
    fn from(e: HelpdeskError) -> Self {
        anyhow::Error::from(e).into()
    }
}

// ── Current user ──────────────────────────────────────────────────────

/// The user named by the `X-User-Id` header.
pub struct CurrentUser(pub User);

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing or invalid X-User-Id header".into()))?;
        state
            .db
            .call(move |db| db.get_user(id))
            .await?
            .map(CurrentUser)
            .ok_or_else(|| ApiError::Unauthorized(format!("Unknown user {}", id)))
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/tickets", get(index).post(store))
        .route("/tickets/newest", get(index_newest))
        .route("/tickets/complete", get(index_complete))
        .route("/tickets/create", get(create_form))
        .route("/tickets/data/{list}", get(grid_data))
        .route("/tickets/changeagent", post(change_agent))
        .route("/tickets/changepriority", post(change_priority))
        .route("/tickets/agents/{category_id}", get(agent_list))
        .route("/tickets/filter/{filter}/{value}", post(set_filter))
        .route("/tickets/performance", get(performance))
        .route(
            "/tickets/{id}",
            get(show).put(update).patch(update).delete(destroy),
        )
        .route("/tickets/{id}/edit", get(edit_form))
        .route("/tickets/{id}/complete", post(complete))
        .route("/tickets/{id}/reopen", post(reopen))
        .route("/attachments/{id}/download", get(download_attachment))
        .route("/attachments/{id}/view", get(view_attachment))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Run a workflow operation on the blocking pool.
async fn run_workflow<R, F>(state: &SharedState, f: F) -> Result<R, ApiError>
where
    F: FnOnce(&Workflow<'_>) -> anyhow::Result<R> + Send + 'static,
    R: Send + 'static,
{
    let st = state.clone();
    let now = calendar::now();
    Ok(state.db.call(move |db| f(&st.workflow(db, now))).await?)
}

fn back_url(headers: &HeaderMap) -> String {
    headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(LIST_URL)
        .to_string()
}

/// Publish and flash a finished transition, then redirect.
fn finish_transition(state: &AppState, user_id: i64, headers: &HeaderMap, t: Transition) -> Response {
    match t {
        Transition::Applied { event, message, .. } => {
            state.events.publish(&event);
            state.flashes.push(user_id, FlashLevel::Success, message);
            Redirect::to(LIST_URL).into_response()
        }
        Transition::Rejected { message, redirect } => {
            state.flashes.push(user_id, FlashLevel::Warning, message);
            let to = match redirect {
                workflow::Redirect::List => LIST_URL.to_string(),
                workflow::Redirect::Back => back_url(headers),
            };
            Redirect::to(&to).into_response()
        }
    }
}

fn finish_save(state: &AppState, user_id: i64, outcome: SaveOutcome) -> Response {
    let saved = match outcome {
        SaveOutcome::Invalid(bag) => {
            return Json(serde_json::json!({
                "result": "error",
                "messages": bag.messages,
                "fields": bag.fields,
            }))
            .into_response();
        }
        SaveOutcome::Saved(saved) => *saved,
    };

    state.events.publish(&saved.event);
    state.flashes.push(user_id, FlashLevel::Success, saved.message);
    let url = format!("/tickets/{}", saved.ticket.id);
    if saved.attachment_errors.is_empty() {
        return Json(serde_json::json!({"result": "ok", "url": url})).into_response();
    }

    warn!(
        ticket_id = saved.ticket.id,
        errors = saved.attachment_errors.messages.len(),
        "ticket saved with attachment errors"
    );
    state
        .flashes
        .push(user_id, FlashLevel::Warning, state.tr.t("flash.attachment_errors"));
    Json(serde_json::json!({
        "result": "error",
        "url": url,
        "messages": saved.attachment_errors.messages,
        "fields": saved.attachment_errors.fields,
    }))
    .into_response()
}

// ── List views ────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_view(state: &SharedState, user: User, list: TicketList) -> Result<Json<Dashboard>, ApiError> {
    let settings = &state.config.settings;
    let filters = state.filters.get(user.id);
    let agent_restrict = settings.agent_restrict;
    let default_status_id = settings.default_status_id;
    let bounds = CalendarBounds::at(calendar::now());
    let viewer = user.clone();
    let mut dashboard = state
        .db
        .call(move |db| {
            dashboard::assemble(
                db,
                &DashboardInput {
                    user: &viewer,
                    list,
                    filters,
                    agent_restrict,
                    default_status_id,
                    bounds,
                },
            )
        })
        .await?;
    if dashboard.stale_agent_filter {
        state.filters.clear(user.id, FilterKind::Agent);
    }
    dashboard.flashes = state.flashes.drain(user.id);
    Ok(Json(dashboard))
}

async fn index(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    list_view(&state, user, TicketList::Active).await
}

async fn index_newest(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    list_view(&state, user, TicketList::Newest).await
}

async fn index_complete(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    list_view(&state, user, TicketList::Complete).await
}

async fn grid_data(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(list): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError> {
    let list: TicketList = list.parse().map_err(ApiError::BadRequest)?;
    let settings = &state.config.settings;
    let req = DataTablesRequest::from_pairs(&pairs, settings.paginate_items);
    let now = calendar::now();
    let bounds = CalendarBounds::at(now);
    let query = GridQuery {
        scope: state.scope(&user, list, bounds),
        departments: settings.departments_feature,
        recent_since: now - Duration::hours(settings.recent_comments_hours),
        search: req.search.clone(),
        search_columns: req.search_columns(),
        order: req.order_by(),
        start: req.start,
        length: req.length,
    };
    let (page, categories) = state
        .db
        .call(move |db| Ok((db.grid_page(&query)?, db.categories_with_agents()?)))
        .await?;
    let priorities = state.cache.priorities(&state.db).await?;

    let mut renderer = GridRenderer::new(
        &state.tr,
        bounds,
        &state.config.locale.datetime_format,
        &categories,
        &priorities,
    );
    renderer.subject_content_column = settings.subject_content_column;
    renderer.departments = settings.departments_feature;
    renderer.quick_change = user.role != Role::User;

    Ok(Json(DataTablesResponse {
        draw: req.draw,
        records_total: page.total,
        records_filtered: page.filtered,
        data: page.rows.iter().map(|row| renderer.render_row(row)).collect(),
    }))
}

// ── Ticket pages ──────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ShowQuery {
    pub page: Option<usize>,
}

#[derive(Deserialize)]
pub struct CreateQuery {
    pub category_id: Option<i64>,
}

async fn show(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Query(q): Query<ShowQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let statuses = state.lookups().await?.statuses;
    let st = state.clone();
    let page = state
        .db
        .call(move |db| views::ticket_page(db, &user, id, &st.config.settings, statuses, q.page.unwrap_or(1)))
        .await?;
    Ok(Json(page))
}

async fn create_form(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<CreateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let lookups = state.lookups().await?;
    let st = state.clone();
    let page = state
        .db
        .call(move |db| views::create_form(db, &user, &st.config.settings, q.category_id, lookups))
        .await?;
    Ok(Json(page))
}

async fn edit_form(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let lookups = state.lookups().await?;
    let st = state.clone();
    let page = state
        .db
        .call(move |db| views::edit_form(db, &user, id, &st.config.locale.datetime_format, lookups))
        .await?;
    Ok(Json(page))
}

async fn agent_list(
    State(state): State<SharedState>,
    CurrentUser(_user): CurrentUser,
    Path(category_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let agents = state
        .db
        .call(move |db| {
            db.get_category(category_id)?
                .ok_or(HelpdeskError::CategoryNotFound { id: category_id })?;
            db.category_agents(category_id)
        })
        .await?;
    let mut list = vec![serde_json::json!({"id": "auto", "name": state.tr.t("grid.auto_agent")})];
    list.extend(
        agents
            .iter()
            .map(|a| serde_json::json!({"id": a.id, "name": a.name})),
    );
    Ok(Json(list))
}

// ── Writes ────────────────────────────────────────────────────────────

async fn store(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = read_ticket_form(multipart).await?;
    let user_id = user.id;
    let outcome = run_workflow(&state, move |wf| wf.store(&user, &form)).await?;
    Ok(finish_save(&state, user_id, outcome))
}

async fn update(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = read_ticket_form(multipart).await?;
    let user_id = user.id;
    let outcome = run_workflow(&state, move |wf| wf.update(&user, id, &form)).await?;
    Ok(finish_save(&state, user_id, outcome))
}

async fn complete(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Form(form): Form<CompleteForm>,
) -> Result<Response, ApiError> {
    let user_id = user.id;
    let t = run_workflow(&state, move |wf| wf.complete(&user, id, &form)).await?;
    Ok(finish_transition(&state, user_id, &headers, t))
}

async fn reopen(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user_id = user.id;
    let t = run_workflow(&state, move |wf| wf.reopen(&user, id)).await?;
    Ok(finish_transition(&state, user_id, &headers, t))
}

async fn change_agent(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    Form(form): Form<ChangeAgentForm>,
) -> Result<Response, ApiError> {
    let user_id = user.id;
    let t = run_workflow(&state, move |wf| wf.change_agent(&user, &form)).await?;
    Ok(finish_transition(&state, user_id, &headers, t))
}

async fn change_priority(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    Form(form): Form<ChangePriorityForm>,
) -> Result<Response, ApiError> {
    let user_id = user.id;
    let t = run_workflow(&state, move |wf| wf.change_priority(&user, &form)).await?;
    Ok(finish_transition(&state, user_id, &headers, t))
}

async fn destroy(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user_id = user.id;
    let t = run_workflow(&state, move |wf| wf.destroy(&user, id)).await?;
    Ok(finish_transition(&state, user_id, &headers, t))
}

async fn set_filter(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path((filter, value)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let kind: FilterKind = filter.parse()?;
    state.filters.apply(user.id, kind, &value)?;
    Ok(Redirect::to(&back_url(&headers)).into_response())
}

// ── Performance ───────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct PerformanceQuery {
    pub period: Option<u32>,
}

async fn performance(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<PerformanceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if !user.is_admin() {
        return Err(ApiError::Forbidden("Performance stats are for admins".into()));
    }
    let period = q.period.unwrap_or(DEFAULT_PERFORMANCE_PERIOD);
    let now = calendar::now();
    let report = state
        .db
        .call(move |db| stats::monthly_performance(db, period, now))
        .await?;
    Ok(Json(report))
}

// ── Attachments ───────────────────────────────────────────────────────

/// Load an attachment the user may read: owner, agent of the category or
/// admin.
async fn readable_attachment(state: &SharedState, user: User, id: i64) -> Result<(Attachment, Vec<u8>), ApiError> {
    let attachment = state
        .db
        .call(move |db| {
            let attachment = db
                .get_attachment(id)?
                .ok_or(HelpdeskError::AttachmentNotFound { id })?;
            let ticket = db
                .get_ticket(attachment.ticket_id)?
                .ok_or(HelpdeskError::TicketNotFound {
                    id: attachment.ticket_id,
                })?;
            let is_agent = db.is_category_agent(ticket.category_id, user.id)?;
            if !(user.is_admin() || is_agent || ticket.user_id == user.id) {
                return Err(HelpdeskError::Forbidden(format!("read attachment {}", id)).into());
            }
            Ok(attachment)
        })
        .await?;

    let bytes = match tokio::fs::read(&attachment.file_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!("Attachment {} file is missing", id)));
        }
        Err(e) => return Err(ApiError::Internal(format!("Failed to read attachment: {}", e))),
    };
    Ok((attachment, bytes))
}

fn disposition(kind: &str, filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| if (c.is_ascii_graphic() && c != '"') || c == ' ' { c } else { '_' })
        .collect();
    format!("{}; filename=\"{}\"", kind, safe)
}

fn file_response(attachment: &Attachment, bytes: Vec<u8>, inline: bool) -> Response {
    let kind = if inline { "inline" } else { "attachment" };
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, attachment.mimetype.clone()),
            (header::CONTENT_DISPOSITION, disposition(kind, &attachment.new_filename)),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        ],
        bytes,
    )
        .into_response()
}

async fn download_attachment(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let (attachment, bytes) = readable_attachment(&state, user, id).await?;
    Ok(file_response(&attachment, bytes, false))
}

/// Types the browser may render in place. Scriptable formats such as SVG
/// are not listed.
const INLINE_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/bmp",
    "application/pdf",
];

/// Raster images and PDFs render in the browser; anything else downloads.
async fn view_attachment(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let (attachment, bytes) = readable_attachment(&state, user, id).await?;
    let inline = INLINE_TYPES.contains(&attachment.mimetype.as_str());
    Ok(file_response(&attachment, bytes, inline))
}
