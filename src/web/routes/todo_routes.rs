use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, patch},
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;

use crate::db::entities::todo::{Priority, Status};
use crate::db::services::{TodoError, TodoFilter, TodoInput, TodoService, TodoStats};
use crate::web::models::TodoResponse;
use crate::web::extract::{AppJson, AppPath, AppQuery};
use crate::web::{AppError, AppState};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoPayload {
    #[serde(default)]
    pub title: String,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "deserialize_due_date")]
    pub due_date: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub tag_id: i32,
}

/// Accepts RFC 3339 timestamps, or local date-times without an offset, which are taken as UTC.
fn parse_due_date(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("invalid dueDate '{raw}'"))
}

fn deserialize_due_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => {
            parse_due_date(&raw).map(Some).map_err(serde::de::Error::custom)
        }
        _ => Ok(None),
    }
}

fn parse_token<T>(raw: Option<String>) -> Result<Option<T>, TodoError>
where
    T: std::str::FromStr,
    TodoError: From<T::Err>,
{
    match raw {
        Some(value) if !value.trim().is_empty() => Ok(Some(value.parse::<T>()?)),
        _ => Ok(None),
    }
}

impl TryFrom<TodoPayload> for TodoInput {
    type Error = TodoError;

    fn try_from(payload: TodoPayload) -> Result<Self, Self::Error> {
        Ok(TodoInput {
            title: payload.title,
            content: payload.content,
            due_date: payload.due_date,
            status: parse_token::<Status>(payload.status)?,
            priority: parse_token::<Priority>(payload.priority)?,
            tag_id: payload.tag_id,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTodosQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub tag_id: Option<i32>,
}

#[derive(Deserialize)]
pub struct PriorityQuery {
    pub priority: Option<String>,
}

pub fn todo_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_todos).post(create_todo))
        .route("/stats", get(todo_stats))
        .route("/{id}", get(get_todo).put(update_todo).delete(delete_todo))
        .route("/{id}/complete", patch(complete_todo))
        .route("/{id}/restart", patch(restart_todo))
        .route("/{id}/priority", patch(change_priority))
}

async fn create_todo(
    State(app_state): State<Arc<AppState>>,
    AppJson(payload): AppJson<TodoPayload>,
) -> Result<(StatusCode, Json<TodoResponse>), AppError> {
    let todo = TodoService::create_todo(&app_state.db_pool, TodoInput::try_from(payload)?).await?;
    Ok((StatusCode::CREATED, Json(todo.into())))
}

async fn list_todos(
    State(app_state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<ListTodosQuery>,
) -> Result<Json<Vec<TodoResponse>>, AppError> {
    let filter = TodoFilter {
        search: query.search,
        tag_id: query.tag_id,
        status: query.status,
        priority: query.priority,
        sort: query.sort,
    };
    let todos = TodoService::list_todos(&app_state.db_pool, &filter).await?;
    Ok(Json(todos.into_iter().map(TodoResponse::from).collect()))
}

async fn get_todo(
    State(app_state): State<Arc<AppState>>,
    AppPath(id): AppPath<i32>,
) -> Result<Json<TodoResponse>, AppError> {
    let todo = TodoService::get_todo(&app_state.db_pool, id).await?;
    Ok(Json(todo.into()))
}

async fn update_todo(
    State(app_state): State<Arc<AppState>>,
    AppPath(id): AppPath<i32>,
    AppJson(payload): AppJson<TodoPayload>,
) -> Result<Json<TodoResponse>, AppError> {
    let todo = TodoService::update_todo(&app_state.db_pool, id, TodoInput::try_from(payload)?).await?;
    Ok(Json(todo.into()))
}

async fn delete_todo(
    State(app_state): State<Arc<AppState>>,
    AppPath(id): AppPath<i32>,
) -> Result<StatusCode, AppError> {
    TodoService::delete_todo(&app_state.db_pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn complete_todo(
    State(app_state): State<Arc<AppState>>,
    AppPath(id): AppPath<i32>,
) -> Result<Json<TodoResponse>, AppError> {
    let todo = TodoService::complete_todo(&app_state.db_pool, id).await?;
    Ok(Json(todo.into()))
}

async fn restart_todo(
    State(app_state): State<Arc<AppState>>,
    AppPath(id): AppPath<i32>,
) -> Result<Json<TodoResponse>, AppError> {
    let todo = TodoService::restart_todo(&app_state.db_pool, id).await?;
    Ok(Json(todo.into()))
}

async fn change_priority(
    State(app_state): State<Arc<AppState>>,
    AppPath(id): AppPath<i32>,
    AppQuery(query): AppQuery<PriorityQuery>,
) -> Result<Json<TodoResponse>, AppError> {
    let priority = query
        .priority
        .unwrap_or_default()
        .parse::<Priority>()
        .map_err(TodoError::from)?;
    let todo = TodoService::change_priority(&app_state.db_pool, id, priority).await?;
    Ok(Json(todo.into()))
}

async fn todo_stats(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<TodoStats>, AppError> {
    let stats = TodoService::get_stats(&app_state.db_pool).await?;
    Ok(Json(stats))
}

impl From<TodoError> for AppError {
    fn from(err: TodoError) -> Self {
        match err {
            TodoError::DbErr(e) => AppError::DatabaseError(e.to_string()),
            TodoError::NotFound(id) => AppError::NotFound {
                code: "TODO_NOT_FOUND",
                message: format!("Todo with ID {id} not found"),
            },
            TodoError::TagNotFound(id) => AppError::UnknownReference {
                code: "TAG_NOT_FOUND",
                message: format!("Tag with ID {id} does not exist"),
            },
            TodoError::InvalidFilterValue(e) => AppError::InvalidFilterValue(e.to_string()),
            TodoError::Validation(msg) => AppError::InvalidInput(msg),
        }
    }
}
