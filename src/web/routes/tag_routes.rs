use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::entities::tag;
use crate::db::services::{TagError, TagService, TagStats};
use crate::web::extract::{AppJson, AppPath, AppQuery};
use crate::web::{AppError, AppState};

// --- Request Structs ---

#[derive(Deserialize)]
pub struct TagPayload {
    #[serde(default)]
    name: String,
    color: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchTagsQuery {
    name: Option<String>,
}

// --- Route Handlers ---

async fn list_tags_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<tag::Model>>, AppError> {
    let tags = TagService::list_tags(&app_state.db_pool).await?;
    Ok(Json(tags))
}

async fn create_tag_handler(
    State(app_state): State<Arc<AppState>>,
    AppJson(payload): AppJson<TagPayload>,
) -> Result<(StatusCode, Json<tag::Model>), AppError> {
    let tag = TagService::create_tag(&app_state.db_pool, &payload.name, payload.color).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

async fn get_tag_handler(
    State(app_state): State<Arc<AppState>>,
    AppPath(tag_id): AppPath<i32>,
) -> Result<Json<tag::Model>, AppError> {
    let tag = TagService::get_tag(&app_state.db_pool, tag_id).await?;
    Ok(Json(tag))
}

async fn update_tag_handler(
    State(app_state): State<Arc<AppState>>,
    AppPath(tag_id): AppPath<i32>,
    AppJson(payload): AppJson<TagPayload>,
) -> Result<Json<tag::Model>, AppError> {
    let tag =
        TagService::update_tag(&app_state.db_pool, tag_id, &payload.name, payload.color).await?;
    Ok(Json(tag))
}

async fn delete_tag_handler(
    State(app_state): State<Arc<AppState>>,
    AppPath(tag_id): AppPath<i32>,
) -> Result<StatusCode, AppError> {
    TagService::delete_tag(&app_state.db_pool, tag_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search_tags_handler(
    State(app_state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<SearchTagsQuery>,
) -> Result<Json<Vec<tag::Model>>, AppError> {
    let keyword = query.name.unwrap_or_default();
    let tags = TagService::search_tags(&app_state.db_pool, &keyword).await?;
    Ok(Json(tags))
}

async fn tag_stats_handler(
    State(app_state): State<Arc<AppState>>,
    AppPath(tag_id): AppPath<i32>,
) -> Result<Json<TagStats>, AppError> {
    let stats = TagService::get_tag_stats(&app_state.db_pool, tag_id).await?;
    Ok(Json(stats))
}

// --- Router ---

pub fn create_tags_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_tags_handler).post(create_tag_handler))
        .route("/search", get(search_tags_handler))
        .route(
            "/{tag_id}",
            get(get_tag_handler)
                .put(update_tag_handler)
                .delete(delete_tag_handler),
        )
        .route("/{tag_id}/stats", get(tag_stats_handler))
}

impl From<TagError> for AppError {
    fn from(err: TagError) -> Self {
        match err {
            TagError::DbErr(e) => AppError::DatabaseError(e.to_string()),
            TagError::NotFound(id) => AppError::NotFound {
                code: "TAG_NOT_FOUND",
                message: format!("Tag with ID {id} not found"),
            },
            TagError::DuplicateName(name) => AppError::Conflict {
                code: "DUPLICATE_TAG_NAME",
                message: format!("A tag with the name '{name}' already exists."),
            },
            TagError::TagInUse(todo_count) => AppError::TagInUse { todo_count },
            TagError::EmptyQuery => AppError::EmptySearchKeyword,
            TagError::Validation(msg) => AppError::InvalidInput(msg),
        }
    }
}
