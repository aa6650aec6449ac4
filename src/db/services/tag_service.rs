use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbConn, DbErr, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::entities::prelude::{Tag, Todo};
use crate::db::entities::tag::{self, DEFAULT_TAG_COLOR};
use crate::db::entities::todo::{self, Status};

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("Tag not found: {0}")]
    NotFound(i32),
    #[error("A tag with the name '{0}' already exists.")]
    DuplicateName(String),
    #[error("The tag is used by {0} todo(s) and cannot be deleted.")]
    TagInUse(u64),
    #[error("Search keyword must not be empty.")]
    EmptyQuery,
    #[error("Invalid tag: {0}")]
    Validation(String),
}

/// Usage figures for a single tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagStats {
    pub tag: tag::Model,
    pub total_todos: u64,
    pub completed_todos: u64,
    pub pending_todos: u64,
    pub completion_rate: u64,
}

impl TagStats {
    pub fn from_counts(tag: tag::Model, total_todos: u64, completed_todos: u64) -> Self {
        TagStats {
            tag,
            total_todos,
            completed_todos,
            pending_todos: total_todos.saturating_sub(completed_todos),
            completion_rate: completion_rate(completed_todos, total_todos),
        }
    }
}

/// Percentage of completed todos, rounded to the nearest integer and capped at 100.
/// Zero when the tag is unused.
pub fn completion_rate(completed: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64 * 100.0).round() as u64).min(100)
}

fn normalize_name(name: &str) -> Result<String, TagError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TagError::Validation("Tag name must not be blank.".to_string()));
    }
    Ok(name.to_string())
}

/// Blank colors count as "not supplied".
fn normalize_color(color: Option<String>) -> Result<Option<String>, TagError> {
    let Some(color) = color else {
        return Ok(None);
    };
    let color = color.trim();
    if color.is_empty() {
        return Ok(None);
    }
    let digits = color.strip_prefix('#').unwrap_or("");
    let valid = matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(TagError::Validation(format!(
            "Color '{color}' must be a hex code like #6c757d."
        )));
    }
    Ok(Some(color.to_string()))
}

// The unique index on `tag.name` catches inserts that race past the existence check.
fn map_write_error(err: DbErr, name: &str) -> TagError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => TagError::DuplicateName(name.to_string()),
        _ => TagError::DbErr(err),
    }
}

pub struct TagService;

impl TagService {
    pub async fn list_tags(db: &DbConn) -> Result<Vec<tag::Model>, TagError> {
        Ok(Tag::find().order_by_asc(tag::Column::Id).all(db).await?)
    }

    pub async fn create_tag(
        db: &DbConn,
        name: &str,
        color: Option<String>,
    ) -> Result<tag::Model, TagError> {
        let name = normalize_name(name)?;
        let color = normalize_color(color)?.unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string());

        let txn = db.begin().await?;
        if Tag::find()
            .filter(tag::Column::Name.eq(&name))
            .one(&txn)
            .await?
            .is_some()
        {
            warn!(name = %name, "Rejected tag creation: name already taken.");
            return Err(TagError::DuplicateName(name));
        }

        let new_tag = tag::ActiveModel {
            name: Set(name.clone()),
            color: Set(color),
            ..Default::default()
        };
        let created = new_tag
            .insert(&txn)
            .await
            .map_err(|e| map_write_error(e, &name))?;
        txn.commit().await?;

        info!(tag_id = created.id, name = %created.name, "Tag created.");
        Ok(created)
    }

    pub async fn get_tag(db: &DbConn, tag_id: i32) -> Result<tag::Model, TagError> {
        Tag::find_by_id(tag_id)
            .one(db)
            .await?
            .ok_or(TagError::NotFound(tag_id))
    }

    /// Renames and optionally recolors a tag. The color is left as is when `color` is `None`.
    pub async fn update_tag(
        db: &DbConn,
        tag_id: i32,
        name: &str,
        color: Option<String>,
    ) -> Result<tag::Model, TagError> {
        let name = normalize_name(name)?;
        let color = normalize_color(color)?;

        let txn = db.begin().await?;
        let existing = Tag::find_by_id(tag_id)
            .one(&txn)
            .await?
            .ok_or(TagError::NotFound(tag_id))?;

        if existing.name != name
            && Tag::find()
                .filter(tag::Column::Name.eq(&name))
                .one(&txn)
                .await?
                .is_some()
        {
            warn!(tag_id, name = %name, "Rejected tag rename: name already taken.");
            return Err(TagError::DuplicateName(name));
        }

        let mut active_tag: tag::ActiveModel = existing.into();
        active_tag.name = Set(name.clone());
        if let Some(color) = color {
            active_tag.color = Set(color);
        }
        let updated = active_tag
            .update(&txn)
            .await
            .map_err(|e| map_write_error(e, &name))?;
        txn.commit().await?;

        info!(tag_id, "Tag updated.");
        Ok(updated)
    }

    /// Deletes a tag that no todo refers to.
    pub async fn delete_tag(db: &DbConn, tag_id: i32) -> Result<(), TagError> {
        let txn = db.begin().await?;
        let existing = Tag::find_by_id(tag_id)
            .one(&txn)
            .await?
            .ok_or(TagError::NotFound(tag_id))?;

        let todo_count = Todo::find()
            .filter(todo::Column::TagId.eq(tag_id))
            .count(&txn)
            .await?;
        if todo_count > 0 {
            warn!(tag_id, todo_count, "Rejected tag deletion: tag still in use.");
            return Err(TagError::TagInUse(todo_count));
        }

        existing.delete(&txn).await?;
        txn.commit().await?;

        info!(tag_id, "Tag deleted.");
        Ok(())
    }

    /// Case-insensitive substring match on tag names.
    pub async fn search_tags(db: &DbConn, query: &str) -> Result<Vec<tag::Model>, TagError> {
        let keyword = query.trim().to_lowercase();
        if keyword.is_empty() {
            return Err(TagError::EmptyQuery);
        }

        // Matched in Rust: SQL LOWER/LIKE only fold ASCII on SQLite.
        let tags = Tag::find().order_by_asc(tag::Column::Id).all(db).await?;
        Ok(tags
            .into_iter()
            .filter(|t| t.name.to_lowercase().contains(&keyword))
            .collect())
    }

    /// Tag lookup and both counts read from one transaction.
    pub async fn get_tag_stats(db: &DbConn, tag_id: i32) -> Result<TagStats, TagError> {
        let txn = db.begin().await?;
        let tag = Tag::find_by_id(tag_id)
            .one(&txn)
            .await?
            .ok_or(TagError::NotFound(tag_id))?;

        let total_todos = Todo::find()
            .filter(todo::Column::TagId.eq(tag_id))
            .count(&txn)
            .await?;
        let completed_todos = Todo::find()
            .filter(todo::Column::TagId.eq(tag_id))
            .filter(todo::Column::Status.eq(Status::Done))
            .count(&txn)
            .await?;
        txn.commit().await?;

        Ok(TagStats::from_counts(tag, total_todos, completed_todos))
    }
}
