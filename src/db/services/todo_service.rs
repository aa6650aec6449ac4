use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbConn, DbErr, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use crate::db::entities::prelude::{Tag, Todo};
use crate::db::entities::tag;
use crate::db::entities::todo::{self, ParseEnumError, Priority, Status};

pub const MAX_TITLE_CHARS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum TodoError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("Todo not found: {0}")]
    NotFound(i32),
    #[error("Tag not found: {0}")]
    TagNotFound(i32),
    #[error("Invalid filter value: {0}")]
    InvalidFilterValue(#[from] ParseEnumError),
    #[error("Invalid todo: {0}")]
    Validation(String),
}

/// Fields accepted when creating or replacing a todo.
#[derive(Debug, Clone, Default)]
pub struct TodoInput {
    pub title: String,
    pub content: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub tag_id: i32,
}

/// Raw list parameters as they arrive from a client.
#[derive(Debug, Clone, Default)]
pub struct TodoFilter {
    pub search: Option<String>,
    pub tag_id: Option<i32>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub sort: Option<String>,
}

/// The single listing a [`TodoFilter`] selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoQuery {
    Search(String),
    ByTag(i32),
    ByStatus(Status),
    ByPriority(Priority),
    SortByDueDate,
    SortByCreated,
    All,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl TodoFilter {
    /// Picks one listing. Precedence: search, tag, status, priority, sort, then everything.
    pub fn resolve(&self) -> Result<TodoQuery, TodoError> {
        if let Some(keyword) = non_blank(&self.search) {
            return Ok(TodoQuery::Search(keyword.to_string()));
        }
        if let Some(tag_id) = self.tag_id {
            return Ok(TodoQuery::ByTag(tag_id));
        }
        if let Some(status) = non_blank(&self.status) {
            return Ok(TodoQuery::ByStatus(status.parse()?));
        }
        if let Some(priority) = non_blank(&self.priority) {
            return Ok(TodoQuery::ByPriority(priority.parse()?));
        }
        Ok(match self.sort.as_deref() {
            Some(sort) if sort.eq_ignore_ascii_case("dueDate") => TodoQuery::SortByDueDate,
            Some(sort) if sort.eq_ignore_ascii_case("created") => TodoQuery::SortByCreated,
            _ => TodoQuery::All,
        })
    }
}

/// A todo together with the tag it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoWithTag {
    pub todo: todo::Model,
    pub tag: Option<tag::Model>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TodoStats {
    pub total: u64,
    pub completed: u64,
    pub pending: u64,
}

fn validate_title(title: &str) -> Result<String, TodoError> {
    if title.trim().is_empty() {
        return Err(TodoError::Validation("Title must not be blank.".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(TodoError::Validation(format!(
            "Title must be at most {MAX_TITLE_CHARS} characters."
        )));
    }
    Ok(title.to_string())
}

async fn find_tag<C: ConnectionTrait>(conn: &C, tag_id: i32) -> Result<tag::Model, TodoError> {
    Tag::find_by_id(tag_id)
        .one(conn)
        .await?
        .ok_or(TodoError::TagNotFound(tag_id))
}

async fn find_todo<C: ConnectionTrait>(conn: &C, todo_id: i32) -> Result<todo::Model, TodoError> {
    Todo::find_by_id(todo_id)
        .one(conn)
        .await?
        .ok_or(TodoError::NotFound(todo_id))
}

async fn attach_tag<C: ConnectionTrait>(
    conn: &C,
    todo: todo::Model,
) -> Result<TodoWithTag, TodoError> {
    let tag = Tag::find_by_id(todo.tag_id).one(conn).await?;
    Ok(TodoWithTag { todo, tag })
}

/// Resolves the tags of a page of todos with one lookup.
async fn attach_tags<C: ConnectionTrait>(
    conn: &C,
    todos: Vec<todo::Model>,
) -> Result<Vec<TodoWithTag>, TodoError> {
    if todos.is_empty() {
        return Ok(Vec::new());
    }
    let mut tag_ids: Vec<i32> = todos.iter().map(|t| t.tag_id).collect();
    tag_ids.sort_unstable();
    tag_ids.dedup();

    let tags: HashMap<i32, tag::Model> = Tag::find()
        .filter(tag::Column::Id.is_in(tag_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();

    Ok(todos
        .into_iter()
        .map(|todo| {
            let tag = tags.get(&todo.tag_id).cloned();
            TodoWithTag { todo, tag }
        })
        .collect())
}

pub struct TodoService;

impl TodoService {
    /// Creates a todo. Missing due date, status and priority default to now, TODO and MEDIUM.
    pub async fn create_todo(db: &DbConn, input: TodoInput) -> Result<TodoWithTag, TodoError> {
        let title = validate_title(&input.title)?;
        let now = Utc::now();

        let txn = db.begin().await?;
        let tag = find_tag(&txn, input.tag_id).await?;

        let new_todo = todo::ActiveModel {
            title: Set(title),
            content: Set(input.content),
            due_date: Set(input.due_date.unwrap_or(now)),
            status: Set(input.status.unwrap_or_default()),
            priority: Set(input.priority.unwrap_or_default()),
            tag_id: Set(tag.id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let created = new_todo.insert(&txn).await?;
        txn.commit().await?;

        info!(todo_id = created.id, tag_id = tag.id, "Todo created.");
        Ok(TodoWithTag {
            todo: created,
            tag: Some(tag),
        })
    }

    pub async fn list_todos(
        db: &DbConn,
        filter: &TodoFilter,
    ) -> Result<Vec<TodoWithTag>, TodoError> {
        let query = filter.resolve()?;
        let select = Todo::find();
        let select = match &query {
            TodoQuery::Search(keyword) => select
                .filter(todo::Column::Title.contains(keyword.as_str()))
                .order_by_asc(todo::Column::Id),
            TodoQuery::ByTag(tag_id) => select
                .filter(todo::Column::TagId.eq(*tag_id))
                .order_by_asc(todo::Column::Id),
            TodoQuery::ByStatus(status) => select
                .filter(todo::Column::Status.eq(*status))
                .order_by_asc(todo::Column::Id),
            TodoQuery::ByPriority(priority) => select
                .filter(todo::Column::Priority.eq(*priority))
                .order_by_asc(todo::Column::Id),
            TodoQuery::SortByDueDate => select
                .order_by_asc(todo::Column::DueDate)
                .order_by_asc(todo::Column::Id),
            TodoQuery::SortByCreated => select
                .order_by_desc(todo::Column::CreatedAt)
                .order_by_desc(todo::Column::Id),
            TodoQuery::All => select.order_by_asc(todo::Column::Id),
        };
        let mut todos = select.all(db).await?;

        // LIKE may fold case or expand wildcards depending on the backend; title search is
        // a literal, case-sensitive substring match.
        if let TodoQuery::Search(keyword) = &query {
            todos.retain(|t| t.title.contains(keyword.as_str()));
        }

        attach_tags(db, todos).await
    }

    pub async fn get_todo(db: &DbConn, todo_id: i32) -> Result<TodoWithTag, TodoError> {
        let todo = find_todo(db, todo_id).await?;
        attach_tag(db, todo).await
    }

    /// Replaces a todo. Omitted due date, status or priority keep their current values.
    pub async fn update_todo(
        db: &DbConn,
        todo_id: i32,
        input: TodoInput,
    ) -> Result<TodoWithTag, TodoError> {
        let title = validate_title(&input.title)?;

        let txn = db.begin().await?;
        let tag = find_tag(&txn, input.tag_id).await?;
        let existing = find_todo(&txn, todo_id).await?;

        let mut active_todo: todo::ActiveModel = existing.into();
        active_todo.title = Set(title);
        active_todo.content = Set(input.content);
        if let Some(due_date) = input.due_date {
            active_todo.due_date = Set(due_date);
        }
        if let Some(status) = input.status {
            active_todo.status = Set(status);
        }
        if let Some(priority) = input.priority {
            active_todo.priority = Set(priority);
        }
        active_todo.tag_id = Set(tag.id);
        active_todo.updated_at = Set(Utc::now());

        let updated = active_todo.update(&txn).await?;
        txn.commit().await?;

        info!(todo_id, tag_id = tag.id, "Todo updated.");
        Ok(TodoWithTag {
            todo: updated,
            tag: Some(tag),
        })
    }

    pub async fn delete_todo(db: &DbConn, todo_id: i32) -> Result<(), TodoError> {
        let txn = db.begin().await?;
        let existing = find_todo(&txn, todo_id).await?;
        existing.delete(&txn).await?;
        txn.commit().await?;

        info!(todo_id, "Todo deleted.");
        Ok(())
    }

    pub async fn complete_todo(db: &DbConn, todo_id: i32) -> Result<TodoWithTag, TodoError> {
        Self::change_status(db, todo_id, Status::Done).await
    }

    pub async fn restart_todo(db: &DbConn, todo_id: i32) -> Result<TodoWithTag, TodoError> {
        Self::change_status(db, todo_id, Status::Todo).await
    }

    async fn change_status(
        db: &DbConn,
        todo_id: i32,
        status: Status,
    ) -> Result<TodoWithTag, TodoError> {
        let txn = db.begin().await?;
        let existing = find_todo(&txn, todo_id).await?;

        let mut active_todo: todo::ActiveModel = existing.into();
        active_todo.status = Set(status);
        active_todo.updated_at = Set(Utc::now());
        let updated = active_todo.update(&txn).await?;
        let result = attach_tag(&txn, updated).await?;
        txn.commit().await?;

        info!(todo_id, status = %status, "Todo status changed.");
        Ok(result)
    }

    pub async fn change_priority(
        db: &DbConn,
        todo_id: i32,
        priority: Priority,
    ) -> Result<TodoWithTag, TodoError> {
        let txn = db.begin().await?;
        let existing = find_todo(&txn, todo_id).await?;

        let mut active_todo: todo::ActiveModel = existing.into();
        active_todo.priority = Set(priority);
        active_todo.updated_at = Set(Utc::now());
        let updated = active_todo.update(&txn).await?;
        let result = attach_tag(&txn, updated).await?;
        txn.commit().await?;

        info!(todo_id, priority = %priority, "Todo priority changed.");
        Ok(result)
    }

    pub async fn get_stats(db: &DbConn) -> Result<TodoStats, TodoError> {
        let total = Todo::find().count(db).await?;
        let completed = Todo::find()
            .filter(todo::Column::Status.eq(Status::Done))
            .count(db)
            .await?;
        let pending = Todo::find()
            .filter(todo::Column::Status.eq(Status::Todo))
            .count(db)
            .await?;
        Ok(TodoStats {
            total,
            completed,
            pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::services::tag_service::TagService;
    use crate::db::test_support::memory_db;
    use chrono::{Duration, TimeZone};

    fn input(title: &str, tag_id: i32) -> TodoInput {
        TodoInput {
            title: title.to_string(),
            tag_id,
            ..Default::default()
        }
    }

    fn filter() -> TodoFilter {
        TodoFilter::default()
    }

    #[test]
    fn test_filter_precedence() {
        let all = TodoFilter {
            search: Some("milk".into()),
            tag_id: Some(3),
            status: Some("done".into()),
            priority: Some("high".into()),
            sort: Some("dueDate".into()),
        };
        assert_eq!(all.resolve().unwrap(), TodoQuery::Search("milk".into()));

        let no_search = TodoFilter { search: Some("  ".into()), ..all.clone() };
        assert_eq!(no_search.resolve().unwrap(), TodoQuery::ByTag(3));

        let no_tag = TodoFilter { tag_id: None, ..no_search.clone() };
        assert_eq!(no_tag.resolve().unwrap(), TodoQuery::ByStatus(Status::Done));

        let no_status = TodoFilter { status: None, ..no_tag.clone() };
        assert_eq!(no_status.resolve().unwrap(), TodoQuery::ByPriority(Priority::High));

        let no_priority = TodoFilter { priority: Some("".into()), ..no_status };
        assert_eq!(no_priority.resolve().unwrap(), TodoQuery::SortByDueDate);

        let created = TodoFilter { sort: Some("CREATED".into()), ..filter() };
        assert_eq!(created.resolve().unwrap(), TodoQuery::SortByCreated);

        let unknown_sort = TodoFilter { sort: Some("title".into()), ..filter() };
        assert_eq!(unknown_sort.resolve().unwrap(), TodoQuery::All);
        assert_eq!(filter().resolve().unwrap(), TodoQuery::All);
    }

    #[test]
    fn test_filter_rejects_unknown_enum_tokens() {
        let bad_status = TodoFilter { status: Some("archived".into()), ..filter() };
        assert!(matches!(bad_status.resolve(), Err(TodoError::InvalidFilterValue(_))));

        let bad_priority = TodoFilter { priority: Some("urgent".into()), ..filter() };
        assert!(matches!(bad_priority.resolve(), Err(TodoError::InvalidFilterValue(_))));

        // A higher-precedence filter wins before the bad token is looked at.
        let shadowed = TodoFilter { tag_id: Some(1), status: Some("archived".into()), ..filter() };
        assert_eq!(shadowed.resolve().unwrap(), TodoQuery::ByTag(1));
    }

    #[test]
    fn test_validate_title() {
        assert!(matches!(validate_title(" "), Err(TodoError::Validation(_))));
        assert!(validate_title(&"a".repeat(MAX_TITLE_CHARS)).is_ok());
        assert!(matches!(
            validate_title(&"a".repeat(MAX_TITLE_CHARS + 1)),
            Err(TodoError::Validation(_))
        ));
        // Length is counted in characters, not bytes.
        assert!(validate_title(&"한".repeat(MAX_TITLE_CHARS)).is_ok());
    }

    #[tokio::test]
    async fn test_create_todo_applies_defaults() {
        let db = memory_db().await;
        let tag = TagService::create_tag(&db, "study", None).await.unwrap();

        let before = Utc::now();
        let created = TodoService::create_todo(&db, input("Learn X", tag.id)).await.unwrap();
        let after = Utc::now();

        assert_eq!(created.todo.status, Status::Todo);
        assert_eq!(created.todo.priority, Priority::Medium);
        assert!(created.todo.due_date >= before && created.todo.due_date <= after);
        assert_eq!(created.todo.created_at, created.todo.updated_at);
        assert_eq!(created.tag.as_ref().map(|t| t.name.as_str()), Some("study"));

        let fetched = TodoService::get_todo(&db, created.todo.id).await.unwrap();
        assert_eq!(fetched.todo.title, "Learn X");
        assert_eq!(fetched.tag, Some(tag));
    }

    #[tokio::test]
    async fn test_create_todo_with_unknown_tag_fails() {
        let db = memory_db().await;
        let err = TodoService::create_todo(&db, input("orphan", 41)).await.unwrap_err();
        assert!(matches!(err, TodoError::TagNotFound(41)));
        assert_eq!(TodoService::get_stats(&db).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_update_todo_replaces_fields_and_keeps_created_at() {
        let db = memory_db().await;
        let study = TagService::create_tag(&db, "study", None).await.unwrap();
        let work = TagService::create_tag(&db, "work", None).await.unwrap();

        let created = TodoService::create_todo(
            &db,
            TodoInput {
                content: Some("chapter 4".into()),
                priority: Some(Priority::Low),
                ..input("Spring", study.id)
            },
        )
        .await
        .unwrap();

        let due = Utc.with_ymd_and_hms(2030, 1, 15, 9, 0, 0).unwrap();
        let updated = TodoService::update_todo(
            &db,
            created.todo.id,
            TodoInput {
                due_date: Some(due),
                status: Some(Status::Done),
                ..input("Spring Boot", work.id)
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.todo.title, "Spring Boot");
        assert_eq!(updated.todo.content, None);
        assert_eq!(updated.todo.due_date, due);
        assert_eq!(updated.todo.status, Status::Done);
        // Omitted priority keeps the stored value.
        assert_eq!(updated.todo.priority, Priority::Low);
        assert_eq!(updated.todo.tag_id, work.id);
        assert_eq!(updated.todo.created_at, created.todo.created_at);
        assert!(updated.todo.updated_at >= created.todo.updated_at);
    }

    #[tokio::test]
    async fn test_update_todo_errors() {
        let db = memory_db().await;
        let tag = TagService::create_tag(&db, "study", None).await.unwrap();
        let created = TodoService::create_todo(&db, input("a", tag.id)).await.unwrap();

        assert!(matches!(
            TodoService::update_todo(&db, created.todo.id, input("a", 999)).await,
            Err(TodoError::TagNotFound(999))
        ));
        assert!(matches!(
            TodoService::update_todo(&db, 555, input("a", tag.id)).await,
            Err(TodoError::NotFound(555))
        ));
        assert!(matches!(
            TodoService::update_todo(&db, created.todo.id, input("", tag.id)).await,
            Err(TodoError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_and_restart_are_idempotent() {
        let db = memory_db().await;
        let tag = TagService::create_tag(&db, "home", None).await.unwrap();
        let id = TodoService::create_todo(&db, input("laundry", tag.id)).await.unwrap().todo.id;

        for _ in 0..2 {
            let done = TodoService::complete_todo(&db, id).await.unwrap();
            assert_eq!(done.todo.status, Status::Done);
        }
        for _ in 0..2 {
            let restarted = TodoService::restart_todo(&db, id).await.unwrap();
            assert_eq!(restarted.todo.status, Status::Todo);
            assert_eq!(restarted.tag.as_ref().map(|t| t.id), Some(tag.id));
        }

        assert!(matches!(
            TodoService::complete_todo(&db, 404).await,
            Err(TodoError::NotFound(404))
        ));
        assert!(matches!(
            TodoService::restart_todo(&db, 404).await,
            Err(TodoError::NotFound(404))
        ));
    }

    #[tokio::test]
    async fn test_change_priority() {
        let db = memory_db().await;
        let tag = TagService::create_tag(&db, "home", None).await.unwrap();
        let id = TodoService::create_todo(&db, input("dishes", tag.id)).await.unwrap().todo.id;

        let changed = TodoService::change_priority(&db, id, Priority::High).await.unwrap();
        assert_eq!(changed.todo.priority, Priority::High);
        assert!(matches!(
            TodoService::change_priority(&db, id + 1, Priority::Low).await,
            Err(TodoError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_todo() {
        let db = memory_db().await;
        let tag = TagService::create_tag(&db, "home", None).await.unwrap();
        let id = TodoService::create_todo(&db, input("dishes", tag.id)).await.unwrap().todo.id;

        TodoService::delete_todo(&db, id).await.unwrap();
        assert!(matches!(TodoService::get_todo(&db, id).await, Err(TodoError::NotFound(_))));
        assert!(matches!(TodoService::delete_todo(&db, id).await, Err(TodoError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_todos_filters() {
        let db = memory_db().await;
        let study = TagService::create_tag(&db, "study", None).await.unwrap();
        let home = TagService::create_tag(&db, "home", None).await.unwrap();

        let rust = TodoService::create_todo(
            &db,
            TodoInput { priority: Some(Priority::High), ..input("Learn Rust", study.id) },
        )
        .await
        .unwrap();
        let sql = TodoService::create_todo(&db, input("learn SQL", study.id)).await.unwrap();
        let dishes = TodoService::create_todo(&db, input("Dishes", home.id)).await.unwrap();
        TodoService::complete_todo(&db, dishes.todo.id).await.unwrap();

        let ids = |items: Vec<TodoWithTag>| items.into_iter().map(|t| t.todo.id).collect::<Vec<_>>();

        let all = TodoService::list_todos(&db, &filter()).await.unwrap();
        assert_eq!(ids(all), vec![rust.todo.id, sql.todo.id, dishes.todo.id]);

        let searched = TodoService::list_todos(
            &db,
            &TodoFilter { search: Some("Learn".into()), ..filter() },
        )
        .await
        .unwrap();
        assert_eq!(ids(searched), vec![rust.todo.id]);

        let by_tag = TodoService::list_todos(&db, &TodoFilter { tag_id: Some(home.id), ..filter() })
            .await
            .unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].tag.as_ref().map(|t| t.name.as_str()), Some("home"));

        let done = TodoService::list_todos(
            &db,
            &TodoFilter { status: Some("done".into()), ..filter() },
        )
        .await
        .unwrap();
        assert_eq!(ids(done), vec![dishes.todo.id]);

        let high = TodoService::list_todos(
            &db,
            &TodoFilter { priority: Some("HIGH".into()), ..filter() },
        )
        .await
        .unwrap();
        assert_eq!(ids(high), vec![rust.todo.id]);

        let invalid = TodoService::list_todos(
            &db,
            &TodoFilter { status: Some("later".into()), ..filter() },
        )
        .await;
        assert!(matches!(invalid, Err(TodoError::InvalidFilterValue(_))));
    }

    #[tokio::test]
    async fn test_list_todos_sorting() {
        let db = memory_db().await;
        let tag = TagService::create_tag(&db, "study", None).await.unwrap();
        let base = Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap();

        for (title, offset_days) in [("late", 5), ("early", 1), ("middle", 3)] {
            TodoService::create_todo(
                &db,
                TodoInput {
                    due_date: Some(base + Duration::days(offset_days)),
                    ..input(title, tag.id)
                },
            )
            .await
            .unwrap();
        }

        let by_due = TodoService::list_todos(&db, &TodoFilter { sort: Some("dueDate".into()), ..filter() })
            .await
            .unwrap();
        let titles: Vec<_> = by_due.iter().map(|t| t.todo.title.as_str()).collect();
        assert_eq!(titles, vec!["early", "middle", "late"]);
        assert!(by_due.windows(2).all(|w| w[0].todo.due_date <= w[1].todo.due_date));

        let by_created = TodoService::list_todos(&db, &TodoFilter { sort: Some("created".into()), ..filter() })
            .await
            .unwrap();
        assert!(by_created.windows(2).all(|w| w[0].todo.created_at >= w[1].todo.created_at));
        let titles: Vec<_> = by_created.iter().map(|t| t.todo.title.as_str()).collect();
        assert_eq!(titles, vec!["middle", "early", "late"]);
    }

    #[tokio::test]
    async fn test_stats_counts_by_status() {
        let db = memory_db().await;
        let tag = TagService::create_tag(&db, "study", None).await.unwrap();
        for title in ["a", "b", "c"] {
            TodoService::create_todo(&db, input(title, tag.id)).await.unwrap();
        }
        TodoService::complete_todo(&db, 1).await.unwrap();

        let stats = TodoService::get_stats(&db).await.unwrap();
        assert_eq!(stats, TodoStats { total: 3, completed: 1, pending: 2 });
    }
}
