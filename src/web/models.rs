use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::entities::todo::{Priority, Status};
use crate::db::services::TodoWithTag;

/// JSON shape of a todo, flattened with the name and color of its tag.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TodoResponse {
    pub id: i32,
    pub title: String,
    pub content: Option<String>,
    pub due_date: DateTime<Utc>,
    pub status: Status,
    pub priority: Priority,
    pub tag_id: i32,
    pub tag_name: Option<String>,
    pub tag_color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TodoWithTag> for TodoResponse {
    fn from(value: TodoWithTag) -> Self {
        let TodoWithTag { todo, tag } = value;
        let (tag_name, tag_color) = match tag {
            Some(tag) => (Some(tag.name), Some(tag.color)),
            None => (None, None),
        };
        TodoResponse {
            id: todo.id,
            title: todo.title,
            content: todo.content,
            due_date: todo.due_date,
            status: todo.status,
            priority: todo.priority,
            tag_id: todo.tag_id,
            tag_name,
            tag_color,
            created_at: todo.created_at,
            updated_at: todo.updated_at,
        }
    }
}
