use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, DbConn, DbErr, Schema};
use tracing::info;

use crate::db::entities::{tag, todo};

/// Creates the `tag` and `todo` tables when they are missing.
///
/// The statements are derived from the entities, so the unique constraint on
/// `tag.name` and the `todo.tag_id -> tag.id` foreign key always match the models.
pub async fn bootstrap(db: &DbConn) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut tag_table = schema.create_table_from_entity(tag::Entity);
    tag_table.if_not_exists();
    db.execute(backend.build(&tag_table)).await?;

    let mut todo_table = schema.create_table_from_entity(todo::Entity);
    todo_table.if_not_exists();
    db.execute(backend.build(&todo_table)).await?;

    let tag_index = Index::create()
        .if_not_exists()
        .name("idx_todo_tag_id")
        .table(todo::Entity)
        .col(todo::Column::TagId)
        .to_owned();
    db.execute(backend.build(&tag_index)).await?;

    info!(backend = ?backend, "Database schema is ready.");
    Ok(())
}
