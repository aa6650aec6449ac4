pub mod entities;
pub mod schema;
pub mod services;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Opens a connection pool for `database_url`.
///
/// Every pooled connection to `sqlite::memory:` sees its own empty database,
/// so callers pass `max_connections = 1` for in-memory stores.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(max_connections)
        .min_connections(1)
        .sqlx_logging(false);
    Database::connect(opt).await
}
