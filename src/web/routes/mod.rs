pub mod tag_routes;
pub mod todo_routes;
