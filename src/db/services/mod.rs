//! Business rules for tags and todos.
//!
//! Services are stateless; every operation takes the database connection it works on.

pub mod tag_service;
pub mod todo_service;

pub use tag_service::*;
pub use todo_service::*;
