//! SeaORM entities mapping the `tag` and `todo` tables.

pub mod tag;
pub mod todo;

pub mod prelude {
    pub use super::tag::Entity as Tag;
    pub use super::tag::Model as TagModel;
    pub use super::tag::ActiveModel as TagActiveModel;
    pub use super::tag::Column as TagColumn;

    pub use super::todo::Entity as Todo;
    pub use super::todo::Model as TodoModel;
    pub use super::todo::ActiveModel as TodoActiveModel;
    pub use super::todo::Column as TodoColumn;
}
