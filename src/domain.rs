pub mod field;
pub mod item;
pub mod schema;
pub mod task;
pub mod value;
