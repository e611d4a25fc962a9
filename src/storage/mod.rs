mod items;
mod queue;
mod schema;
mod sources;
mod types;

pub use schema::Database;
pub use types::{
    DatabaseError, Item, NewSource, ParsedItem, QueuedMessage, Source, DEFAULT_COUNTRY,
};
