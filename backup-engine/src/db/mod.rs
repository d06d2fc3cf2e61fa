pub mod connection;
pub mod migrate;
pub mod store;

pub use connection::{create_pool, DbPool};
pub use store::RecordStore;
