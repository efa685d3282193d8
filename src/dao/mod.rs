/// Festival and tagged-record storage backends.
pub mod festival_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
