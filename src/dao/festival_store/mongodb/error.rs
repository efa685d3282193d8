use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result of MongoDB store operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
/// Failures of the MongoDB festival store.
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    /// A required environment variable is unset.
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    /// The connection string could not be parsed.
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    /// The driver client could not be built.
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    /// The server did not answer the first ping.
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    /// A health ping failed.
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    /// An index could not be created.
    EnsureIndex {
        collection: String,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save festival `{id}`")]
    /// Writing a festival failed.
    SaveFestival {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load festival for `{key}`")]
    /// Reading a festival failed.
    LoadFestival {
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to list festivals")]
    /// Listing festivals failed.
    ListFestivals {
        #[source]
        source: MongoError,
    },
    #[error("failed to delete festival `{id}`")]
    /// Deleting a festival failed.
    DeleteFestival {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save record `{id}` in `{collection}`")]
    /// Writing a tagged record failed.
    SaveRecord {
        id: Uuid,
        collection: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete records from `{collection}`")]
    /// Deleting tagged records failed.
    DeleteRecords {
        collection: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to query records from `{collection}`")]
    /// Querying tagged records failed.
    QueryRecords {
        collection: String,
        #[source]
        source: MongoError,
    },
    #[error("malformed document in `{collection}`: {reason}")]
    /// A stored document could not be decoded.
    MalformedDocument {
        collection: String,
        reason: String,
    },
}
