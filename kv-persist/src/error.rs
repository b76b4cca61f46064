#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("TiKV error: {0}")]
    TikvError(#[from] tikv_client::Error),
    #[error("Prost error: {0}")]
    DeserializationError(#[from] prost::DecodeError),
    #[error("No attribute metadata registered for {0}")]
    Introspection(String),
    #[error("Stale object: {0} was modified concurrently")]
    StaleObject(String),
    #[error("Transaction error: {0}")]
    Transaction(String),
    #[error("Query execution error: {0}")]
    QueryExecution(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Invalid utf8: {0}")]
    InvalidUtf8(std::string::FromUtf8Error),
}

/// Raised while reading a single attribute off an entity instance.
///
/// These never abort a query; the extractor hands them back as diagnostics
/// and treats the attribute as absent.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("{entity} has no field `{name}`")]
    NoSuchField { entity: &'static str, name: String },
    #[error("{entity} has no getter `{name}`")]
    NoSuchGetter { entity: &'static str, name: String },
    #[error("{entity} has no supertype at level {level}")]
    NoSupertype { entity: &'static str, level: usize },
}
