/// Shared error type used across all Envoy crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("database: {0}")]
    Db(String),

    /// An entity looked up by id or name does not exist. The payload is
    /// the entity kind ("session", "tool", …); the HTTP layer maps this
    /// to 404.
    #[error("{0} not found")]
    NotFound(String),

    /// Rejected input. The HTTP layer maps this to 400.
    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
