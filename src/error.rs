use thiserror::Error;

/// Errors raised inside the optimization pipeline. Most of them are caught
/// at the service boundary and converted into status-bearing results; only
/// the HTTP layer inspects the variant to pick a response code.
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("negative edge weight {weight} from '{from}' to '{to}'")]
    NegativeWeight {
        from: String,
        to: String,
        weight: f64,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("routing api error: {0}")]
    Api(String),

    #[error("cache error: {0}")]
    Cache(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
