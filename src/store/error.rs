use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failure talking to a backing store.
///
/// The two stores have independent availability: the coordinator treats
/// `Ephemeral` as fatal to the running operation and `Durable` as an audit
/// degradation to log and move past.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ephemeral store error: {0}")]
    Ephemeral(String),

    #[error("durable store error: {0}")]
    Durable(String),
}
