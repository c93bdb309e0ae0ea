use importdump_core::error::CoreError;
use importdump_core::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The manager is not bound to an existing request.
    #[error("No import request bound{}", .0.map(|id| format!(" (id {id})")).unwrap_or_default())]
    NotBound(Option<DbId>),

    /// Atomic scopes were opened or closed out of order.
    #[error("Atomic scope error: {0}")]
    Scope(String),
}

pub type ManagerResult<T> = Result<T, ManagerError>;

impl ManagerError {
    /// Whether this error means the request does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotBound(_) | Self::Core(CoreError::NotFound { .. })
        )
    }
}
