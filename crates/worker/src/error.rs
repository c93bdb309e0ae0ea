use importdump_requests::ManagerError;

use crate::importer::ImportError;

/// Errors raised while handling a job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid job parameters: {0}")]
    Params(#[from] serde_json::Error),

    #[error(transparent)]
    Import(#[from] ImportError),

    /// The account named in the job could not be resolved.
    #[error("Cannot attribute status change: {0}")]
    Attribution(String),
}
