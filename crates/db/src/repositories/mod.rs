//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that take
//! any `PgExecutor` (`&PgPool`, or `&mut *tx` inside a transaction) as the
//! first argument.

pub mod comment_repo;
pub mod import_request_repo;
pub mod interwiki_repo;
pub mod job_repo;
pub mod log_repo;
pub mod notification_repo;
pub mod site_repo;
pub mod user_repo;

pub use comment_repo::RequestCommentRepo;
pub use import_request_repo::ImportRequestRepo;
pub use interwiki_repo::InterwikiRepo;
pub use job_repo::JobRepo;
pub use log_repo::RequestLogRepo;
pub use notification_repo::NotificationRepo;
pub use site_repo::SiteRepo;
pub use user_repo::UserRepo;
