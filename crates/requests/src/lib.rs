//! The import-request workflow.
//!
//! [`RequestManager`] owns one request's persisted state and its atomic
//! mutation scopes. [`RequestService`] layers the reviewer and requester
//! actions on top, checking privileges and the status state machine before
//! anything is written.

pub mod accounts;
pub mod error;
pub mod hooks;
pub mod jobs;
pub mod manager;
pub mod service;

pub use accounts::SystemAccounts;
pub use error::{ManagerError, ManagerResult};
pub use hooks::{
    DbInterwikiStore, DbSiteDirectory, DefaultImportHooks, ImportHooks, InterwikiStore,
    SiteDirectory,
};
pub use manager::{RequestManager, RequestServices};
pub use service::{NewImportRequest, RequestEdit, RequestService, RequestView};
