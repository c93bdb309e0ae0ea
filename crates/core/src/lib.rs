//! Pure domain logic for the import-request workflow.
//!
//! Nothing in this crate touches the database, the network or the
//! filesystem. The `db`, `requests` and `worker` crates build on these
//! types.

pub mod audit;
pub mod capability;
pub mod command;
pub mod config;
pub mod diff;
pub mod error;
pub mod naming;
pub mod notification;
pub mod privilege;
pub mod status;
pub mod types;
pub mod validation;
