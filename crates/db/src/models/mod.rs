//! Row structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row and the DTOs used to insert or update it.

pub mod comment;
pub mod import_request;
pub mod interwiki;
pub mod job;
pub mod log;
pub mod notification;
pub mod user;
