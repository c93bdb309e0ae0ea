//! Background side of the import workflow.
//!
//! [`JobRunner`] polls the `jobs` table and hands each claimed job to the
//! [`JobHandler`] registered for its type. [`ImportJob`] runs the dump
//! import through a [`DumpImporter`]; [`NotifyJob`] turns the import's
//! status signals into request mutations and notifications.

pub mod error;
pub mod handler;
pub mod import_job;
pub mod importer;
pub mod notify_job;
pub mod runner;

pub use error::JobError;
pub use handler::{JobHandler, JobOutcome};
pub use import_job::ImportJob;
pub use importer::{CommandImporter, DumpImporter, ImportError, ImportSpec, MaintenancePass};
pub use notify_job::NotifyJob;
pub use runner::JobRunner;
