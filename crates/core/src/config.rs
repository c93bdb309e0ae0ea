//! Extension configuration.

use std::path::PathBuf;

use crate::command::DEFAULT_IMPORT_COMMAND;
use crate::error::CoreError;
use crate::status::StatusHandling;
use crate::types::DbId;

/// Runtime configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ImportDumpConfig {
    /// Directory holding uploaded dumps awaiting import.
    pub staging_path: PathBuf,
    /// Whether reviewers trigger the import job (`true`) or set statuses
    /// by hand (`false`).
    pub automation_enabled: bool,
    /// Author of system comments on reopened requests and log entries.
    pub system_account: String,
    /// Author of the comments written by the notify job.
    pub status_account: String,
    /// Usernames told about failed imports.
    pub notify_on_failure: Vec<String>,
    /// Usernames told about new requests.
    pub notify_on_new_request: Vec<String>,
    pub import_command: String,
    /// Substituted for `{IP}` in the import command.
    pub install_path: String,
    pub command_timeout_secs: u64,
    /// Base URL of the request viewer; notifications link to
    /// `{base}/{id}`.
    pub request_url_base: String,
    pub job_poll_interval_ms: u64,
    /// How long a claimed job may go without a heartbeat before it counts
    /// as abandoned. At least `command_timeout_secs`.
    pub job_lease_secs: u64,
}

impl Default for ImportDumpConfig {
    fn default() -> Self {
        Self {
            staging_path: PathBuf::from("/var/lib/importdump/staging"),
            automation_enabled: true,
            system_account: "ImportDump Extension".into(),
            status_account: "ImportDump Status Update".into(),
            notify_on_failure: Vec::new(),
            notify_on_new_request: Vec::new(),
            import_command: DEFAULT_IMPORT_COMMAND.into(),
            install_path: "/srv/mediawiki".into(),
            command_timeout_secs: 86_400,
            request_url_base: "/wiki/Special:RequestImportQueue".into(),
            job_poll_interval_ms: 1_000,
            job_lease_secs: 86_400,
        }
    }
}

impl ImportDumpConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                            | Default                              |
    /// |------------------------------------|--------------------------------------|
    /// | `IMPORTDUMP_STAGING_PATH`          | `/var/lib/importdump/staging`        |
    /// | `IMPORTDUMP_ENABLE_AUTOMATED_JOB`  | `true`                               |
    /// | `IMPORTDUMP_SYSTEM_ACCOUNT`        | `ImportDump Extension`               |
    /// | `IMPORTDUMP_STATUS_ACCOUNT`        | `ImportDump Status Update`           |
    /// | `IMPORTDUMP_NOTIFY_ON_FAILURE`     | empty (comma-separated usernames)    |
    /// | `IMPORTDUMP_NOTIFY_ON_NEW_REQUEST` | empty (comma-separated usernames)    |
    /// | `IMPORTDUMP_IMPORT_COMMAND`        | `php {IP}/maintenance/importDump.php ...` |
    /// | `IMPORTDUMP_INSTALL_PATH`          | `/srv/mediawiki`                     |
    /// | `IMPORTDUMP_COMMAND_TIMEOUT_SECS`  | `86400`                              |
    /// | `IMPORTDUMP_REQUEST_URL_BASE`      | `/wiki/Special:RequestImportQueue`   |
    /// | `IMPORTDUMP_JOB_POLL_INTERVAL_MS`  | `1000`                               |
    /// | `IMPORTDUMP_JOB_LEASE_SECS`        | `86400`, not below the command timeout |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` uses the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let defaults = Self::default();

        let string = |key: &str, default: String| lookup(key).unwrap_or(default);

        let number = |key: &str, default: u64| -> Result<u64, CoreError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => raw.trim().parse().map_err(|_| {
                    CoreError::Validation(format!("{key} must be a non-negative integer, got '{raw}'"))
                }),
            }
        };

        let automation_enabled = match lookup("IMPORTDUMP_ENABLE_AUTOMATED_JOB") {
            None => defaults.automation_enabled,
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                CoreError::Validation(format!(
                    "IMPORTDUMP_ENABLE_AUTOMATED_JOB must be a boolean, got '{raw}'"
                ))
            })?,
        };

        let list = |key: &str| -> Vec<String> {
            lookup(key)
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        let command_timeout_secs =
            number("IMPORTDUMP_COMMAND_TIMEOUT_SECS", defaults.command_timeout_secs)?;
        if command_timeout_secs == 0 {
            return Err(CoreError::Validation(
                "IMPORTDUMP_COMMAND_TIMEOUT_SECS must be greater than zero".into(),
            ));
        }

        let job_lease_secs = number("IMPORTDUMP_JOB_LEASE_SECS", defaults.job_lease_secs)?;
        if job_lease_secs < command_timeout_secs {
            return Err(CoreError::Validation(format!(
                "IMPORTDUMP_JOB_LEASE_SECS ({job_lease_secs}) must not be shorter than \
                 IMPORTDUMP_COMMAND_TIMEOUT_SECS ({command_timeout_secs})"
            )));
        }

        Ok(Self {
            staging_path: lookup("IMPORTDUMP_STAGING_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_path),
            automation_enabled,
            system_account: string("IMPORTDUMP_SYSTEM_ACCOUNT", defaults.system_account),
            status_account: string("IMPORTDUMP_STATUS_ACCOUNT", defaults.status_account),
            notify_on_failure: list("IMPORTDUMP_NOTIFY_ON_FAILURE"),
            notify_on_new_request: list("IMPORTDUMP_NOTIFY_ON_NEW_REQUEST"),
            import_command: string("IMPORTDUMP_IMPORT_COMMAND", defaults.import_command),
            install_path: string("IMPORTDUMP_INSTALL_PATH", defaults.install_path),
            command_timeout_secs,
            request_url_base: string("IMPORTDUMP_REQUEST_URL_BASE", defaults.request_url_base),
            job_poll_interval_ms: number(
                "IMPORTDUMP_JOB_POLL_INTERVAL_MS",
                defaults.job_poll_interval_ms,
            )?,
            job_lease_secs,
        })
    }

    /// The status-handling strategy for this deployment.
    pub fn status_handling(&self) -> StatusHandling {
        StatusHandling::from_automation_flag(self.automation_enabled)
    }

    /// Link to a request in the viewer.
    pub fn request_url(&self, id: DbId) -> String {
        format!("{}/{id}", self.request_url_base.trim_end_matches('/'))
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
