//! Job types and their parameter bags.
//!
//! Parameters are a flat JSON object so either side can be redeployed
//! independently: `{requestid, username}` for imports and
//! `{requestid, status, username, lasterror?}` for status notifications.

use importdump_core::status::RequestStatus;
use importdump_core::types::DbId;
use importdump_db::models::job::NewJob;
use serde::{Deserialize, Serialize};

pub const IMPORT_JOB_TYPE: &str = "import_dump";
pub const NOTIFY_JOB_TYPE: &str = "request_notify";

/// A partially applied import must not be blindly re-run.
pub const IMPORT_MAX_ATTEMPTS: i32 = 1;
pub const NOTIFY_MAX_ATTEMPTS: i32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportJobParams {
    pub requestid: DbId,
    /// Account that started the import.
    pub username: String,
}

impl ImportJobParams {
    pub fn to_job(&self) -> NewJob {
        NewJob {
            job_type: IMPORT_JOB_TYPE.to_string(),
            params: serde_json::json!({
                "requestid": self.requestid,
                "username": self.username,
            }),
            max_attempts: IMPORT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyJobParams {
    pub requestid: DbId,
    pub status: RequestStatus,
    pub username: String,
    #[serde(default)]
    pub lasterror: Option<String>,
}

impl NotifyJobParams {
    pub fn new(requestid: DbId, status: RequestStatus, username: impl Into<String>) -> Self {
        Self {
            requestid,
            status,
            username: username.into(),
            lasterror: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.lasterror = Some(error.into());
        self
    }

    pub fn to_job(&self) -> NewJob {
        NewJob {
            job_type: NOTIFY_JOB_TYPE.to_string(),
            params: serde_json::json!({
                "requestid": self.requestid,
                "status": self.status.as_str(),
                "username": self.username,
                "lasterror": self.lasterror,
            }),
            max_attempts: NOTIFY_MAX_ATTEMPTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_job_is_not_retried() {
        let job = ImportJobParams {
            requestid: 1,
            username: "Reviewer".into(),
        }
        .to_job();
        assert_eq!(job.job_type, IMPORT_JOB_TYPE);
        assert_eq!(job.max_attempts, 1);
        assert_eq!(job.params["requestid"], 1);
    }

    #[test]
    fn notify_params_read_back_from_job() {
        let params = NotifyJobParams::new(3, RequestStatus::Failed, "Reviewer").with_error("boom");
        let job = params.to_job();
        let parsed: NotifyJobParams = serde_json::from_value(job.params).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn missing_lasterror_defaults_to_none() {
        let parsed: NotifyJobParams = serde_json::from_value(serde_json::json!({
            "requestid": 1, "status": "complete", "username": "u"
        }))
        .unwrap();
        assert!(parsed.lasterror.is_none());
    }
}
