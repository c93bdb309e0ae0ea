//! Request lifecycle states and the rules for moving between them.
//!
//! Three kinds of actor move a request forward:
//!
//! - reviewers, through the manual status menu or the decline action;
//! - the requester, by editing a declined request (reopening it);
//! - the background jobs, which only ever advance and never regress.
//!
//! Which reviewer actions exist depends on [`StatusHandling`], chosen once
//! from configuration.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// RequestStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of an import request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Starting,
    InProgress,
    Complete,
    Declined,
    Failed,
}

impl RequestStatus {
    /// All statuses in display order.
    pub const ALL: [RequestStatus; 6] = [
        Self::Pending,
        Self::Starting,
        Self::InProgress,
        Self::Complete,
        Self::Declined,
        Self::Failed,
    ];

    /// Return the storage string for this variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::InProgress => "inprogress",
            Self::Complete => "complete",
            Self::Declined => "declined",
            Self::Failed => "failed",
        }
    }

    /// Parse from the storage string.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "starting" => Ok(Self::Starting),
            "inprogress" => Ok(Self::InProgress),
            "complete" => Ok(Self::Complete),
            "declined" => Ok(Self::Declined),
            "failed" => Ok(Self::Failed),
            _ => Err(CoreError::Validation(format!(
                "Invalid status: '{s}'. Must be one of: pending, starting, inprogress, \
                 complete, declined, failed"
            ))),
        }
    }

    /// UI message key used to render this status label.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::Pending => "importdump-label-pending",
            Self::Starting => "importdump-label-starting",
            Self::InProgress => "importdump-label-inprogress",
            Self::Complete => "importdump-label-complete",
            Self::Declined => "importdump-label-declined",
            Self::Failed => "importdump-label-failed",
        }
    }

    /// No automated transition leaves these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Declined | Self::Failed)
    }

    /// States in which reviewers may neither change the status by hand nor
    /// trigger another import.
    pub fn is_locked_for_reviewers(&self) -> bool {
        matches!(self, Self::Starting | Self::InProgress | Self::Complete)
    }

    /// Position along the automated import path. `None` for `declined`,
    /// which is not on that path.
    fn import_rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Starting => Some(1),
            Self::InProgress => Some(2),
            Self::Complete | Self::Failed => Some(3),
            Self::Declined => None,
        }
    }

    /// Whether editing the request content moves it back to `pending`.
    pub fn reopens_on_edit(&self) -> bool {
        matches!(self, Self::Declined)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Job-driven transitions
// ---------------------------------------------------------------------------

/// Outcome of asking whether a job may move a request to a new status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTransition {
    /// The transition moves the request forward and should be applied.
    Apply,
    /// The request is already in the target status (duplicate delivery).
    AlreadyApplied,
    /// The transition would regress or leave a terminal state.
    Refused,
}

/// Decide whether a background job may move a request from `from` to `to`.
///
/// Jobs only move forward along `pending -> starting -> inprogress ->
/// complete | failed`. Skipping ahead is allowed (a job that fails before
/// reporting progress lands directly on `failed`), going back is not.
pub fn job_transition(from: RequestStatus, to: RequestStatus) -> JobTransition {
    if from == to {
        return JobTransition::AlreadyApplied;
    }
    if from.is_terminal() {
        return JobTransition::Refused;
    }
    match (from.import_rank(), to.import_rank()) {
        (Some(a), Some(b)) if b > a && to != RequestStatus::Starting => JobTransition::Apply,
        _ => JobTransition::Refused,
    }
}

// ---------------------------------------------------------------------------
// StatusHandling
// ---------------------------------------------------------------------------

/// How reviewers drive a request once it is accepted.
///
/// Selected once from configuration and handed to everything that needs to
/// know which status actions are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusHandling {
    /// Reviewers trigger the import job; the job reports progress.
    Automated,
    /// Reviewers set `inprogress`/`complete` by hand after importing
    /// out-of-band.
    Manual,
}

impl StatusHandling {
    pub fn from_automation_flag(enabled: bool) -> Self {
        if enabled {
            Self::Automated
        } else {
            Self::Manual
        }
    }

    /// Statuses a reviewer may pick from the status menu while the request
    /// is in `current`. Empty when the menu is closed.
    pub fn status_options(&self, current: RequestStatus) -> Vec<RequestStatus> {
        if current != RequestStatus::Pending {
            return Vec::new();
        }
        match self {
            Self::Automated => vec![RequestStatus::Declined],
            Self::Manual => vec![
                RequestStatus::InProgress,
                RequestStatus::Complete,
                RequestStatus::Declined,
            ],
        }
    }

    /// Validate a reviewer's manual status change.
    pub fn check_reviewer_transition(
        &self,
        current: RequestStatus,
        requested: RequestStatus,
    ) -> Result<(), CoreError> {
        if current == requested {
            return Err(CoreError::Conflict(format!(
                "Request is already {current}"
            )));
        }
        if current.is_locked_for_reviewers() {
            return Err(CoreError::Conflict(format!(
                "Status cannot be changed while the request is {current}"
            )));
        }
        if self.status_options(current).contains(&requested) {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Cannot change status from {current} to {requested}"
            )))
        }
    }

    /// Validate a request to start the automated import.
    pub fn check_start_import(&self, current: RequestStatus) -> Result<(), CoreError> {
        if *self == Self::Manual {
            return Err(CoreError::Conflict(
                "Automated imports are disabled".to_string(),
            ));
        }
        if current.is_locked_for_reviewers() {
            return Err(CoreError::Conflict(format!(
                "An import has already been started for this request ({current})"
            )));
        }
        if current != RequestStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "Cannot start an import for a {current} request"
            )));
        }
        Ok(())
    }

    /// Whether the import job's progress signal may move a request to
    /// `inprogress`.
    pub fn accepts_job_progress(&self) -> bool {
        *self == Self::Automated
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use RequestStatus::*;

    #[test]
    fn as_str_round_trips_through_from_str() {
        for status in RequestStatus::ALL {
            assert_eq!(RequestStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_a_validation_error() {
        assert!(matches!(
            RequestStatus::from_str("archived"),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn message_keys_are_prefixed() {
        assert_eq!(InProgress.message_key(), "importdump-label-inprogress");
        assert!(RequestStatus::ALL
            .iter()
            .all(|s| s.message_key().starts_with("importdump-label-")));
    }

    #[test]
    fn serde_uses_storage_strings() {
        assert_eq!(serde_json::to_string(&InProgress).unwrap(), "\"inprogress\"");
    }

    #[test]
    fn job_moves_forward() {
        assert_eq!(job_transition(Starting, InProgress), JobTransition::Apply);
        assert_eq!(job_transition(InProgress, Complete), JobTransition::Apply);
        assert_eq!(job_transition(InProgress, Failed), JobTransition::Apply);
        assert_eq!(job_transition(Pending, Failed), JobTransition::Apply);
        assert_eq!(job_transition(Starting, Complete), JobTransition::Apply);
    }

    #[test]
    fn job_repeat_is_already_applied() {
        assert_eq!(job_transition(Complete, Complete), JobTransition::AlreadyApplied);
        assert_eq!(job_transition(InProgress, InProgress), JobTransition::AlreadyApplied);
    }

    #[test]
    fn job_never_regresses() {
        assert_eq!(job_transition(Complete, InProgress), JobTransition::Refused);
        assert_eq!(job_transition(Failed, Complete), JobTransition::Refused);
        assert_eq!(job_transition(InProgress, Starting), JobTransition::Refused);
        assert_eq!(job_transition(Declined, InProgress), JobTransition::Refused);
        assert_eq!(job_transition(Pending, Declined), JobTransition::Refused);
    }

    #[test]
    fn manual_menu_only_from_pending() {
        let manual = StatusHandling::Manual;
        assert_eq!(manual.status_options(Pending), vec![InProgress, Complete, Declined]);
        assert!(manual.status_options(InProgress).is_empty());
        assert!(manual.status_options(Declined).is_empty());
    }

    #[test]
    fn automated_menu_only_offers_decline() {
        assert_eq!(StatusHandling::Automated.status_options(Pending), vec![Declined]);
    }

    #[test]
    fn reviewer_cannot_touch_running_import() {
        let manual = StatusHandling::Manual;
        for current in [Starting, InProgress, Complete] {
            assert!(matches!(
                manual.check_reviewer_transition(current, Declined),
                Err(CoreError::Conflict(_))
            ));
        }
    }

    #[test]
    fn reviewer_same_status_is_conflict() {
        assert!(StatusHandling::Manual
            .check_reviewer_transition(Pending, Pending)
            .is_err());
    }

    #[test]
    fn start_import_rejected_when_already_started() {
        let auto = StatusHandling::Automated;
        assert!(auto.check_start_import(Pending).is_ok());
        for current in [Starting, InProgress, Complete, Declined, Failed] {
            assert!(auto.check_start_import(current).is_err(), "{current}");
        }
    }

    #[test]
    fn start_import_rejected_in_manual_mode() {
        assert!(StatusHandling::Manual.check_start_import(Pending).is_err());
    }

    #[test]
    fn only_declined_reopens() {
        assert!(Declined.reopens_on_edit());
        assert!(!Pending.reopens_on_edit());
        assert!(!Failed.reopens_on_edit());
    }
}
