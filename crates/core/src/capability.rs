//! What an actor may do with a request right now.
//!
//! [`capabilities`] is a pure function of request state, actor identity,
//! privileges and the configured [`StatusHandling`]. Renderers use it to
//! decide which controls to show; the workflow service enforces the same
//! rules when an action arrives.

use serde::Serialize;

use crate::privilege::{Privilege, PrivilegeSet};
use crate::status::{RequestStatus, StatusHandling};
use crate::types::DbId;

/// The parts of a request that decide what may be done with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSnapshot {
    pub requester_id: DbId,
    pub status: RequestStatus,
    pub locked: bool,
    pub private: bool,
    pub interwiki_prefix: Option<String>,
}

impl RequestSnapshot {
    /// Private requests are visible to the requester and to holders of the
    /// private-view privilege only.
    pub fn is_visible_to(&self, actor_id: DbId, privileges: &PrivilegeSet) -> bool {
        !self.private
            || self.requester_id == actor_id
            || privileges.has(Privilege::ViewPrivateImportRequests)
    }

    pub fn has_interwiki_prefix(&self) -> bool {
        self.interwiki_prefix
            .as_deref()
            .is_some_and(|p| !p.is_empty())
    }
}

/// Whether a request in `status` accepts edits to source, target or reason.
pub fn accepts_content_edits(status: RequestStatus) -> bool {
    matches!(status, RequestStatus::Pending | RequestStatus::Declined)
}

/// Enumerated set of actions available to one actor on one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub can_view: bool,
    pub can_comment: bool,
    pub can_edit: bool,
    pub can_decline: bool,
    pub can_start_import: bool,
    pub can_lock: bool,
    pub can_unlock: bool,
    pub can_set_private: bool,
    pub can_assign_interwiki: bool,
    /// Statuses offered in the reviewer's manual status menu.
    pub status_options: Vec<RequestStatus>,
}

/// Compute the capability set for `actor_id` on `request`.
pub fn capabilities(
    request: &RequestSnapshot,
    actor_id: DbId,
    privileges: &PrivilegeSet,
    handling: StatusHandling,
) -> Capabilities {
    if !request.is_visible_to(actor_id, privileges) {
        return Capabilities::default();
    }

    let is_requester = request.requester_id == actor_id;
    let is_reviewer = privileges.has(Privilege::HandleImportRequests);
    let open = !request.locked;

    let status_options = if is_reviewer && open {
        handling.status_options(request.status)
    } else {
        Vec::new()
    };

    Capabilities {
        can_view: true,
        can_comment: open && (is_requester || is_reviewer),
        can_edit: open && (is_requester || is_reviewer) && accepts_content_edits(request.status),
        can_decline: status_options.contains(&RequestStatus::Declined),
        can_start_import: is_reviewer && open && handling.check_start_import(request.status).is_ok(),
        can_lock: is_reviewer && open,
        can_unlock: is_reviewer && request.locked,
        can_set_private: is_reviewer,
        can_assign_interwiki: privileges.has(Privilege::HandleInterwiki)
            && !request.has_interwiki_prefix(),
        status_options,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUESTER: DbId = 10;
    const REVIEWER: DbId = 20;
    const STRANGER: DbId = 30;

    fn snapshot(status: RequestStatus) -> RequestSnapshot {
        RequestSnapshot {
            requester_id: REQUESTER,
            status,
            locked: false,
            private: false,
            interwiki_prefix: None,
        }
    }

    fn reviewer() -> PrivilegeSet {
        PrivilegeSet::new([Privilege::HandleImportRequests, Privilege::HandleInterwiki])
    }

    fn requester() -> PrivilegeSet {
        PrivilegeSet::new([Privilege::RequestImport])
    }

    #[test]
    fn private_request_hidden_from_strangers() {
        let mut req = snapshot(RequestStatus::Pending);
        req.private = true;
        let caps = capabilities(&req, STRANGER, &requester(), StatusHandling::Automated);
        assert_eq!(caps, Capabilities::default());
    }

    #[test]
    fn private_request_visible_with_privilege() {
        let mut req = snapshot(RequestStatus::Pending);
        req.private = true;
        let privs = PrivilegeSet::new([Privilege::ViewPrivateImportRequests]);
        assert!(capabilities(&req, STRANGER, &privs, StatusHandling::Automated).can_view);
        assert!(capabilities(&req, REQUESTER, &requester(), StatusHandling::Automated).can_view);
    }

    #[test]
    fn reviewer_on_pending_automated() {
        let caps = capabilities(
            &snapshot(RequestStatus::Pending),
            REVIEWER,
            &reviewer(),
            StatusHandling::Automated,
        );
        assert!(caps.can_start_import);
        assert!(caps.can_decline);
        assert_eq!(caps.status_options, vec![RequestStatus::Declined]);
        assert!(caps.can_assign_interwiki);
    }

    #[test]
    fn reviewer_on_running_import_has_no_status_controls() {
        for status in [
            RequestStatus::Starting,
            RequestStatus::InProgress,
            RequestStatus::Complete,
        ] {
            let caps = capabilities(&snapshot(status), REVIEWER, &reviewer(), StatusHandling::Manual);
            assert!(!caps.can_start_import);
            assert!(!caps.can_decline);
            assert!(caps.status_options.is_empty());
            assert!(!caps.can_edit);
        }
    }

    #[test]
    fn locked_request_only_offers_unlock() {
        let mut req = snapshot(RequestStatus::Pending);
        req.locked = true;
        let caps = capabilities(&req, REVIEWER, &reviewer(), StatusHandling::Manual);
        assert!(caps.can_unlock);
        assert!(!caps.can_lock);
        assert!(!caps.can_comment);
        assert!(!caps.can_edit);
        assert!(caps.status_options.is_empty());
    }

    #[test]
    fn requester_can_edit_declined_request() {
        let caps = capabilities(
            &snapshot(RequestStatus::Declined),
            REQUESTER,
            &requester(),
            StatusHandling::Automated,
        );
        assert!(caps.can_edit);
        assert!(caps.can_comment);
        assert!(!caps.can_decline);
        assert!(!caps.can_set_private);
    }

    #[test]
    fn interwiki_assignment_closed_once_set() {
        let mut req = snapshot(RequestStatus::Pending);
        req.interwiki_prefix = Some("w".into());
        let caps = capabilities(&req, REVIEWER, &reviewer(), StatusHandling::Automated);
        assert!(!caps.can_assign_interwiki);
    }
}
