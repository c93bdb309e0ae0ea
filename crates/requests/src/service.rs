//! Requester and reviewer actions.
//!
//! Every operation takes an explicit [`ActorContext`]. Privilege, visibility
//! and state-machine checks run before anything is written; the writes of
//! one operation share a single atomic scope.

use importdump_core::audit::actions;
use importdump_core::capability::{self, accepts_content_edits, Capabilities};
use importdump_core::diff::{self, RequestContent};
use importdump_core::error::CoreError;
use importdump_core::notification::{
    CATEGORY_NEW_REQUEST, CATEGORY_REQUEST_COMMENT, CATEGORY_STATUS_UPDATE,
};
use importdump_core::privilege::{ActorContext, Privilege};
use importdump_core::status::{RequestStatus, StatusHandling};
use importdump_core::types::DbId;
use importdump_core::validation;
use importdump_db::models::comment::RequestComment;
use importdump_db::models::import_request::{CreateImportRequest, ImportRequest, RequestListQuery};
use importdump_db::models::log::CreateLogEntry;
use importdump_db::repositories::{ImportRequestRepo, RequestLogRepo, UserRepo};
use serde::{Deserialize, Serialize};

use crate::accounts::SystemAccounts;
use crate::error::{ManagerError, ManagerResult};
use crate::manager::{RequestManager, RequestServices};

/// Input for a new request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewImportRequest {
    #[serde(default)]
    pub source: String,
    pub target: String,
    pub reason: String,
    #[serde(default)]
    pub private: bool,
}

/// Content changes; `None` leaves a field as it is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestEdit {
    pub source: Option<String>,
    pub target: Option<String>,
    pub reason: Option<String>,
}

/// What a viewer gets to see of one request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    pub request: ImportRequest,
    pub status_label: &'static str,
    pub comments: Vec<RequestComment>,
    pub capabilities: Capabilities,
}

pub struct RequestService {
    services: RequestServices,
    accounts: SystemAccounts,
    handling: StatusHandling,
}

impl RequestService {
    pub fn new(services: RequestServices, accounts: SystemAccounts) -> Self {
        let handling = services.config.status_handling();
        Self {
            services,
            accounts,
            handling,
        }
    }

    pub fn handling(&self) -> StatusHandling {
        self.handling
    }

    pub fn accounts(&self) -> &SystemAccounts {
        &self.accounts
    }

    pub fn services(&self) -> &RequestServices {
        &self.services
    }

    /// A manager bound to an existing request, or `NotFound`.
    pub async fn manager(&self, id: DbId) -> ManagerResult<RequestManager> {
        let manager = RequestManager::load(self.services.clone(), id).await?;
        if manager.request().is_err() {
            return Err(not_found(id));
        }
        Ok(manager)
    }

    /// A manager for a request the actor may see. Private requests are
    /// reported as missing to everyone else.
    async fn visible_manager(&self, ctx: &ActorContext, id: DbId) -> ManagerResult<RequestManager> {
        let manager = self.manager(id).await?;
        if !manager
            .snapshot()?
            .is_visible_to(ctx.actor_id(), &ctx.privileges)
        {
            return Err(not_found(id));
        }
        Ok(manager)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn view(&self, ctx: &ActorContext, id: DbId) -> ManagerResult<RequestView> {
        let mut manager = self.visible_manager(ctx, id).await?;
        let capabilities = capability::capabilities(
            &manager.snapshot()?,
            ctx.actor_id(),
            &ctx.privileges,
            self.handling,
        );
        Ok(RequestView {
            status_label: manager.status()?.message_key(),
            comments: manager.get_comments().await?,
            request: manager.request()?.clone(),
            capabilities,
        })
    }

    pub async fn capabilities(&self, ctx: &ActorContext, id: DbId) -> ManagerResult<Capabilities> {
        let manager = self.manager(id).await?;
        Ok(capability::capabilities(
            &manager.snapshot()?,
            ctx.actor_id(),
            &ctx.privileges,
            self.handling,
        ))
    }

    /// The request queue. Private requests of others are only listed for
    /// holders of the private-view privilege.
    pub async fn list(
        &self,
        ctx: &ActorContext,
        mut query: RequestListQuery,
    ) -> ManagerResult<Vec<ImportRequest>> {
        query.include_private =
            query.include_private && ctx.privileges.has(Privilege::ViewPrivateImportRequests);
        query.viewer_id = Some(ctx.actor_id());
        Ok(ImportRequestRepo::list(&self.services.pool, &query).await?)
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Create a request in `pending` status and tell the new-request
    /// watchers.
    pub async fn submit(&self, ctx: &ActorContext, input: NewImportRequest) -> ManagerResult<DbId> {
        ctx.privileges.require(Privilege::RequestImport)?;
        validation::validate_reason(&input.reason)?;
        validation::validate_source(&input.source)?;
        validation::validate_target_format(&input.target)?;
        if !self.services.sites.is_known_site(&input.target).await? {
            return Err(CoreError::Validation(format!("Unknown target site: '{}'", input.target)).into());
        }

        let mut tx = self.services.pool.begin().await?;
        if let Some(existing) =
            ImportRequestRepo::find_pending_by_reason(&mut *tx, &input.reason, None).await?
        {
            return Err(CoreError::Conflict(format!(
                "A pending request with the same reason already exists (#{})",
                existing.id
            ))
            .into());
        }

        let request = ImportRequestRepo::create(
            &mut *tx,
            &CreateImportRequest {
                source: input.source,
                target: input.target,
                reason: input.reason,
                requester_id: ctx.actor_id(),
                created_at: ctx.now,
                private: input.private,
            },
        )
        .await?;
        RequestLogRepo::insert(
            &mut *tx,
            &CreateLogEntry {
                action: actions::REQUEST.to_string(),
                performer_id: ctx.actor_id(),
                request_id: request.id,
                comment: request.reason.clone(),
                params: serde_json::json!({ "target": request.target }),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            request_id = request.id,
            requester = %ctx.actor.username,
            wiki = %request.target,
            "Import request submitted"
        );

        let watchers = self.new_request_watchers(&request).await?;
        if !watchers.is_empty() {
            let mut manager = RequestManager::load(self.services.clone(), request.id).await?;
            let notification = manager
                .notification(CATEGORY_NEW_REQUEST, ctx.actor_id())?
                .with_receivers(watchers)
                .with_extra("reason", request.reason.clone());
            manager.send_notification(notification).await;
        }

        Ok(request.id)
    }

    /// Configured watchers allowed to see the request.
    async fn new_request_watchers(&self, request: &ImportRequest) -> ManagerResult<Vec<DbId>> {
        let usernames = &self.services.config.notify_on_new_request;
        if usernames.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<DbId> = UserRepo::find_active_by_usernames(&self.services.pool, usernames)
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();
        if !request.private {
            return Ok(ids);
        }
        Ok(UserRepo::filter_by_privileges(
            &self.services.pool,
            &ids,
            &[Privilege::ViewPrivateImportRequests],
        )
        .await?)
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    /// Change source, target or reason. Editing a declined request reopens
    /// it. Returns the status after the edit.
    pub async fn edit(
        &self,
        ctx: &ActorContext,
        id: DbId,
        edit: RequestEdit,
    ) -> ManagerResult<RequestStatus> {
        const LABEL: &str = "edit";
        let mut manager = self.visible_manager(ctx, id).await?;
        manager.start_atomic(LABEL).await?;
        let result = self.edit_in_scope(&mut manager, ctx, edit).await;
        manager.finish_atomic(LABEL, result).await
    }

    async fn edit_in_scope(
        &self,
        manager: &mut RequestManager,
        ctx: &ActorContext,
        edit: RequestEdit,
    ) -> ManagerResult<RequestStatus> {
        let snapshot = manager.snapshot()?;
        if snapshot.requester_id != ctx.actor_id() && !ctx.is_reviewer() {
            return Err(CoreError::Forbidden(
                "Only the requester or a reviewer may edit this request".into(),
            )
            .into());
        }
        if snapshot.locked {
            return Err(CoreError::Conflict("Request is locked".into()).into());
        }
        if !accepts_content_edits(snapshot.status) {
            return Err(CoreError::Conflict(format!(
                "A {} request can no longer be edited",
                snapshot.status
            ))
            .into());
        }

        let old = manager.request()?.content();
        let new = RequestContent {
            source: edit.source.unwrap_or_else(|| old.source.clone()),
            target: edit.target.unwrap_or_else(|| old.target.clone()),
            reason: edit.reason.unwrap_or_else(|| old.reason.clone()),
        };
        validation::validate_reason(&new.reason)?;
        validation::validate_source(&new.source)?;
        if new.target != old.target {
            validation::validate_target_format(&new.target)?;
            if !self.services.sites.is_known_site(&new.target).await? {
                return Err(
                    CoreError::Validation(format!("Unknown target site: '{}'", new.target)).into(),
                );
            }
        }

        let changes = diff::diff_content(&old, &new);
        if changes.is_empty() {
            return Err(CoreError::Conflict("No changes were made".into()).into());
        }
        let rendered = diff::render_changes(&changes);

        let reopening = snapshot.status.reopens_on_edit();
        let reason_changed = new.reason != old.reason;
        if reopening || (snapshot.status == RequestStatus::Pending && reason_changed) {
            if let Some(existing) = manager.pending_duplicate(&new.reason).await? {
                return Err(CoreError::Conflict(format!(
                    "A pending request with the same reason already exists (#{existing})"
                ))
                .into());
            }
        }

        manager.set_source(new.source)?;
        manager.set_target(new.target)?;
        manager.set_reason(new.reason)?;
        let fields: Vec<&str> = changes.iter().map(|c| c.field).collect();
        manager
            .write_log(
                actions::EDIT,
                "",
                serde_json::json!({ "fields": fields }),
                ctx.actor_id(),
            )
            .await?;

        let receivers = self.thread_receivers(manager).await?;
        if reopening {
            let body = format!(
                "Request reopened by {} after an edit:\n\n{rendered}",
                ctx.actor.username
            );
            manager.set_status(RequestStatus::Pending)?;
            manager
                .add_comment(&body, self.accounts.extension.id, ctx.now)
                .await?;
            manager
                .log_status_update("", RequestStatus::Pending, ctx.actor_id())
                .await?;
            let notification = manager
                .notification(CATEGORY_STATUS_UPDATE, ctx.actor_id())?
                .with_receivers(receivers)
                .with_extra("status", RequestStatus::Pending.as_str())
                .with_extra("comment", body);
            manager.send_notification(notification).await;
            tracing::info!(request_id = manager.id()?, "Declined request reopened");
            Ok(RequestStatus::Pending)
        } else {
            let body = format!("Request edited:\n\n{rendered}");
            manager.add_comment(&body, ctx.actor_id(), ctx.now).await?;
            let notification = manager
                .notification(CATEGORY_REQUEST_COMMENT, ctx.actor_id())?
                .with_receivers(receivers)
                .with_extra("comment", body);
            manager.send_notification(notification).await;
            Ok(snapshot.status)
        }
    }

    // -----------------------------------------------------------------------
    // Comments
    // -----------------------------------------------------------------------

    pub async fn comment(
        &self,
        ctx: &ActorContext,
        id: DbId,
        body: &str,
    ) -> ManagerResult<RequestComment> {
        const LABEL: &str = "comment";
        validation::validate_comment(body)?;
        let mut manager = self.visible_manager(ctx, id).await?;
        manager.start_atomic(LABEL).await?;
        let result = self.comment_in_scope(&mut manager, ctx, body).await;
        manager.finish_atomic(LABEL, result).await
    }

    async fn comment_in_scope(
        &self,
        manager: &mut RequestManager,
        ctx: &ActorContext,
        body: &str,
    ) -> ManagerResult<RequestComment> {
        let caps = capability::capabilities(
            &manager.snapshot()?,
            ctx.actor_id(),
            &ctx.privileges,
            self.handling,
        );
        if !caps.can_comment {
            return Err(if manager.is_locked()? {
                CoreError::Conflict("Request is locked".into())
            } else {
                CoreError::Forbidden("You may not comment on this request".into())
            }
            .into());
        }

        let comment = manager.add_comment(body, ctx.actor_id(), ctx.now).await?;
        let receivers = self.thread_receivers(manager).await?;
        let notification = manager
            .notification(CATEGORY_REQUEST_COMMENT, ctx.actor_id())?
            .with_receivers(receivers)
            .with_extra("comment", body);
        manager.send_notification(notification).await;
        Ok(comment)
    }

    /// Requester plus everyone who has commented.
    async fn thread_receivers(&self, manager: &mut RequestManager) -> ManagerResult<Vec<DbId>> {
        let mut receivers = vec![manager.requester()?];
        receivers.extend(manager.participants().await?);
        Ok(receivers)
    }

    // -----------------------------------------------------------------------
    // Status handling
    // -----------------------------------------------------------------------

    /// Reviewer's manual status change.
    pub async fn update_status(
        &self,
        ctx: &ActorContext,
        id: DbId,
        status: RequestStatus,
        comment: &str,
    ) -> ManagerResult<()> {
        const LABEL: &str = "update-status";
        ctx.privileges.require(Privilege::HandleImportRequests)?;
        let mut manager = self.visible_manager(ctx, id).await?;
        manager.start_atomic(LABEL).await?;
        let result = self
            .update_status_in_scope(&mut manager, ctx, status, comment)
            .await;
        manager.finish_atomic(LABEL, result).await
    }

    async fn update_status_in_scope(
        &self,
        manager: &mut RequestManager,
        ctx: &ActorContext,
        status: RequestStatus,
        comment: &str,
    ) -> ManagerResult<()> {
        if manager.is_locked()? {
            return Err(CoreError::Conflict("Request is locked".into()).into());
        }
        self.handling
            .check_reviewer_transition(manager.status()?, status)?;
        self.apply_status_change(manager, ctx, status, comment).await
    }

    pub async fn decline(&self, ctx: &ActorContext, id: DbId, reason: &str) -> ManagerResult<()> {
        self.update_status(ctx, id, RequestStatus::Declined, reason)
            .await
    }

    /// Move to `starting` and enqueue the import job in the same scope.
    pub async fn start_import(&self, ctx: &ActorContext, id: DbId) -> ManagerResult<()> {
        const LABEL: &str = "start-import";
        ctx.privileges.require(Privilege::HandleImportRequests)?;
        let mut manager = self.visible_manager(ctx, id).await?;
        manager.start_atomic(LABEL).await?;
        let result = self.start_import_in_scope(&mut manager, ctx).await;
        manager.finish_atomic(LABEL, result).await
    }

    async fn start_import_in_scope(
        &self,
        manager: &mut RequestManager,
        ctx: &ActorContext,
    ) -> ManagerResult<()> {
        if manager.is_locked()? {
            return Err(CoreError::Conflict("Request is locked".into()).into());
        }
        self.handling.check_start_import(manager.status()?)?;
        self.apply_status_change(manager, ctx, RequestStatus::Starting, "")
            .await?;
        manager.execute_job(&ctx.actor.username).await?;
        Ok(())
    }

    /// Comment, log entry and requester notification for one status change.
    async fn apply_status_change(
        &self,
        manager: &mut RequestManager,
        ctx: &ActorContext,
        status: RequestStatus,
        comment: &str,
    ) -> ManagerResult<()> {
        manager
            .record_status_change(
                status,
                comment,
                ctx.actor_id(),
                self.accounts.status_update.id,
                ctx.now,
            )
            .await?;
        let notification = manager
            .notification(CATEGORY_STATUS_UPDATE, ctx.actor_id())?
            .with_receivers([manager.requester()?])
            .with_extra("status", status.as_str())
            .with_extra("comment", comment);
        manager.send_notification(notification).await;
        tracing::info!(
            request_id = manager.id()?,
            status = %status,
            reviewer = %ctx.actor.username,
            "Request status updated"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Flags and interwiki
    // -----------------------------------------------------------------------

    pub async fn set_locked(&self, ctx: &ActorContext, id: DbId, locked: bool) -> ManagerResult<()> {
        const LABEL: &str = "set-locked";
        ctx.privileges.require(Privilege::HandleImportRequests)?;
        let mut manager = self.visible_manager(ctx, id).await?;
        manager.start_atomic(LABEL).await?;
        let result = manager.set_locked(locked);
        manager.finish_atomic(LABEL, result).await?;
        tracing::info!(request_id = id, locked, "Request lock changed");
        Ok(())
    }

    pub async fn set_private(
        &self,
        ctx: &ActorContext,
        id: DbId,
        private: bool,
    ) -> ManagerResult<()> {
        const LABEL: &str = "set-private";
        ctx.privileges.require(Privilege::HandleImportRequests)?;
        let mut manager = self.visible_manager(ctx, id).await?;
        manager.start_atomic(LABEL).await?;
        let result = manager.set_private(private);
        manager.finish_atomic(LABEL, result).await?;
        tracing::info!(request_id = id, private, "Request visibility changed");
        Ok(())
    }

    /// Assign the interwiki prefix. `Ok(false)` when a prefix is already set
    /// or the mapping conflicts.
    pub async fn assign_interwiki(
        &self,
        ctx: &ActorContext,
        id: DbId,
        prefix: &str,
        url: &str,
    ) -> ManagerResult<bool> {
        ctx.privileges.require(Privilege::HandleInterwiki)?;
        validation::validate_interwiki_prefix(prefix)?;
        validation::validate_interwiki_url(url)?;
        let mut manager = self.visible_manager(ctx, id).await?;
        manager
            .insert_interwiki_prefix(prefix, url, ctx.actor_id())
            .await
    }
}

fn not_found(id: DbId) -> ManagerError {
    CoreError::NotFound {
        entity: "import_request",
        id,
    }
    .into()
}
