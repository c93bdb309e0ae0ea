//! The request manager: sole authority over one request's persisted state.
//!
//! A manager is bound to a request id with [`RequestManager::load_from_id`].
//! Reads go through accessors that fail with [`ManagerError::NotBound`]
//! when no row exists. Writes are staged by the setters and flushed by
//! [`RequestManager::end_atomic`]; between `start_atomic` and `end_atomic`
//! the row is locked (`SELECT ... FOR UPDATE`), and every comment, log entry
//! and job enqueued by the manager joins the same transaction.
//!
//! Notifications requested inside a scope are held back until the scope
//! commits, so nobody is told about a change that was rolled back.

use std::path::PathBuf;
use std::sync::Arc;

use importdump_core::audit::actions;
use importdump_core::capability::RequestSnapshot;
use importdump_core::command::{
    self, CommandVars, PLACEHOLDER_FILE_PATH, PLACEHOLDER_INSTALL_PATH,
    PLACEHOLDER_USERNAME_PREFIX, PLACEHOLDER_WIKI,
};
use importdump_core::config::ImportDumpConfig;
use importdump_core::naming;
use importdump_core::notification::Notification;
use importdump_core::privilege::{Privilege, PrivilegeSet};
use importdump_core::status::RequestStatus;
use importdump_core::types::{DbId, Timestamp};
use importdump_db::models::comment::{CreateRequestComment, RequestComment};
use importdump_db::models::import_request::{ImportRequest, UpdateImportRequest};
use importdump_db::models::job::Job;
use importdump_db::models::log::{CreateLogEntry, RequestLogEntry};
use importdump_db::models::user::User;
use importdump_db::repositories::{
    ImportRequestRepo, JobRepo, RequestCommentRepo, RequestLogRepo, UserRepo,
};
use importdump_db::DbPool;
use importdump_events::{NoopNotifier, Notifier};
use sqlx::{Postgres, Transaction};

use crate::error::{ManagerError, ManagerResult};
use crate::hooks::{
    DbInterwikiStore, DbSiteDirectory, DefaultImportHooks, ImportHooks, InterwikiStore,
    SiteDirectory,
};
use crate::jobs::ImportJobParams;

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Everything a manager needs besides the request itself.
#[derive(Clone)]
pub struct RequestServices {
    pub pool: DbPool,
    pub config: Arc<ImportDumpConfig>,
    pub notifier: Arc<dyn Notifier>,
    pub hooks: Arc<dyn ImportHooks>,
    pub interwiki: Arc<dyn InterwikiStore>,
    pub sites: Arc<dyn SiteDirectory>,
}

impl RequestServices {
    /// Database-backed collaborators and no notification subsystem.
    pub fn new(pool: DbPool, config: ImportDumpConfig) -> Self {
        Self {
            interwiki: Arc::new(DbInterwikiStore::new(pool.clone())),
            sites: Arc::new(DbSiteDirectory::new(pool.clone())),
            notifier: Arc::new(NoopNotifier),
            hooks: Arc::new(DefaultImportHooks),
            config: Arc::new(config),
            pool,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ImportHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_interwiki_store(mut self, store: Arc<dyn InterwikiStore>) -> Self {
        self.interwiki = store;
        self
    }

    pub fn with_site_directory(mut self, sites: Arc<dyn SiteDirectory>) -> Self {
        self.sites = sites;
        self
    }
}

// ---------------------------------------------------------------------------
// RequestManager
// ---------------------------------------------------------------------------

/// Run `$body` with `$e` bound to the open transaction, or to the pool when
/// no scope is open.
macro_rules! on_executor {
    ($self:ident, $e:ident => $body:expr) => {
        match $self.scope.as_mut() {
            Some(tx) => {
                let $e = &mut **tx;
                $body
            }
            None => {
                let $e = &$self.services.pool;
                $body
            }
        }
    };
}

pub struct RequestManager {
    services: RequestServices,
    id: Option<DbId>,
    /// Current values, including staged changes.
    row: Option<ImportRequest>,
    /// Values as last read from or written to storage.
    persisted: Option<ImportRequest>,
    scope: Option<Transaction<'static, Postgres>>,
    labels: Vec<String>,
    deferred: Vec<Notification>,
}

impl RequestManager {
    pub fn new(services: RequestServices) -> Self {
        Self {
            services,
            id: None,
            row: None,
            persisted: None,
            scope: None,
            labels: Vec::new(),
            deferred: Vec::new(),
        }
    }

    /// Create a manager bound to `id`.
    pub async fn load(services: RequestServices, id: DbId) -> ManagerResult<Self> {
        let mut manager = Self::new(services);
        manager.load_from_id(id).await?;
        Ok(manager)
    }

    /// Bind to `id`. A missing row is not an error here; check
    /// [`exists`](Self::exists).
    pub async fn load_from_id(&mut self, id: DbId) -> ManagerResult<()> {
        if self.scope.is_some() {
            return Err(ManagerError::Scope(
                "cannot rebind a manager inside an atomic scope".into(),
            ));
        }
        let row = ImportRequestRepo::find_by_id(&self.services.pool, id).await?;
        self.id = Some(id);
        self.persisted = row.clone();
        self.row = row;
        Ok(())
    }

    /// Whether a row with the bound id is present in storage.
    pub async fn exists(&mut self) -> ManagerResult<bool> {
        let Some(id) = self.id else {
            return Ok(false);
        };
        Ok(on_executor!(self, e => ImportRequestRepo::exists(e, id).await)?)
    }

    pub fn services(&self) -> &RequestServices {
        &self.services
    }

    pub fn config(&self) -> &ImportDumpConfig {
        &self.services.config
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The bound row with staged changes applied.
    pub fn request(&self) -> ManagerResult<&ImportRequest> {
        self.row.as_ref().ok_or(ManagerError::NotBound(self.id))
    }

    pub fn id(&self) -> ManagerResult<DbId> {
        self.request().map(|r| r.id)
    }

    pub fn source(&self) -> ManagerResult<&str> {
        self.request().map(|r| r.source.as_str())
    }

    pub fn target(&self) -> ManagerResult<&str> {
        self.request().map(|r| r.target.as_str())
    }

    pub fn reason(&self) -> ManagerResult<&str> {
        self.request().map(|r| r.reason.as_str())
    }

    pub fn status(&self) -> ManagerResult<RequestStatus> {
        Ok(self.request()?.status()?)
    }

    /// Id of the account that created the request.
    pub fn requester(&self) -> ManagerResult<DbId> {
        self.request().map(|r| r.requester_id)
    }

    pub async fn requester_user(&mut self) -> ManagerResult<User> {
        let requester = self.requester()?;
        on_executor!(self, e => UserRepo::find_by_id(e, requester).await)?.ok_or_else(|| {
            ManagerError::Core(importdump_core::error::CoreError::NotFound {
                entity: "user",
                id: requester,
            })
        })
    }

    pub fn timestamp(&self) -> ManagerResult<Timestamp> {
        self.request().map(|r| r.created_at)
    }

    pub fn is_locked(&self) -> ManagerResult<bool> {
        self.request().map(|r| r.locked)
    }

    /// Whether the request should be treated as private for a viewer
    /// holding `privileges`. Holders of the private-view privilege see it as
    /// public unless `forced`.
    pub fn is_private(&self, forced: bool, privileges: &PrivilegeSet) -> ManagerResult<bool> {
        let private = self.request()?.private;
        if !forced && privileges.has(Privilege::ViewPrivateImportRequests) {
            return Ok(false);
        }
        Ok(private)
    }

    pub fn interwiki_prefix(&self) -> ManagerResult<Option<&str>> {
        self.request()
            .map(|r| r.interwiki_prefix.as_deref().filter(|p| !p.is_empty()))
    }

    pub fn snapshot(&self) -> ManagerResult<RequestSnapshot> {
        Ok(self.request()?.snapshot()?)
    }

    /// `{target}-{timestamp}.xml`.
    pub fn file_name(&self) -> ManagerResult<String> {
        let row = self.request()?;
        Ok(naming::dump_file_name(&row.target, &row.created_at))
    }

    /// Location of the dump in the staging directory.
    pub fn file_path(&self) -> ManagerResult<PathBuf> {
        let row = self.request()?;
        Ok(naming::dump_file_path(
            &self.services.config.staging_path,
            &row.target,
            &row.created_at,
        ))
    }

    /// The staging path, unless the hooks override it.
    ///
    /// Async accessors take `&mut self` so their futures stay `Send`.
    pub async fn resolved_file_path(&mut self) -> ManagerResult<PathBuf> {
        let row = self.request()?;
        match self.services.hooks.file_path_for_request(row).await {
            Some(path) => Ok(path),
            None => self.file_path(),
        }
    }

    /// Size of the staged dump in bytes, `None` if it is missing.
    pub async fn file_size(&mut self) -> ManagerResult<Option<u64>> {
        let path = self.resolved_file_path().await?;
        Ok(tokio::fs::metadata(&path).await.ok().map(|m| m.len()))
    }

    pub async fn file_exists(&mut self) -> ManagerResult<bool> {
        let path = self.resolved_file_path().await?;
        Ok(tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    /// The import command as program + arguments.
    pub fn command_argv(&self) -> ManagerResult<Vec<String>> {
        let row = self.request()?;
        let config = &self.services.config;
        let file_path = self.file_path()?;
        let vars = CommandVars::new()
            .set(PLACEHOLDER_INSTALL_PATH, config.install_path.as_str())
            .set(PLACEHOLDER_WIKI, row.target.as_str())
            .set(
                PLACEHOLDER_USERNAME_PREFIX,
                row.interwiki_prefix.clone().unwrap_or_default(),
            )
            .set(PLACEHOLDER_FILE_PATH, file_path.to_string_lossy());
        Ok(command::render_argv(&config.import_command, &vars)?)
    }

    /// The import command, for display.
    pub fn command(&self) -> ManagerResult<String> {
        Ok(command::display_command(&self.command_argv()?))
    }

    /// User groups defined on the target site.
    pub async fn user_groups_from_target(&mut self) -> ManagerResult<Vec<String>> {
        let target = self.target()?;
        self.services.sites.user_groups(target).await
    }

    // -----------------------------------------------------------------------
    // Setters (staged until the scope ends)
    // -----------------------------------------------------------------------

    fn staged(&mut self) -> ManagerResult<&mut ImportRequest> {
        if self.scope.is_none() {
            return Err(ManagerError::Scope(
                "request fields can only be changed inside an atomic scope".into(),
            ));
        }
        self.row.as_mut().ok_or(ManagerError::NotBound(self.id))
    }

    pub fn set_source(&mut self, source: impl Into<String>) -> ManagerResult<()> {
        self.staged()?.source = source.into();
        Ok(())
    }

    pub fn set_target(&mut self, target: impl Into<String>) -> ManagerResult<()> {
        self.staged()?.target = target.into();
        Ok(())
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) -> ManagerResult<()> {
        self.staged()?.reason = reason.into();
        Ok(())
    }

    pub fn set_status(&mut self, status: RequestStatus) -> ManagerResult<()> {
        self.staged()?.status = status.as_str().to_string();
        Ok(())
    }

    pub fn set_locked(&mut self, locked: bool) -> ManagerResult<()> {
        self.staged()?.locked = locked;
        Ok(())
    }

    pub fn set_private(&mut self, private: bool) -> ManagerResult<()> {
        self.staged()?.private = private;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Atomic scopes
    // -----------------------------------------------------------------------

    pub fn in_atomic_scope(&self) -> bool {
        self.scope.is_some()
    }

    /// Open a labelled scope. The outermost scope begins a transaction,
    /// locks the row and refreshes it; inner scopes only nest.
    pub async fn start_atomic(&mut self, label: &str) -> ManagerResult<()> {
        if self.scope.is_none() {
            let id = self.id.ok_or(ManagerError::NotBound(None))?;
            let mut tx = self.services.pool.begin().await?;
            let Some(row) = ImportRequestRepo::find_for_update(&mut *tx, id).await? else {
                tx.rollback().await?;
                self.row = None;
                self.persisted = None;
                return Err(ManagerError::NotBound(Some(id)));
            };
            self.persisted = Some(row.clone());
            self.row = Some(row);
            self.scope = Some(tx);
            tracing::debug!(request_id = id, label, "Atomic scope opened");
        }
        self.labels.push(label.to_string());
        Ok(())
    }

    /// Close the innermost scope. Closing the outermost one writes staged
    /// fields, commits, then sends the held-back notifications.
    ///
    /// On a storage failure the transaction is rolled back and the manager
    /// is reloaded from storage.
    pub async fn end_atomic(&mut self, label: &str) -> ManagerResult<()> {
        match self.labels.last() {
            Some(top) if top == label => {}
            Some(top) => {
                return Err(ManagerError::Scope(format!(
                    "cannot end '{label}' while '{top}' is open"
                )))
            }
            None => {
                return Err(ManagerError::Scope(format!(
                    "no atomic scope open (ending '{label}')"
                )))
            }
        }
        self.labels.pop();
        if !self.labels.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.commit_scope().await {
            self.discard_scope().await;
            return Err(e);
        }

        tracing::debug!(request_id = ?self.id, label, "Atomic scope committed");
        self.dispatch_deferred().await;
        Ok(())
    }

    async fn commit_scope(&mut self) -> ManagerResult<()> {
        let Some(mut tx) = self.scope.take() else {
            return Err(ManagerError::Scope("atomic scope has no transaction".into()));
        };
        if let (Some(row), Some(persisted)) = (&self.row, &self.persisted) {
            if row != persisted {
                let update = UpdateImportRequest {
                    source: row.source.clone(),
                    target: row.target.clone(),
                    reason: row.reason.clone(),
                    status: row.status()?,
                    locked: row.locked,
                    private: row.private,
                };
                let written = ImportRequestRepo::update(&mut *tx, row.id, &update).await?;
                self.persisted = written.clone();
                self.row = written;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Roll back everything done since the outermost `start_atomic`,
    /// including held-back notifications, and reload from storage.
    pub async fn cancel_atomic(&mut self) -> ManagerResult<()> {
        let rolled_back = match self.scope.take() {
            Some(tx) => tx.rollback().await,
            None => Ok(()),
        };
        self.labels.clear();
        self.deferred.clear();
        self.reload().await?;
        if self.id.is_some() {
            tracing::debug!(request_id = ?self.id, "Atomic scope rolled back");
        }
        Ok(rolled_back?)
    }

    /// Close `label` if `result` is `Ok`, otherwise roll back and return the
    /// original error.
    pub async fn finish_atomic<T>(
        &mut self,
        label: &str,
        result: ManagerResult<T>,
    ) -> ManagerResult<T> {
        match result {
            Ok(value) => {
                self.end_atomic(label).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.cancel_atomic().await {
                    tracing::error!(error = %rollback, "Failed to roll back atomic scope");
                }
                Err(e)
            }
        }
    }

    async fn discard_scope(&mut self) {
        if let Err(e) = self.cancel_atomic().await {
            tracing::error!(error = %e, request_id = ?self.id, "Failed to reset after commit failure");
        }
    }

    async fn reload(&mut self) -> ManagerResult<()> {
        if let Some(id) = self.id {
            let row = ImportRequestRepo::find_by_id(&self.services.pool, id).await?;
            self.persisted = row.clone();
            self.row = row;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Comments, log, notifications
    // -----------------------------------------------------------------------

    /// Append a comment. Written immediately, or with the open scope.
    pub async fn add_comment(
        &mut self,
        body: &str,
        author: DbId,
        at: Timestamp,
    ) -> ManagerResult<RequestComment> {
        let input = CreateRequestComment {
            request_id: self.id()?,
            author_id: author,
            body: body.to_string(),
            created_at: at,
        };
        Ok(on_executor!(self, e => RequestCommentRepo::insert(e, &input).await)?)
    }

    /// Comments in insertion order.
    pub async fn get_comments(&mut self) -> ManagerResult<Vec<RequestComment>> {
        let id = self.id()?;
        Ok(on_executor!(self, e => RequestCommentRepo::list_for_request(e, id).await)?)
    }

    /// Another pending request whose reason is exactly `reason`. Inside a
    /// scope the lookup runs on the scope's transaction.
    pub async fn pending_duplicate(&mut self, reason: &str) -> ManagerResult<Option<DbId>> {
        let id = self.id()?;
        let found = on_executor!(self, e => {
            ImportRequestRepo::find_pending_by_reason(e, reason, Some(id)).await
        })?;
        Ok(found.map(|row| row.id))
    }

    /// Non-system accounts that have commented.
    pub async fn participants(&mut self) -> ManagerResult<Vec<DbId>> {
        let id = self.id()?;
        Ok(on_executor!(self, e => RequestCommentRepo::participants(e, id).await)?)
    }

    /// Append an entry to the public request log.
    pub async fn write_log(
        &mut self,
        action: &str,
        comment: &str,
        params: serde_json::Value,
        performer: DbId,
    ) -> ManagerResult<RequestLogEntry> {
        let input = CreateLogEntry {
            action: action.to_string(),
            performer_id: performer,
            request_id: self.id()?,
            comment: comment.to_string(),
            params,
        };
        match self.scope.as_mut() {
            Some(tx) => Ok(RequestLogRepo::insert(&mut **tx, &input).await?),
            None => {
                let mut tx = self.services.pool.begin().await?;
                let entry = RequestLogRepo::insert(&mut *tx, &input).await?;
                tx.commit().await?;
                Ok(entry)
            }
        }
    }

    pub async fn log_status_update(
        &mut self,
        comment: &str,
        new_status: RequestStatus,
        performer: DbId,
    ) -> ManagerResult<RequestLogEntry> {
        self.write_log(
            actions::STATUS_UPDATE,
            comment,
            serde_json::json!({ "status": new_status.as_str() }),
            performer,
        )
        .await
    }

    /// A notification about this request with the request link filled in.
    pub fn notification(&self, category: &'static str, agent: DbId) -> ManagerResult<Notification> {
        let row = self.request()?;
        Ok(Notification::new(category, row.id, agent)
            .with_extra("request-url", self.services.config.request_url(row.id))
            .with_extra("target", row.target.clone()))
    }

    /// Send now, or after the open scope commits.
    pub async fn send_notification(&mut self, notification: Notification) {
        if self.scope.is_some() {
            self.deferred.push(notification);
        } else {
            dispatch(self.services.notifier.as_ref(), &notification).await;
        }
    }

    async fn dispatch_deferred(&mut self) {
        for notification in std::mem::take(&mut self.deferred) {
            dispatch(self.services.notifier.as_ref(), &notification).await;
        }
    }

    // -----------------------------------------------------------------------
    // Composite mutations
    // -----------------------------------------------------------------------

    /// Stage a status change with its system comment and log entry. Must be
    /// called inside a scope.
    pub async fn record_status_change(
        &mut self,
        new_status: RequestStatus,
        comment: &str,
        performer: DbId,
        comment_author: DbId,
        at: Timestamp,
    ) -> ManagerResult<()> {
        self.set_status(new_status)?;
        self.add_comment(&status_comment(new_status, comment), comment_author, at)
            .await?;
        self.log_status_update(comment, new_status, performer).await?;
        Ok(())
    }

    /// Assign the interwiki prefix used to namespace imported usernames.
    ///
    /// Returns `false`, changing nothing, when the request already has a
    /// prefix, the target site maps `prefix` to a different URL, or the
    /// interwiki store rejects the insert.
    ///
    /// The prefix is claimed on the request row before the mapping is
    /// written, so a lost race never leaves a mapping behind.
    pub async fn insert_interwiki_prefix(
        &mut self,
        prefix: &str,
        url: &str,
        performer: DbId,
    ) -> ManagerResult<bool> {
        let (id, target) = {
            let row = self.request()?;
            if row.interwiki_prefix.as_deref().is_some_and(|p| !p.is_empty()) {
                return Ok(false);
            }
            (row.id, row.target.clone())
        };

        let existing = self.services.interwiki.lookup(&target, prefix).await?;
        if existing.as_deref().is_some_and(|mapped| mapped != url) {
            tracing::info!(request_id = id, prefix, wiki = %target, "Conflicting interwiki mapping");
            return Ok(false);
        }

        let claimed =
            on_executor!(self, e => ImportRequestRepo::set_interwiki_prefix(e, id, prefix).await)?;
        if !claimed {
            tracing::info!(request_id = id, prefix, "Interwiki prefix already assigned");
            return Ok(false);
        }

        if existing.is_none() {
            let inserted = self.services.interwiki.insert(&target, prefix, url).await;
            match inserted {
                Ok(true) => {}
                Ok(false) => {
                    self.release_interwiki_prefix(id, prefix).await?;
                    tracing::warn!(request_id = id, prefix, wiki = %target, "Interwiki insert rejected");
                    return Ok(false);
                }
                Err(e) => {
                    self.release_interwiki_prefix(id, prefix).await?;
                    return Err(e);
                }
            }
        }

        for row in [&mut self.row, &mut self.persisted] {
            if let Some(row) = row.as_mut() {
                row.interwiki_prefix = Some(prefix.to_string());
            }
        }

        self.write_log(
            actions::INTERWIKI,
            "",
            serde_json::json!({ "prefix": prefix, "url": url }),
            performer,
        )
        .await?;
        tracing::info!(request_id = id, prefix, "Interwiki prefix assigned");
        Ok(true)
    }

    async fn release_interwiki_prefix(&mut self, id: DbId, prefix: &str) -> ManagerResult<()> {
        on_executor!(self, e => ImportRequestRepo::clear_interwiki_prefix(e, id, prefix).await)?;
        Ok(())
    }

    /// Enqueue the import job. Does not wait for it; inside a scope the job
    /// becomes visible to workers on commit.
    pub async fn execute_job(&mut self, username: &str) -> ManagerResult<Job> {
        let params = ImportJobParams {
            requestid: self.id()?,
            username: username.to_string(),
        };
        let new_job = params.to_job();
        let job = on_executor!(self, e => JobRepo::enqueue(e, &new_job).await)?;
        tracing::info!(request_id = params.requestid, job_id = job.id, username, "Import job enqueued");
        Ok(job)
    }
}

async fn dispatch(notifier: &dyn Notifier, notification: &Notification) {
    if let Err(e) = notifier.notify(notification).await {
        tracing::warn!(
            error = %e,
            category = notification.category,
            request_id = notification.request_id,
            "Notification delivery failed"
        );
    }
}

/// Body of the system comment recorded for a status change.
pub fn status_comment(status: RequestStatus, comment: &str) -> String {
    let comment = comment.trim();
    if comment.is_empty() {
        format!("Status updated to {status}.")
    } else {
        format!("Status updated to {status}.\n\n{comment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_comment_appends_reviewer_text() {
        assert_eq!(
            status_comment(RequestStatus::Declined, ""),
            "Status updated to declined."
        );
        assert_eq!(
            status_comment(RequestStatus::Declined, " not a valid dump "),
            "Status updated to declined.\n\nnot a valid dump"
        );
    }
}
