//! Synthetic system identities.

use importdump_core::config::ImportDumpConfig;
use importdump_core::privilege::{Actor, ActorContext};
use importdump_core::types::Timestamp;
use importdump_db::repositories::UserRepo;
use importdump_db::DbPool;

/// The two system accounts, resolved once at start-up.
#[derive(Debug, Clone)]
pub struct SystemAccounts {
    /// Authors reopening comments and acts on behalf of the extension.
    pub extension: Actor,
    /// Authors status-change comments.
    pub status_update: Actor,
}

impl SystemAccounts {
    /// Look up the configured system accounts, creating them if missing.
    pub async fn ensure(pool: &DbPool, config: &ImportDumpConfig) -> Result<Self, sqlx::Error> {
        let extension = UserRepo::ensure_system_account(pool, &config.system_account).await?;
        let status_update = UserRepo::ensure_system_account(pool, &config.status_account).await?;
        tracing::info!(
            extension = %extension.username,
            status_update = %status_update.username,
            "System accounts resolved"
        );
        Ok(Self {
            extension: extension.actor(),
            status_update: status_update.actor(),
        })
    }

    /// Context for work the extension does on its own behalf.
    pub fn extension_context(&self, now: Timestamp) -> ActorContext {
        ActorContext::system(self.extension.clone(), now)
    }
}
