//! Collaborators the workflow depends on but does not own.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use importdump_db::models::import_request::ImportRequest;
use importdump_db::repositories::{InterwikiRepo, SiteRepo};
use importdump_db::DbPool;

use crate::error::ManagerResult;

/// Extension points around the import itself.
#[async_trait]
pub trait ImportHooks: Send + Sync {
    /// Override where the dump for `request` is read from. `None` keeps the
    /// staging path.
    async fn file_path_for_request(&self, _request: &ImportRequest) -> Option<PathBuf> {
        None
    }

    /// Fired once after a successful import and its maintenance passes.
    async fn after_import(&self, _file_path: &Path, _request: &ImportRequest) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultImportHooks;

impl ImportHooks for DefaultImportHooks {}

/// The target sites' interwiki tables.
#[async_trait]
pub trait InterwikiStore: Send + Sync {
    /// URL mapped to `prefix` on `site`, if any.
    async fn lookup(&self, site: &str, prefix: &str) -> ManagerResult<Option<String>>;

    /// Add a mapping. `false` when the store rejects it.
    async fn insert(&self, site: &str, prefix: &str, url: &str) -> ManagerResult<bool>;
}

pub struct DbInterwikiStore {
    pool: DbPool,
}

impl DbInterwikiStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InterwikiStore for DbInterwikiStore {
    async fn lookup(&self, site: &str, prefix: &str) -> ManagerResult<Option<String>> {
        Ok(InterwikiRepo::find(&self.pool, site, prefix)
            .await?
            .map(|entry| entry.url))
    }

    async fn insert(&self, site: &str, prefix: &str, url: &str) -> ManagerResult<bool> {
        Ok(InterwikiRepo::insert(&self.pool, site, prefix, url).await?)
    }
}

/// The set of known local sites.
#[async_trait]
pub trait SiteDirectory: Send + Sync {
    async fn is_known_site(&self, site: &str) -> ManagerResult<bool>;

    async fn user_groups(&self, site: &str) -> ManagerResult<Vec<String>>;
}

pub struct DbSiteDirectory {
    pool: DbPool,
}

impl DbSiteDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SiteDirectory for DbSiteDirectory {
    async fn is_known_site(&self, site: &str) -> ManagerResult<bool> {
        Ok(SiteRepo::is_known(&self.pool, site).await?)
    }

    async fn user_groups(&self, site: &str) -> ManagerResult<Vec<String>> {
        Ok(SiteRepo::user_groups(&self.pool, site).await?)
    }
}
