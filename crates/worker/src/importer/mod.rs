//! The import step itself, behind the [`DumpImporter`] seam.
//!
//! [`CommandImporter`] drives the site's maintenance scripts as
//! subprocesses. Tests substitute a scripted importer.

mod command;
mod subprocess;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use importdump_core::error::CoreError;
use tokio::io::AsyncReadExt;

pub use command::CommandImporter;
pub use subprocess::{run_command, CommandOutput};

/// Bytes read from the head of a dump when checking its root element.
const HEADER_PROBE_BYTES: u64 = 4 * 1024;

/// Root element every XML dump starts with.
const DUMP_ROOT_ELEMENT: &str = "<mediawiki";

/// Errors that can occur while validating or importing a dump.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Import source {path} cannot be read: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Import source {0} is not an XML dump")]
    InvalidSource(PathBuf),

    #[error("Command timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Command failed with exit code {exit_code}: {stderr}")]
    ExecutionFailed { exit_code: i32, stderr: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Command(#[from] CoreError),
}

/// One import to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub request_id: i64,
    /// Database name of the site the dump goes into.
    pub target: String,
    pub file_path: PathBuf,
    /// Prefix for imported usernames, when an interwiki prefix is set.
    pub username_prefix: Option<String>,
}

/// Bulk refreshes run over the imported content, in [`MaintenancePass::ALL`]
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaintenancePass {
    SiteStats,
    SearchIndex,
    RecentChanges,
    EditCounts,
}

impl MaintenancePass {
    pub const ALL: [MaintenancePass; 4] = [
        Self::SiteStats,
        Self::SearchIndex,
        Self::RecentChanges,
        Self::EditCounts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SiteStats => "site-stats",
            Self::SearchIndex => "search-index",
            Self::RecentChanges => "recent-changes",
            Self::EditCounts => "edit-counts",
        }
    }

    /// Maintenance script and its extra arguments.
    pub fn script(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Self::SiteStats => ("initSiteStats.php", &["--update"]),
            Self::SearchIndex => ("rebuildtextindex.php", &[]),
            Self::RecentChanges => ("rebuildrecentchanges.php", &[]),
            Self::EditCounts => ("initEditCount.php", &[]),
        }
    }
}

impl std::fmt::Display for MaintenancePass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait DumpImporter: Send + Sync {
    /// Fail unless `path` opens as an import source.
    async fn validate_source(&self, path: &Path) -> Result<(), ImportError>;

    async fn import(&self, spec: &ImportSpec) -> Result<(), ImportError>;

    async fn run_maintenance(&self, target: &str, pass: MaintenancePass)
        -> Result<(), ImportError>;
}

/// Open `path` and check that its head carries the dump root element.
pub async fn check_dump_header(path: &Path) -> Result<(), ImportError> {
    let unreadable = |source| ImportError::Unreadable {
        path: path.to_path_buf(),
        source,
    };
    let file = tokio::fs::File::open(path).await.map_err(unreadable)?;
    let mut head = Vec::new();
    file.take(HEADER_PROBE_BYTES)
        .read_to_end(&mut head)
        .await
        .map_err(unreadable)?;

    if String::from_utf8_lossy(&head).contains(DUMP_ROOT_ELEMENT) {
        Ok(())
    } else {
        Err(ImportError::InvalidSource(path.to_path_buf()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;

    use super::*;

    fn dump_file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new()
            .suffix(".xml")
            .tempfile()
            .expect("create temp file");
        write!(f, "{contents}").expect("write dump");
        f
    }

    #[tokio::test]
    async fn accepts_xml_dump() {
        let f = dump_file(
            "<?xml version=\"1.0\"?>\n<mediawiki xmlns=\"http://www.mediawiki.org/xml/export-0.11/\">",
        );
        assert!(check_dump_header(f.path()).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_other_content() {
        let f = dump_file("{\"not\": \"a dump\"}");
        assert_matches!(
            check_dump_header(f.path()).await,
            Err(ImportError::InvalidSource(_))
        );
    }

    #[tokio::test]
    async fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = check_dump_header(&dir.path().join("gone.xml"))
            .await
            .unwrap_err();
        assert_matches!(err, ImportError::Unreadable { .. });
        assert!(err.to_string().contains("gone.xml"));
    }

    #[test]
    fn passes_run_in_fixed_order() {
        let names: Vec<&str> = MaintenancePass::ALL.iter().map(|p| p.as_str()).collect();
        assert_eq!(
            names,
            vec!["site-stats", "search-index", "recent-changes", "edit-counts"]
        );
        assert_eq!(MaintenancePass::SiteStats.script().1, &["--update"]);
    }
}
