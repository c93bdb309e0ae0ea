//! Subprocess-backed importer.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use importdump_core::command::{
    self, CommandVars, PLACEHOLDER_FILE_PATH, PLACEHOLDER_INSTALL_PATH,
    PLACEHOLDER_USERNAME_PREFIX, PLACEHOLDER_WIKI,
};
use importdump_core::config::ImportDumpConfig;

use super::subprocess::run_command;
use super::{check_dump_header, DumpImporter, ImportError, ImportSpec, MaintenancePass};

const PLACEHOLDER_SCRIPT: &str = "script";

/// Maintenance scripts run with the same interpreter layout as the import.
const MAINTENANCE_COMMAND: &str = "php {IP}/maintenance/{script} --wiki={wiki}";

/// Runs the configured import command and the maintenance scripts.
#[derive(Debug, Clone)]
pub struct CommandImporter {
    import_command: String,
    maintenance_command: String,
    install_path: String,
    timeout: Duration,
}

impl CommandImporter {
    pub fn new(config: &ImportDumpConfig) -> Self {
        Self {
            import_command: config.import_command.clone(),
            maintenance_command: MAINTENANCE_COMMAND.to_string(),
            install_path: config.install_path.clone(),
            timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    /// Replace the maintenance template. `{script}` names the script.
    pub fn with_maintenance_command(mut self, template: impl Into<String>) -> Self {
        self.maintenance_command = template.into();
        self
    }

    pub fn import_argv(&self, spec: &ImportSpec) -> Result<Vec<String>, ImportError> {
        let vars = CommandVars::new()
            .set(PLACEHOLDER_INSTALL_PATH, self.install_path.as_str())
            .set(PLACEHOLDER_WIKI, spec.target.as_str())
            .set(
                PLACEHOLDER_USERNAME_PREFIX,
                spec.username_prefix.clone().unwrap_or_default(),
            )
            .set(PLACEHOLDER_FILE_PATH, spec.file_path.to_string_lossy());
        Ok(command::render_argv(&self.import_command, &vars)?)
    }

    pub fn maintenance_argv(
        &self,
        target: &str,
        pass: MaintenancePass,
    ) -> Result<Vec<String>, ImportError> {
        let (script, extra) = pass.script();
        let vars = CommandVars::new()
            .set(PLACEHOLDER_INSTALL_PATH, self.install_path.as_str())
            .set(PLACEHOLDER_WIKI, target)
            .set(PLACEHOLDER_SCRIPT, script);
        let mut argv = command::render_argv(&self.maintenance_command, &vars)?;
        argv.extend(extra.iter().map(|arg| arg.to_string()));
        Ok(argv)
    }
}

#[async_trait]
impl DumpImporter for CommandImporter {
    async fn validate_source(&self, path: &Path) -> Result<(), ImportError> {
        check_dump_header(path).await
    }

    async fn import(&self, spec: &ImportSpec) -> Result<(), ImportError> {
        let argv = self.import_argv(spec)?;
        tracing::info!(
            request_id = spec.request_id,
            wiki = %spec.target,
            command = %command::display_command(&argv),
            "Running import command"
        );
        let output = run_command(&argv, self.timeout).await?;
        tracing::info!(
            request_id = spec.request_id,
            duration_ms = output.duration_ms,
            "Import command finished"
        );
        Ok(())
    }

    async fn run_maintenance(
        &self,
        target: &str,
        pass: MaintenancePass,
    ) -> Result<(), ImportError> {
        let argv = self.maintenance_argv(target, pass)?;
        tracing::debug!(
            wiki = target,
            pass = %pass,
            command = %command::display_command(&argv),
            "Running maintenance pass"
        );
        run_command(&argv, self.timeout).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn spec(prefix: Option<&str>) -> ImportSpec {
        ImportSpec {
            request_id: 1,
            target: "wikidb".to_string(),
            file_path: PathBuf::from("/staging/wikidb 1.xml"),
            username_prefix: prefix.map(str::to_string),
        }
    }

    fn importer() -> CommandImporter {
        CommandImporter::new(&ImportDumpConfig {
            install_path: "/srv/mw".to_string(),
            ..ImportDumpConfig::default()
        })
    }

    #[test]
    fn import_argv_keeps_path_as_one_argument() {
        let argv = importer().import_argv(&spec(Some("w"))).unwrap();
        assert_eq!(
            argv,
            vec![
                "php",
                "/srv/mw/maintenance/importDump.php",
                "--wiki=wikidb",
                "--username-prefix=w",
                "--no-updates",
                "/staging/wikidb 1.xml",
            ]
        );
    }

    #[test]
    fn import_argv_drops_empty_prefix() {
        let argv = importer().import_argv(&spec(None)).unwrap();
        assert!(!argv.iter().any(|a| a.starts_with("--username-prefix")));
    }

    #[test]
    fn maintenance_argv_names_script() {
        let argv = importer()
            .maintenance_argv("wikidb", MaintenancePass::SiteStats)
            .unwrap();
        assert_eq!(
            argv,
            vec![
                "php",
                "/srv/mw/maintenance/initSiteStats.php",
                "--wiki=wikidb",
                "--update",
            ]
        );
    }

    #[tokio::test]
    async fn failing_import_command_is_an_error() {
        let importer = CommandImporter::new(&ImportDumpConfig {
            import_command: "false {file-path}".to_string(),
            ..ImportDumpConfig::default()
        });
        let err = importer.import(&spec(None)).await.unwrap_err();
        assert!(matches!(err, ImportError::ExecutionFailed { exit_code: 1, .. }));
    }

    #[tokio::test]
    async fn maintenance_template_can_be_replaced() {
        let importer = importer().with_maintenance_command("true {script}");
        for pass in MaintenancePass::ALL {
            importer.run_maintenance("wikidb", pass).await.unwrap();
        }
    }
}
