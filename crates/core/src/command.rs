//! Import command templates.
//!
//! The import command is configured as a whitespace-separated template with
//! `{placeholder}` tokens. It is rendered into an argv (no shell involved),
//! so a file path containing spaces stays one argument.

use std::collections::HashMap;

use crate::error::CoreError;

/// Default import command.
pub const DEFAULT_IMPORT_COMMAND: &str = "php {IP}/maintenance/importDump.php --wiki={wiki} \
     --username-prefix={username-prefix} --no-updates {file-path}";

pub const PLACEHOLDER_INSTALL_PATH: &str = "IP";
pub const PLACEHOLDER_WIKI: &str = "wiki";
pub const PLACEHOLDER_USERNAME_PREFIX: &str = "username-prefix";
pub const PLACEHOLDER_FILE_PATH: &str = "file-path";

/// Values substituted into a command template.
#[derive(Debug, Clone, Default)]
pub struct CommandVars {
    values: HashMap<&'static str, String>,
}

impl CommandVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.values.insert(key, value.into());
        self
    }

    fn substitute(&self, token: &str) -> String {
        let mut out = token.to_string();
        for (key, value) in &self.values {
            out = out.replace(&format!("{{{key}}}"), value);
        }
        out
    }
}

/// Render a template into program + arguments.
///
/// Tokens are split on whitespace before substitution. An argument that is
/// a bare `--flag={placeholder}` whose value renders empty is dropped, so an
/// unset username prefix does not produce `--username-prefix=`.
pub fn render_argv(template: &str, vars: &CommandVars) -> Result<Vec<String>, CoreError> {
    let argv: Vec<String> = template
        .split_whitespace()
        .filter_map(|token| {
            let rendered = vars.substitute(token);
            let empty_flag = token.starts_with("--") && rendered.ends_with('=');
            (!empty_flag).then_some(rendered)
        })
        .collect();

    if argv.is_empty() {
        return Err(CoreError::Validation("Import command template is empty".to_string()));
    }
    Ok(argv)
}

/// Human-readable rendering of a command, for display and logging.
pub fn display_command(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            if arg.contains(char::is_whitespace) {
                format!("'{arg}'")
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
