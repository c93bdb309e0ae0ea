//! Staging-file naming convention for uploaded dumps.
//!
//! A dump uploaded for `target` at creation time `ts` is staged as
//! `{target}-{YYYYMMDDHHMMSS}.xml` under the configured staging path.

use std::path::{Path, PathBuf};

use crate::types::Timestamp;

/// Timestamp layout used in staged file names (14 digits, UTC).
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Extension of staged dump files.
pub const DUMP_EXTENSION: &str = "xml";

/// File name of the dump staged for a request.
///
/// # Examples
///
/// ```
/// use chrono::TimeZone;
/// use importdump_core::naming::dump_file_name;
///
/// let ts = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
/// assert_eq!(dump_file_name("wikidb", &ts), "wikidb-20240301123005.xml");
/// ```
pub fn dump_file_name(target: &str, created_at: &Timestamp) -> String {
    format!(
        "{target}-{}.{DUMP_EXTENSION}",
        created_at.format(FILE_TIMESTAMP_FORMAT)
    )
}

/// Full path of the dump staged for a request.
pub fn dump_file_path(staging_path: &Path, target: &str, created_at: &Timestamp) -> PathBuf {
    staging_path.join(dump_file_name(target, created_at))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ts() -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2023, 11, 5, 8, 4, 9).unwrap()
    }

    #[test]
    fn name_pads_timestamp() {
        assert_eq!(dump_file_name("testwiki", &ts()), "testwiki-20231105080409.xml");
    }

    #[test]
    fn path_joins_staging_dir() {
        let path = dump_file_path(Path::new("/srv/staging"), "testwiki", &ts());
        assert_eq!(path, PathBuf::from("/srv/staging/testwiki-20231105080409.xml"));
    }
}
