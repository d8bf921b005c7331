//! Runtime configuration for the administration layer.
//!
//! Every field has a default, so an empty YAML document (or no file at all)
//! yields a working configuration.
//!
//! # Example YAML
//!
//! ```yaml
//! rows_per_page: 50
//! max_result_size: 1000
//! sum_threshold: 16384
//! fk_summary_threshold: 256
//! display_max_length: 50
//! busy_timeout_ms: 5000
//! ```

use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AdminError, Result};

/// Tunables for paging, result caps, and summary thresholds.
///
/// # Examples
///
/// ```
/// # use litebrowse_sqlite::AdminConfig;
/// let config: AdminConfig = serde_yaml::from_str("rows_per_page: 25").unwrap();
/// assert_eq!(config.rows_per_page, 25);
/// assert_eq!(config.max_result_size, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Rows shown per page when browsing a table.
    pub rows_per_page: u64,
    /// Maximum rows returned by an ad-hoc query.
    pub max_result_size: usize,
    /// Column sums are computed only when the filtered row count is below this.
    pub sum_threshold: u64,
    /// Foreign-key targets are summarized only when they have fewer rows than this.
    pub fk_summary_threshold: u64,
    /// Text longer than this many characters is truncated in listings.
    pub display_max_length: usize,
    /// How long a session waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            rows_per_page: 50,
            max_result_size: 1000,
            sum_threshold: 1 << 14,
            fk_summary_threshold: 256,
            display_max_length: 50,
            busy_timeout_ms: 5000,
        }
    }
}

impl AdminConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](AdminError::Io) if the file cannot be read,
    /// [`Config`](AdminError::Config) if parsing fails, or
    /// [`InvalidInput`](AdminError::InvalidInput) if a value is out of range.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Rejects values that would make paging or query caps meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.rows_per_page == 0 {
            return Err(AdminError::InvalidInput(
                "rows_per_page must be at least 1".to_string(),
            ));
        }
        if self.max_result_size == 0 {
            return Err(AdminError::InvalidInput(
                "max_result_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config: AdminConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, AdminConfig::default());
        assert_eq!(config.sum_threshold, 16384);
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let config: AdminConfig =
            serde_yaml::from_str("rows_per_page: 10\nfk_summary_threshold: 8\n").unwrap();
        assert_eq!(config.rows_per_page, 10);
        assert_eq!(config.fk_summary_threshold, 8);
        assert_eq!(config.display_max_length, 50);
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let config = AdminConfig {
            rows_per_page: 0,
            ..AdminConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("litebrowse.yaml");
        let config = AdminConfig {
            rows_per_page: 20,
            ..AdminConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(AdminConfig::load(&path).unwrap(), config);
    }
}
