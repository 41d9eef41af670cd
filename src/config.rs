//! Sweeper configuration.
//!
//! Values come from `LEADSWEEP_*` environment variables, each falling back
//! to a default when unset. Command-line flags in the daemon override them.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, warn};

use crate::error::{LeadsweepError, LeadsweepResult};
use crate::schedule::{Schedule, DEFAULT_SCHEDULE};
use crate::sweep::KeepPolicy;

/// Store directory.
pub const ENV_DATA_DIR: &str = "LEADSWEEP_DATA_DIR";
/// Recurrence expression.
pub const ENV_SCHEDULE: &str = "LEADSWEEP_SCHEDULE";
/// Keep policy (`oldest` or `store-order`).
pub const ENV_KEEP: &str = "LEADSWEEP_KEEP";
/// Run one sweep immediately at startup (`true`/`false`).
pub const ENV_RUN_ON_START: &str = "LEADSWEEP_RUN_ON_START";

/// Default store directory.
pub const DEFAULT_DATA_DIR: &str = "./leads.db";

/// Everything the daemon needs to run the sweeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Directory of the persistent lead store.
    pub data_dir: PathBuf,
    /// Recurrence expression, see [`Schedule::parse`].
    pub schedule: String,
    /// Which lead of a duplicate group survives.
    pub keep: KeepPolicy,
    /// Run one sweep immediately at startup.
    pub run_on_start: bool,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            schedule: DEFAULT_SCHEDULE.to_string(),
            keep: KeepPolicy::default(),
            run_on_start: false,
        }
    }
}

fn load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> LeadsweepResult<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        info!("{key} not set, using default: {default}");
        return Ok(default);
    };
    raw.trim().parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        LeadsweepError::config(format!("invalid {key} '{raw}': {e}"))
    })
}

impl SweeperConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    /// `Config` if a variable is set but cannot be parsed.
    pub fn from_env() -> LeadsweepResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    /// `Config` if a variable is set but cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LeadsweepResult<Self> {
        let defaults = Self::default();
        let data_dir: String = load(&lookup, ENV_DATA_DIR, defaults.data_dir.display().to_string())?;
        let config = Self {
            data_dir: PathBuf::from(data_dir),
            schedule: load(&lookup, ENV_SCHEDULE, defaults.schedule)?,
            keep: load(&lookup, ENV_KEEP, defaults.keep)?,
            run_on_start: load(&lookup, ENV_RUN_ON_START, defaults.run_on_start)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration and returns the parsed schedule.
    ///
    /// # Errors
    /// `Validation` if the schedule does not parse, `Config` if the data
    /// directory is empty.
    pub fn validate(&self) -> LeadsweepResult<Schedule> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(LeadsweepError::config("data directory cannot be empty"));
        }
        Ok(Schedule::parse(&self.schedule)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = SweeperConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SweeperConfig::default());
        assert_eq!(config.schedule, "0 */8 * * *");
        assert_eq!(config.keep, KeepPolicy::Oldest);
    }

    #[test]
    fn test_reads_every_variable() {
        let config = SweeperConfig::from_lookup(lookup(&[
            (ENV_DATA_DIR, "/var/lib/leads"),
            (ENV_SCHEDULE, "every 1h"),
            (ENV_KEEP, "store-order"),
            (ENV_RUN_ON_START, "true"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/leads"));
        assert_eq!(config.schedule, "every 1h");
        assert_eq!(config.keep, KeepPolicy::StoreOrder);
        assert!(config.run_on_start);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let err = SweeperConfig::from_lookup(lookup(&[(ENV_KEEP, "newest")])).unwrap_err();
        assert!(err.to_string().contains(ENV_KEEP));

        let err = SweeperConfig::from_lookup(lookup(&[(ENV_RUN_ON_START, "sometimes")])).unwrap_err();
        assert!(matches!(err, LeadsweepError::Config { .. }));

        let err = SweeperConfig::from_lookup(lookup(&[(ENV_SCHEDULE, "every fortnight")])).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_validate_rejects_empty_data_dir() {
        let config = SweeperConfig {
            data_dir: PathBuf::new(),
            ..SweeperConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(SweeperConfig::default().validate().is_ok());
    }
}
