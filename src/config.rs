use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use perf::runner::RunOptions;
use perf::Suite;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to deserialize config file: {0}")]
    Deserialize(#[from] toml::de::Error),
}

#[cfg(target_os = "windows")]
pub const DEFAULT_PATH: &str = r"C:\Program Files\storebench\config.toml";

#[cfg(target_family = "unix")]
pub const DEFAULT_PATH: &str = "/etc/storebench/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub suites: Vec<Suite>,
    pub repetitions: Option<u32>,
    pub filter: Option<String>,
    pub fail_fast: bool,
    /// Back the string store with this file instead of memory.
    pub local_storage_path: Option<PathBuf>,
    /// Also write the JSON report here.
    pub results_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            suites: Suite::ALL.to_vec(),
            repetitions: None,
            filter: None,
            fail_fast: false,
            local_storage_path: None,
            results_path: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        toml::from_str(&contents).map_err(ConfigError::from)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            repetitions: self.repetitions,
            filter: self.filter.clone(),
            fail_fast: self.fail_fast,
        }
    }
}
