//! Optional TOML configuration for the engine sizing.
//!
//! Every field defaults to the engine's own default, so a config file only
//! names what it changes:
//!
//! ```toml
//! rob_size = 32
//! nb_units = 4
//! cdb_policy = "round-robin"
//! ```

use tomasim_core::{CdbPolicy, Parameters};

use serde::Deserialize;
use thiserror::Error;

use std::fs;
use std::io;
use std::path::Path;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown cdb_policy '{0}', expected 'lowest-index' or 'round-robin'")]
    Policy(String),
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    mem_size: Option<usize>,
    rob_size: Option<usize>,
    exb_size: Option<usize>,
    reg_size: Option<usize>,
    cdb_size: Option<usize>,
    nb_units: Option<usize>,
    lb_size: Option<usize>,
    sb_size: Option<usize>,
    cdb_policy: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(&fs::read_to_string(path)?)?;
        // Surface a bad policy name at load time, not at apply time.
        config.policy()?;
        Ok(config)
    }

    fn policy(&self) -> Result<Option<CdbPolicy>, ConfigError> {
        self.cdb_policy
            .as_deref()
            .map(|name| match name {
                "lowest-index" => Ok(CdbPolicy::LowestIndex),
                "round-robin" => Ok(CdbPolicy::RoundRobin),
                other => Err(ConfigError::Policy(other.into())),
            })
            .transpose()
    }

    /// Overlay the configured fields on the default parameters.
    pub fn apply(&self, params: &mut Parameters) {
        params.mem_size = self.mem_size.unwrap_or(params.mem_size);
        params.rob_size = self.rob_size.unwrap_or(params.rob_size);
        params.exb_size = self.exb_size.unwrap_or(params.exb_size);
        params.reg_size = self.reg_size.unwrap_or(params.reg_size);
        params.cdb_size = self.cdb_size.unwrap_or(params.cdb_size);
        params.nb_units = self.nb_units.unwrap_or(params.nb_units);
        params.lb_size = self.lb_size.unwrap_or(params.lb_size);
        params.sb_size = self.sb_size.unwrap_or(params.sb_size);
        if let Ok(Some(policy)) = self.policy() {
            params.cdb_policy = policy;
        }
    }
}
