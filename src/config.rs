//! Configuration file.
//!
//! The file is located with an explicit path or, failing that, the first of the following that
//! exists:
//!
//! 1. `./netem-exec.toml`
//! 1. `./.netem-exec.toml`
//! 1. `~/.config/netem-exec.toml`
//! 1. `~/.netem-exec.toml`
//! 1. `/etc/netem-exec.toml`
//!
//! When none exists the built-in [`DEFAULT_CONFIG`](constant.DEFAULT_CONFIG.html) is used.

use std::env;
use std::fs;
use std::path::Path;

use toml::de::from_str;
use tracing::debug;

use crate::device::PROBE_ADDRESS;
use crate::error::*;

/// The configuration used when no file is found.
pub const DEFAULT_CONFIG: &str = include_str!("netem-exec.toml");

/// Defaults for options not given on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    /// Network device to impair.
    pub interface: Option<String>,
    /// Address whose route selects the device when no interface is given.
    pub probe: String,
    /// Escalate privileges for host configuration.
    pub escalate: bool,
    /// Command prefix used to escalate privileges.
    pub escalation: Vec<String>,
    /// Only report warnings and errors.
    pub quiet: bool,
}

impl Default for Configuration {
    fn default() -> Configuration {
        Configuration {
            interface: None,
            probe: PROBE_ADDRESS.to_string(),
            escalate: false,
            escalation: vec!["sudo".to_string()],
            quiet: false,
        }
    }
}

impl Configuration {
    /// Load the configuration from `path`, or from the first default location that exists.
    pub fn load(path: Option<&str>) -> Result<Configuration> {
        let text = match path.map(String::from).or_else(Configuration::find_path) {
            Some(path) => {
                debug!("reading configuration from {}", path);
                fs::read_to_string(&path)
                    .chain_err(|| format!("could not read configuration file {}", path))?
            }
            None => DEFAULT_CONFIG.to_string(),
        };

        Configuration::parse(&text)
    }

    /// Parse a configuration file.
    pub fn parse(text: &str) -> Result<Configuration> {
        let config: Configuration = from_str(text)?;
        if config.escalation.is_empty() {
            bail!("configuration key 'escalation' must name a command");
        }
        Ok(config)
    }

    /// Determine the path of the configuration file.
    fn find_path() -> Option<String> {
        Configuration::default_paths()
            .into_iter()
            .find(|path| Path::new(path).exists())
    }

    /// Default configuration path list.
    fn default_paths() -> Vec<String> {
        let mut paths = vec!["netem-exec.toml".to_string(), ".netem-exec.toml".to_string()];

        if let Ok(home) = env::var("HOME") {
            paths.push(format!("{}/.config/netem-exec.toml", home));
            paths.push(format!("{}/.netem-exec.toml", home));
        }

        paths.push("/etc/netem-exec.toml".to_string());

        paths
    }
}
