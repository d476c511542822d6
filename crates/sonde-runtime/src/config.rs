// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The `Sonde.toml` configuration file.

use crate::cli::Cli;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use sonde_core::{MonitorConfig, Pid};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "Sonde.toml";

/// Collector settings, read from `Sonde.toml` and overridden by the CLI.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SondeConfig {
    /// Sampling interval of every monitor, in milliseconds.
    pub read_interval_ms: u64,
    /// Output directory of the trace. `-` keeps the trace in memory.
    pub output_dir: PathBuf,
    /// Whether to run one monitor per CPU.
    pub cpu: bool,
    /// Whether to run the process monitor.
    pub processes: bool,
    /// Whether to sample the NVIDIA GPUs and the processes using them.
    pub gpu: bool,
    /// Restricts the process monitor to these pids when not empty.
    pub pids: Vec<u32>,
}

impl Default for SondeConfig {
    fn default() -> Self {
        Self {
            read_interval_ms: 100,
            output_dir: PathBuf::from("sonde-trace"),
            cpu: true,
            processes: true,
            gpu: false,
            pids: Vec::new(),
        }
    }
}

impl SondeConfig {
    /// Loads the configuration from `path`, or from `Sonde.toml` if it exists.
    ///
    /// An explicitly given file must exist. Without one, a missing
    /// `Sonde.toml` yields the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Path::new(DEFAULT_CONFIG_FILE),
            None => {
                log::debug!("No '{}' found. Using default configuration.", DEFAULT_CONFIG_FILE);
                return Ok(Self::default());
            }
        };

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{}'", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML from '{}'", path.display()))?;
        log::info!("Loaded configuration from '{}'", path.display());
        Ok(config)
    }

    /// Applies the command-line overrides.
    pub fn apply(&mut self, cli: &Cli) {
        if let Some(interval) = cli.interval_ms {
            self.read_interval_ms = interval;
        }
        if let Some(output) = &cli.output {
            self.output_dir = output.clone();
        }
        if cli.no_cpu {
            self.cpu = false;
        }
        if cli.no_processes {
            self.processes = false;
        }
        if cli.gpu {
            self.gpu = true;
        }
        if !cli.pids.is_empty() {
            self.pids = cli.pids.clone();
        }
    }

    /// Rejects settings no monitor can run with.
    pub fn validate(&self) -> Result<()> {
        if self.read_interval_ms == 0 {
            bail!("read_interval_ms must be at least 1");
        }
        if !self.cpu && !self.processes && !self.gpu {
            bail!("CPU, process and GPU sampling are all disabled, nothing to do");
        }
        Ok(())
    }

    /// Returns the settings shared by every monitor.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::new(Duration::from_millis(self.read_interval_ms))
    }

    /// Returns `true` when the trace is kept in memory.
    pub fn is_dry_run(&self) -> bool {
        self.output_dir == Path::new("-")
    }

    /// Returns the process filter, if any.
    pub fn pid_filter(&self) -> Option<Vec<Pid>> {
        if self.pids.is_empty() {
            None
        } else {
            Some(self.pids.iter().copied().map(Pid).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: SondeConfig = toml::from_str("read_interval_ms = 250\npids = [42]").unwrap();
        assert_eq!(config.read_interval_ms, 250);
        assert_eq!(config.pids, vec![42]);
        assert!(config.cpu);
        assert!(!config.gpu);
        assert_eq!(config.output_dir, PathBuf::from("sonde-trace"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(toml::from_str::<SondeConfig>("interval = 5").is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "cpu = false\noutput_dir = \"-\"\n").unwrap();

        let config = SondeConfig::load(Some(&path)).unwrap();

        assert!(!config.cpu);
        assert!(config.is_dry_run());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SondeConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config = SondeConfig {
            read_interval_ms: 500,
            pids: vec![1],
            ..SondeConfig::default()
        };
        let cli = Cli::parse_from(["sonde", "--interval-ms", "20", "--pid", "7", "--no-processes"]);

        config.apply(&cli);

        assert_eq!(config.read_interval_ms, 20);
        assert_eq!(config.pid_filter(), Some(vec![Pid(7)]));
        assert!(!config.processes);
        assert_eq!(
            config.monitor_config().read_interval,
            Duration::from_millis(20)
        );
    }

    #[test]
    fn test_validation() {
        assert!(SondeConfig::default().validate().is_ok());

        let zero = SondeConfig {
            read_interval_ms: 0,
            ..SondeConfig::default()
        };
        assert!(zero.validate().is_err());

        let idle = SondeConfig {
            cpu: false,
            processes: false,
            ..SondeConfig::default()
        };
        assert!(idle.validate().is_err());
    }

    #[test]
    fn test_gpu_alone_is_enough_to_run() {
        let mut config: SondeConfig = toml::from_str("cpu = false\nprocesses = false").unwrap();
        assert!(config.validate().is_err());

        config.apply(&Cli::parse_from(["sonde", "--gpu"]));

        assert!(config.gpu);
        assert!(config.validate().is_ok());
    }
}
